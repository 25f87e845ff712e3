//! Migration chain and typed shape for the `app-ui` preferences blob.
//!
//! - v1 → v2: `disableMarkdown` is replaced by its negation, `renderMarkdown`.
//! - v2 → v3: the `centerMode` default moved from `narrow` to `full`; stored
//!   `narrow` values are moved along with it. Fresh v3 state never passes
//!   through this step.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MigrationError;
use crate::migrate::MigrationChain;

pub const APP_UI_STORE: &str = "app-ui";
pub const APP_UI_VERSION: u32 = 3;

/// UI preferences in their v3 shape. Unknown keys are carried through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiPreferences {
    #[serde(default = "default_true")]
    pub render_markdown: bool,
    #[serde(default = "default_center_mode")]
    pub center_mode: String,
    #[serde(default)]
    pub enter_is_newline: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_true() -> bool {
    true
}

fn default_center_mode() -> String {
    "full".to_string()
}

impl Default for UiPreferences {
    fn default() -> Self {
        UiPreferences {
            render_markdown: true,
            center_mode: default_center_mode(),
            enter_is_newline: false,
            extra: Map::new(),
        }
    }
}

fn as_object(value: Value, from: u32) -> Result<Map<String, Value>, MigrationError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(MigrationError::StepFailed {
            from,
            reason: format!("expected an object, found {}", type_name(&other)),
        }),
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn v1_to_v2(value: Value) -> Result<Value, MigrationError> {
    let mut map = as_object(value, 1)?;
    if let Some(disable) = map.remove("disableMarkdown") {
        let disabled = disable.as_bool().unwrap_or(false);
        map.insert("renderMarkdown".to_string(), Value::Bool(!disabled));
    }
    Ok(Value::Object(map))
}

fn v2_to_v3(value: Value) -> Result<Value, MigrationError> {
    let mut map = as_object(value, 2)?;
    if map.get("centerMode").and_then(Value::as_str) == Some("narrow") {
        map.insert("centerMode".to_string(), Value::String("full".to_string()));
    }
    Ok(Value::Object(map))
}

pub fn app_ui_chain() -> MigrationChain {
    MigrationChain::new()
        .step(1, "disableMarkdown -> renderMarkdown", v1_to_v2)
        .step(2, "centerMode narrow -> full", v2_to_v3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn v1_flag_is_negated() {
        let chain = app_ui_chain();
        let out = chain
            .migrate(json!({"disableMarkdown": true, "zenMode": "clean"}), 1, 2)
            .unwrap();
        assert_eq!(out, json!({"renderMarkdown": false, "zenMode": "clean"}));
    }

    #[test]
    fn narrow_center_mode_moves_to_full_on_upgrade() {
        let out = app_ui_chain()
            .migrate(json!({"centerMode": "narrow"}), 1, APP_UI_VERSION)
            .unwrap();
        assert_eq!(out["centerMode"], json!("full"));
    }

    #[test]
    fn current_version_narrow_is_left_alone() {
        let out = app_ui_chain()
            .migrate(json!({"centerMode": "narrow"}), 3, APP_UI_VERSION)
            .unwrap();
        assert_eq!(out["centerMode"], json!("narrow"));
    }

    #[test]
    fn other_center_modes_survive() {
        let out = app_ui_chain()
            .migrate(json!({"centerMode": "wide"}), 2, 3)
            .unwrap();
        assert_eq!(out["centerMode"], json!("wide"));
    }

    #[test]
    fn non_object_state_fails() {
        assert!(app_ui_chain().migrate(json!([1]), 1, 3).is_err());
    }

    #[test]
    fn typed_preferences_default_missing_keys() {
        let prefs: UiPreferences = serde_json::from_value(json!({"zenMode": "clean"})).unwrap();
        assert!(prefs.render_markdown);
        assert_eq!(prefs.center_mode, "full");
        assert_eq!(prefs.extra["zenMode"], json!("clean"));
    }
}
