//! Migration chain for the persisted chats state `{ "conversations": [...] }`.
//!
//! - v2 → v3: conversations without a `systemPurposeId` get the default one.
//! - v3 → v4: a legacy message `text` string becomes a single text content
//!   fragment. Messages that already carry fragments keep them.

use serde_json::{json, Map, Value};

use chatsync_core::DEFAULT_SYSTEM_PURPOSE;

use super::app_ui::type_name;
use crate::error::MigrationError;
use crate::migrate::MigrationChain;

pub const CHATS_STORE: &str = "app-chats";
pub const CHATS_VERSION: u32 = 4;

fn conversations_mut(
    value: &mut Value,
    from: u32,
) -> Result<&mut Vec<Value>, MigrationError> {
    match value.get_mut("conversations") {
        Some(Value::Array(list)) => Ok(list),
        Some(other) => Err(MigrationError::StepFailed {
            from,
            reason: format!("conversations is {}, expected an array", type_name(other)),
        }),
        None => Err(MigrationError::StepFailed {
            from,
            reason: "missing conversations".to_string(),
        }),
    }
}

fn v2_to_v3(mut value: Value) -> Result<Value, MigrationError> {
    for conversation in conversations_mut(&mut value, 2)? {
        if let Value::Object(map) = conversation {
            let missing = map
                .get("systemPurposeId")
                .and_then(Value::as_str)
                .map_or(true, str::is_empty);
            if missing {
                map.insert(
                    "systemPurposeId".to_string(),
                    Value::String(DEFAULT_SYSTEM_PURPOSE.to_string()),
                );
            }
        }
    }
    Ok(value)
}

fn text_fragment(message: &Map<String, Value>, text: Value) -> Value {
    let message_id = message.get("id").and_then(Value::as_str).unwrap_or("message");
    json!({
        "id": format!("{}-f0", message_id),
        "type": "content",
        "part": { "pt": "text", "text": text },
    })
}

fn v3_to_v4(mut value: Value) -> Result<Value, MigrationError> {
    for conversation in conversations_mut(&mut value, 3)? {
        let Some(Value::Array(messages)) = conversation.get_mut("messages") else {
            continue;
        };
        for message in messages {
            let Value::Object(map) = message else {
                continue;
            };
            let Some(text) = map.remove("text") else {
                continue;
            };
            let has_fragments = map
                .get("fragments")
                .and_then(Value::as_array)
                .is_some_and(|f| !f.is_empty());
            if !has_fragments {
                let fragment = text_fragment(map, text);
                map.insert("fragments".to_string(), Value::Array(vec![fragment]));
            }
        }
    }
    Ok(value)
}

pub fn chats_chain() -> MigrationChain {
    MigrationChain::new()
        .step(2, "default systemPurposeId", v2_to_v3)
        .step(3, "message text -> content fragment", v3_to_v4)
}
