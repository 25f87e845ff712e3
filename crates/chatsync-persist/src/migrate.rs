//! Versioned migration chains for persisted values.
//!
//! A [`MigrationChain`] is an ordered table of pure functions indexed by
//! source version. Step `n` takes a value in shape `n` and returns it in
//! shape `n + 1`. [`MigrationChain::migrate`] applies steps one at a time
//! until the target version is reached; a gap in the table is an error.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::error::MigrationError;

/// One step of a chain: `from_version` to `from_version + 1`.
#[derive(Clone)]
pub struct MigrationStep {
    pub from_version: u32,
    pub description: &'static str,
    pub apply: fn(Value) -> Result<Value, MigrationError>,
}

impl fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStep")
            .field("from_version", &self.from_version)
            .field("description", &self.description)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MigrationChain {
    steps: BTreeMap<u32, MigrationStep>,
}

impl MigrationChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a step, replacing any step registered for the same source version.
    pub fn step(
        mut self,
        from_version: u32,
        description: &'static str,
        apply: fn(Value) -> Result<Value, MigrationError>,
    ) -> Self {
        self.steps.insert(
            from_version,
            MigrationStep {
                from_version,
                description,
                apply,
            },
        );
        self
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> impl Iterator<Item = &MigrationStep> {
        self.steps.values()
    }

    /// Migrates `value` from version `from` up to version `to`.
    ///
    /// `from >= to` returns the value unchanged; downgrades are never applied.
    pub fn migrate(&self, mut value: Value, from: u32, to: u32) -> Result<Value, MigrationError> {
        let mut version = from;
        while version < to {
            let step = self
                .steps
                .get(&version)
                .ok_or(MigrationError::MissingStep { from: version })?;
            value = (step.apply)(value)?;
            tracing::debug!(
                from = version,
                to = version + 1,
                step = step.description,
                "applied migration step"
            );
            version += 1;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add_one(mut value: Value) -> Result<Value, MigrationError> {
        let n = value["n"].as_i64().unwrap_or(0);
        value["n"] = json!(n + 1);
        Ok(value)
    }

    fn reject(_: Value) -> Result<Value, MigrationError> {
        Err(MigrationError::StepFailed {
            from: 2,
            reason: "bad".into(),
        })
    }

    #[test]
    fn applies_steps_in_order_until_target() {
        let chain = MigrationChain::new()
            .step(1, "one", add_one)
            .step(2, "two", add_one)
            .step(3, "three", add_one);
        assert_eq!(chain.migrate(json!({"n": 0}), 1, 4).unwrap(), json!({"n": 3}));
        assert_eq!(chain.migrate(json!({"n": 0}), 2, 3).unwrap(), json!({"n": 1}));
    }

    #[test]
    fn current_or_newer_versions_pass_through() {
        let chain = MigrationChain::new().step(1, "one", add_one);
        assert_eq!(chain.migrate(json!({"n": 5}), 2, 2).unwrap(), json!({"n": 5}));
        assert_eq!(chain.migrate(json!({"n": 5}), 9, 2).unwrap(), json!({"n": 5}));
    }

    #[test]
    fn gaps_and_failing_steps_are_errors() {
        let chain = MigrationChain::new().step(1, "one", add_one).step(2, "bad", reject);
        assert!(matches!(
            chain.migrate(json!({}), 0, 2),
            Err(MigrationError::MissingStep { from: 0 })
        ));
        assert!(matches!(
            chain.migrate(json!({}), 1, 3),
            Err(MigrationError::StepFailed { from: 2, .. })
        ));
    }
}
