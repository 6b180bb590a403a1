use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fallback step count when a launch response does not carry one.
/// Ten years of fortnightly steps.
pub const DEFAULT_TOTAL_TIMESTEPS: u32 = 260;

/// Opaque structured policy parameters produced by the interpreter.
///
/// The interpreter owns the schema. This layer inspects only the handful of
/// fields it needs for summaries and affected-tract derivation and passes
/// everything else through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyConfig(pub Map<String, Value>);

impl PolicyConfig {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Human-readable summary for a configuration applied without the
    /// interpreter: `description`, falling back to `name`.
    pub fn display_summary(&self) -> String {
        for key in ["description", "name"] {
            if let Some(Value::String(s)) = self.0.get(key) {
                if !s.trim().is_empty() {
                    return s.clone();
                }
            }
        }
        "Predefined scenario".to_string()
    }

    /// Union of every tract id the configuration targets, sorted and
    /// deduplicated across the zoning and enforcement target lists.
    pub fn affected_tracts(&self) -> Vec<String> {
        let mut tracts = BTreeSet::new();
        for key in ["target_tract_ids", "enforcement_target_tracts"] {
            if let Some(Value::Array(ids)) = self.0.get(key) {
                for id in ids {
                    if let Value::String(s) = id {
                        tracts.insert(s.clone());
                    }
                }
            }
        }
        tracts.into_iter().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpretationRole {
    User,
    System,
}

/// One turn of the interpretation conversation. Appended, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretationEntry {
    pub role: InterpretationRole,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl InterpretationEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: InterpretationRole::User,
            text: text.into(),
            warnings: Vec::new(),
        }
    }

    pub fn system(text: impl Into<String>, warnings: Vec<String>) -> Self {
        Self {
            role: InterpretationRole::System,
            text: text.into(),
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> PolicyConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn display_summary_prefers_description_over_name() {
        let c = config(json!({"name": "Upzone", "description": "Upzone Mission to 5x"}));
        assert_eq!(c.display_summary(), "Upzone Mission to 5x");

        let c = config(json!({"name": "Upzone", "description": "  "}));
        assert_eq!(c.display_summary(), "Upzone");

        let c = config(json!({"density_multiplier": 5.0}));
        assert_eq!(c.display_summary(), "Predefined scenario");
    }

    #[test]
    fn affected_tracts_unions_both_target_lists() {
        let c = config(json!({
            "target_tract_ids": ["017700", "017800", "017700"],
            "enforcement_target_tracts": ["012400", "017800"],
        }));
        assert_eq!(c.affected_tracts(), vec!["012400", "017700", "017800"]);
    }

    #[test]
    fn affected_tracts_ignores_missing_and_non_string_entries() {
        let c = config(json!({"target_tract_ids": ["017700", 42, null]}));
        assert_eq!(c.affected_tracts(), vec!["017700"]);

        let c = config(json!({"density_multiplier": 5.0}));
        assert!(c.affected_tracts().is_empty());
    }
}
