use serde::{Deserialize, Serialize};

/// Custom action attached to a species.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ActionSpec {
    /// Only `ExecuteCommand` is recognized today.
    #[serde(rename = "type")]
    pub action_type: ActionKind,
    /// Absolute path of the program to run.
    pub command: String,
    /// Note parameter names passed as `--name=value` arguments.
    pub parameters: Vec<String>,
    /// When set on any spec, the default action list runs after the customs.
    pub execute_defaults: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ActionKind {
    #[default]
    ExecuteCommand,
    SendNotification,
}

/// Per-species overrides, keyed by lowercased common name.
///
/// Zero is meaningful for both numeric fields: `threshold = 0.0` accepts any
/// positive-confidence match and `interval = 0` inherits the global default.
/// Both round-trip through load/save unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpeciesConfig {
    pub threshold: f64,
    /// Minimum seconds between repeated events for this species.
    pub interval: i64,
    pub actions: Vec<ActionSpec>,
}

impl SpeciesConfig {
    /// Coerce out-of-range values: negatives to zero, thresholds above one
    /// clamped to one. Zero stays zero.
    pub fn normalize(&mut self) {
        if self.threshold < 0.0 {
            self.threshold = 0.0;
        } else if self.threshold > 1.0 {
            self.threshold = 1.0;
        }
        if self.interval < 0 {
            self.interval = 0;
        }
    }
}
