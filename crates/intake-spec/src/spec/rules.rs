use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::Condition;

/// Something a visibility rule can show or hide.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Section(String),
    Field(String),
}

impl Target {
    pub fn name(&self) -> &str {
        match self {
            Target::Section(id) | Target::Field(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Show,
    Hide,
}

/// Shows or hides targets while `when` holds on the trigger field.
///
/// Inactive rules make no decision. When several active rules name the same
/// target the highest `priority` wins and ties go to the rule declared last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VisibilityRule {
    pub id: String,
    pub trigger: String,
    pub when: Condition,
    pub targets: Vec<Target>,
    pub effect: Effect,
    #[serde(default)]
    pub required_while_visible: bool,
    #[serde(default)]
    pub priority: i32,
}

/// Copies `source` into `target` while `when` holds on `trigger`, so a
/// question shared by two branches is asked only once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MirrorRule {
    pub trigger: String,
    pub when: Condition,
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Surfaced as a banner; submission may proceed.
    Warning,
    /// Locks input outside the first section and disables submission.
    Block,
}

/// Safety checks evaluated alongside, never inside, validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RedFlagRule {
    AgeBoundary {
        field: String,
    },
    Emergency {
        field: String,
    },
    Selection {
        field: String,
        values: Vec<String>,
        severity: Severity,
        code: String,
        message: String,
    },
}

impl RedFlagRule {
    pub fn field(&self) -> &str {
        match self {
            RedFlagRule::AgeBoundary { field }
            | RedFlagRule::Emergency { field }
            | RedFlagRule::Selection { field, .. } => field,
        }
    }
}
