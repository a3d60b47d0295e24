use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::value::FieldValue;

/// Predicate over a single trigger value, used by visibility and mirror rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// Scalar value equals `value`.
    Equals { value: String },
    /// Scalar value is one of `values`.
    OneOf { values: Vec<String> },
    /// Multi-choice selection includes `value`.
    Contains { value: String },
    /// The field has a non-empty value.
    Present,
    Not { condition: Box<Condition> },
    All { conditions: Vec<Condition> },
    Any { conditions: Vec<Condition> },
}

impl Condition {
    pub fn equals(value: impl Into<String>) -> Self {
        Condition::Equals {
            value: value.into(),
        }
    }

    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Condition::OneOf {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(value: impl Into<String>) -> Self {
        Condition::Contains {
            value: value.into(),
        }
    }

    pub fn negate(self) -> Self {
        Condition::Not {
            condition: Box::new(self),
        }
    }

    /// Evaluates the condition; an absent value fails every positive test.
    pub fn holds(&self, value: Option<&FieldValue>) -> bool {
        match self {
            Condition::Equals { value: expected } => value
                .and_then(FieldValue::as_scalar)
                .is_some_and(|actual| actual == expected),
            Condition::OneOf { values } => value
                .and_then(FieldValue::as_scalar)
                .is_some_and(|actual| values.iter().any(|candidate| candidate == actual)),
            Condition::Contains { value: needle } => value.is_some_and(|v| v.contains(needle)),
            Condition::Present => value.is_some_and(|v| !v.is_empty()),
            Condition::Not { condition } => !condition.holds(value),
            Condition::All { conditions } => conditions.iter().all(|c| c.holds(value)),
            Condition::Any { conditions } => conditions.iter().any(|c| c.holds(value)),
        }
    }
}
