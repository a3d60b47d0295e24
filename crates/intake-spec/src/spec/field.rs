use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Input kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    SingleChoice,
    MultiChoice,
}

impl FieldKind {
    pub fn is_choice(self) -> bool {
        matches!(self, FieldKind::SingleChoice | FieldKind::MultiChoice)
    }
}

/// How a numeric field is parsed and transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NumberFormat {
    Integer,
    #[default]
    Decimal,
}

/// Output key of a field in the analysis payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Transmit {
    #[default]
    Keep,
    Rename(String),
    /// UI-only fields never leave the client.
    Drop,
}

/// Static constraints applied by the validator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Constraint {
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Unit suffix used in range messages, e.g. `cm`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
}

/// One selectable option of a choice field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChoiceOption {
    pub value: String,
    pub label: String,
    /// Selecting this option clears and disables every sibling.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub exclusive: bool,
}

/// Immutable definition of a single input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldDefinition {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ChoiceOption>,
    #[serde(default)]
    pub constraint: Constraint,
    #[serde(default)]
    pub format: NumberFormat,
    #[serde(default = "default_true")]
    pub visible_by_default: bool,
    #[serde(default)]
    pub transmit: Transmit,
}

fn default_true() -> bool {
    true
}

impl FieldDefinition {
    pub fn exclusive_option(&self) -> Option<&ChoiceOption> {
        self.options.iter().find(|option| option.exclusive)
    }

    pub fn has_option(&self, value: &str) -> bool {
        self.options.iter().any(|option| option.value == value)
    }

    pub fn option_label(&self, value: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|option| option.value == value)
            .map(|option| option.label.as_str())
    }

    /// Key used in the analysis payload, `None` for UI-only fields.
    pub fn output_key(&self) -> Option<&str> {
        match &self.transmit {
            Transmit::Keep => Some(self.name.as_str()),
            Transmit::Rename(to) => Some(to.as_str()),
            Transmit::Drop => None,
        }
    }
}
