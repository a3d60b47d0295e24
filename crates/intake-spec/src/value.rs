use std::collections::{BTreeMap, BTreeSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current value of one field.
///
/// Text, number and single-choice inputs hold the raw entered text; numbers
/// are parsed on demand so that an unparsable entry can still be reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum FieldValue {
    One(String),
    Many(BTreeSet<String>),
}

impl FieldValue {
    pub fn one(value: impl Into<String>) -> Self {
        FieldValue::One(value.into())
    }

    pub fn many<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldValue::Many(values.into_iter().map(Into::into).collect())
    }

    /// Converts a loosely typed JSON answer (numbers, strings, arrays) into a value.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(text) => Some(FieldValue::One(text.clone())),
            Value::Number(number) => Some(FieldValue::One(number.to_string())),
            Value::Bool(flag) => Some(FieldValue::One(flag.to_string())),
            Value::Array(items) => Some(FieldValue::Many(
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(text) => Some(text.clone()),
                        Value::Number(number) => Some(number.to_string()),
                        _ => None,
                    })
                    .collect(),
            )),
            Value::Object(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            FieldValue::One(text) => Some(text.as_str()),
            FieldValue::Many(_) => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            FieldValue::Many(values) => Some(values),
            FieldValue::One(_) => None,
        }
    }

    /// Blank text and empty selections count as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::One(text) => text.trim().is_empty(),
            FieldValue::Many(values) => values.is_empty(),
        }
    }

    pub fn contains(&self, needle: &str) -> bool {
        match self {
            FieldValue::One(text) => text == needle,
            FieldValue::Many(values) => values.contains(needle),
        }
    }

    pub fn display(&self) -> String {
        match self {
            FieldValue::One(text) => text.clone(),
            FieldValue::Many(values) => values.iter().cloned().collect::<Vec<_>>().join(", "),
        }
    }
}

/// Every value the user has entered so far, independent of visibility.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct FormSnapshot {
    values: BTreeMap<String, FieldValue>,
}

impl FormSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot from a JSON answers object, skipping nulls and nested objects.
    pub fn from_json(answers: &Value) -> Self {
        let values = answers
            .as_object()
            .map(|map| {
                map.iter()
                    .filter_map(|(name, value)| {
                        FieldValue::from_json(value).map(|value| (name.clone(), value))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: FieldValue) -> Option<FieldValue> {
        self.values.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.values.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_accepts_numbers_and_arrays_from_answer_files() {
        let snapshot = FormSnapshot::from_json(&json!({
            "age": 32,
            "weight_kg": 75.5,
            "medical_conditions": ["none"],
            "additional_info": null
        }));
        assert_eq!(snapshot.get("age"), Some(&FieldValue::one("32")));
        assert_eq!(snapshot.get("weight_kg"), Some(&FieldValue::one("75.5")));
        assert_eq!(
            snapshot.get("medical_conditions"),
            Some(&FieldValue::many(["none"]))
        );
        assert!(snapshot.get("additional_info").is_none());
    }

    #[test]
    fn blank_text_counts_as_empty() {
        assert!(FieldValue::one("   ").is_empty());
        assert!(FieldValue::Many(BTreeSet::new()).is_empty());
        assert!(!FieldValue::one("0").is_empty());
    }

    #[test]
    fn snapshot_serializes_as_plain_object() {
        let mut snapshot = FormSnapshot::new();
        snapshot.set("main_issue", FieldValue::one("ed"));
        snapshot.set("current_medications", FieldValue::many(["none"]));
        let value = serde_json::to_value(&snapshot).expect("json");
        assert_eq!(
            value,
            json!({ "current_medications": ["none"], "main_issue": "ed" })
        );
        let restored: FormSnapshot = serde_json::from_value(value).expect("snapshot");
        assert_eq!(restored, snapshot);
    }
}
