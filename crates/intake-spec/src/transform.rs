use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::spec::{FieldDefinition, FieldKind, FormSpec, NumberFormat};
use crate::validate::parse_number;
use crate::value::{FieldValue, FormSnapshot};
use crate::visibility::{VisibilityState, is_mirror_target};

#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    #[error("field '{field}' holds '{value}', which is not a valid number")]
    InvalidNumber { field: String, value: String },
    #[error("fields '{first}' and '{second}' both map to payload key '{key}'")]
    KeyCollision {
        key: String,
        first: String,
        second: String,
    },
}

/// Builds the analysis payload from a snapshot.
///
/// Every registry field yields exactly one key or is dropped: renamed fields
/// use their new key, multi-choice fields are always lists, numbers are parsed
/// to integers or decimals, and hidden or empty scalars become `null`. A
/// hidden field filled by an active mirror keeps its stored value.
pub fn to_payload(
    spec: &FormSpec,
    snapshot: &FormSnapshot,
    visibility: &VisibilityState,
) -> Result<Map<String, Value>, TransformError> {
    let mut payload = Map::new();
    let mut owners: Vec<(&str, &str)> = Vec::new();

    for field in spec.fields() {
        let Some(key) = field.output_key() else {
            continue;
        };
        if let Some((_, owner)) = owners.iter().find(|(existing, _)| *existing == key) {
            return Err(TransformError::KeyCollision {
                key: key.to_string(),
                first: owner.to_string(),
                second: field.name.clone(),
            });
        }
        owners.push((key, field.name.as_str()));

        let value = snapshot
            .get(&field.name)
            .filter(|_| {
                visibility.is_field_visible(spec, &field.name)
                    || is_mirror_target(spec, &field.name, snapshot)
            });

        let encoded = match field.kind {
            FieldKind::MultiChoice => Value::Array(
                value
                    .and_then(FieldValue::as_set)
                    .map(|set| set.iter().cloned().map(Value::String).collect())
                    .unwrap_or_default(),
            ),
            FieldKind::Number => match value.and_then(FieldValue::as_scalar) {
                Some(raw) if !raw.trim().is_empty() => encode_number(field, raw)?,
                _ => Value::Null,
            },
            FieldKind::Text | FieldKind::SingleChoice => value
                .and_then(FieldValue::as_scalar)
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(|text| Value::String(text.to_string()))
                .unwrap_or(Value::Null),
        };
        payload.insert(key.to_string(), encoded);
    }

    payload.insert("form_version".into(), Value::String(spec.version.clone()));
    Ok(payload)
}

fn encode_number(field: &FieldDefinition, raw: &str) -> Result<Value, TransformError> {
    let invalid = || TransformError::InvalidNumber {
        field: field.name.clone(),
        value: raw.to_string(),
    };
    let number = parse_number(field, raw).ok_or_else(invalid)?;
    match field.format {
        NumberFormat::Integer => Ok(Value::from(number as i64)),
        NumberFormat::Decimal => Number::from_f64(number)
            .map(Value::Number)
            .ok_or_else(invalid),
    }
}
