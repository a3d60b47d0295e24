use schemars::schema_for;
use serde_json::{Map, Value, json};

use crate::analysis::AnalysisResult;
use crate::spec::{FieldKind, FormSpec, NumberFormat};

/// JSON Schema of the form definition format.
pub fn spec_schema() -> Result<Value, serde_json::Error> {
    serde_json::to_value(schema_for!(FormSpec))
}

/// JSON Schema of the analysis service response.
pub fn analysis_schema() -> Result<Value, serde_json::Error> {
    serde_json::to_value(schema_for!(AnalysisResult))
}

/// JSON Schema of the payload `spec` produces for the analysis service.
pub fn payload_schema(spec: &FormSpec) -> Value {
    let mut properties = Map::new();
    for field in spec.fields() {
        let Some(key) = field.output_key() else {
            continue;
        };
        let mut property = match field.kind {
            FieldKind::MultiChoice => json!({
                "type": "array",
                "items": {
                    "type": "string",
                    "enum": field.options.iter().map(|o| o.value.clone()).collect::<Vec<_>>(),
                },
            }),
            FieldKind::SingleChoice => json!({
                "type": ["string", "null"],
                "enum": field
                    .options
                    .iter()
                    .map(|o| Value::String(o.value.clone()))
                    .chain([Value::Null])
                    .collect::<Vec<_>>(),
            }),
            FieldKind::Number => json!({
                "type": match field.format {
                    NumberFormat::Integer => ["integer", "null"],
                    NumberFormat::Decimal => ["number", "null"],
                },
            }),
            FieldKind::Text => json!({ "type": ["string", "null"] }),
        };
        if let Value::Object(map) = &mut property {
            map.insert("title".into(), Value::String(field.label.clone()));
            if let Some(min) = field.constraint.min {
                map.insert("minimum".into(), json!(min));
            }
            if let Some(max) = field.constraint.max {
                map.insert("maximum".into(), json!(max));
            }
            if let Some(max_len) = field.constraint.max_len {
                map.insert("maxLength".into(), json!(max_len));
            }
        }
        properties.insert(key.to_string(), property);
    }
    properties.insert("form_version".into(), json!({ "const": spec.version }));
    properties.insert(
        "submitted_at".into(),
        json!({ "type": "string", "format": "date-time" }),
    );

    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": format!("{} payload", spec.title),
        "type": "object",
        "properties": properties,
        "required": ["form_version"],
    })
}
