use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::spec::{Constraint, FieldDefinition, FieldKind, FormSpec, NumberFormat};
use crate::value::{FieldValue, FormSnapshot};
use crate::visibility::{VisibilityState, effective_required};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCode {
    Required,
    TypeMismatch,
    InvalidNumber,
    BelowMinimum,
    AboveMaximum,
    TooLong,
    PatternMismatch,
    InvalidOption,
}

/// Field-level problem found by one validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub label: String,
    pub code: ValidationCode,
    pub message: String,
}

/// Result of validating the whole form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormValidation {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    /// Index of the first section holding an error, for scroll-to-first-error.
    pub first_invalid_section: Option<usize>,
}

impl FormValidation {
    pub fn first_invalid_section_id<'a>(&self, spec: &'a FormSpec) -> Option<&'a str> {
        self.first_invalid_section
            .and_then(|index| spec.sections.get(index))
            .map(|section| section.id.as_str())
    }
}

/// Checks one field: hidden fields never fail, then required, then the
/// kind-specific rules on a present value.
pub fn validate_field(
    def: &FieldDefinition,
    value: Option<&FieldValue>,
    is_visible: bool,
    is_required: bool,
) -> Option<ValidationError> {
    if !is_visible {
        return None;
    }

    let value = match value.filter(|value| !value.is_empty()) {
        Some(value) => value,
        None if is_required => {
            return Some(base_error(def, ValidationCode::Required, required_message(def)));
        }
        None => return None,
    };

    if !matches_kind(def.kind, value) {
        return Some(base_error(def, ValidationCode::TypeMismatch, "type mismatch".into()));
    }

    match def.kind {
        FieldKind::Number => check_number(def, value.as_scalar().unwrap_or_default()),
        FieldKind::Text => check_text(def, value.as_scalar().unwrap_or_default()),
        FieldKind::SingleChoice | FieldKind::MultiChoice => check_options(def, value),
    }
}

/// Validates every visible field, section by section, without stopping at the
/// first error. Red flags are not consulted.
pub fn validate_form(
    spec: &FormSpec,
    snapshot: &FormSnapshot,
    visibility: &VisibilityState,
) -> FormValidation {
    let mut errors = Vec::new();
    let mut first_invalid_section = None;

    for (index, section) in spec.sections.iter().enumerate() {
        if !visibility.is_section_visible(&section.id) {
            continue;
        }
        let before = errors.len();
        for field in &section.fields {
            if let Some(error) = check_in_context(spec, field, snapshot, visibility) {
                errors.push(error);
            }
        }
        if errors.len() > before && first_invalid_section.is_none() {
            first_invalid_section = Some(index);
        }
    }

    FormValidation {
        is_valid: errors.is_empty(),
        errors,
        first_invalid_section,
    }
}

/// Validates a field using the visibility and required-ness of the current state.
pub fn check_in_context(
    spec: &FormSpec,
    field: &FieldDefinition,
    snapshot: &FormSnapshot,
    visibility: &VisibilityState,
) -> Option<ValidationError> {
    validate_field(
        field,
        snapshot.get(&field.name),
        visibility.is_field_visible(spec, &field.name),
        effective_required(spec, field, visibility),
    )
}

/// Errors currently shown to the user, kept in form order.
///
/// A full pass replaces the ledger; a field change only re-checks the fields
/// it touched, so fixed fields drop out without re-running the whole form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorLedger {
    errors: Vec<ValidationError>,
}

/// What an incremental re-check changed in the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerDelta {
    pub raised: Vec<ValidationError>,
    pub retracted: Vec<String>,
}

impl ErrorLedger {
    pub fn replace(&mut self, validation: &FormValidation) {
        self.errors = validation.errors.clone();
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn error_for(&self, field: &str) -> Option<&ValidationError> {
        self.errors.iter().find(|error| error.field == field)
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn clear(&mut self) {
        self.errors.clear();
    }

    pub fn revalidate<'a, I>(
        &mut self,
        spec: &FormSpec,
        snapshot: &FormSnapshot,
        visibility: &VisibilityState,
        fields: I,
    ) -> LedgerDelta
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut delta = LedgerDelta::default();
        for name in fields {
            let Some(field) = spec.field(name) else {
                continue;
            };
            let previous = self
                .errors
                .iter()
                .position(|error| error.field == name)
                .map(|index| self.errors.remove(index));

            match check_in_context(spec, field, snapshot, visibility) {
                Some(error) => {
                    if previous.as_ref() != Some(&error) {
                        delta.raised.push(error.clone());
                    }
                    self.errors.push(error);
                }
                None => {
                    if previous.is_some() {
                        delta.retracted.push(name.to_string());
                    }
                }
            }
        }
        self.errors
            .sort_by_key(|error| spec.field_position(&error.field).unwrap_or(usize::MAX));
        delta
    }
}

fn matches_kind(kind: FieldKind, value: &FieldValue) -> bool {
    match kind {
        FieldKind::MultiChoice => value.as_set().is_some(),
        FieldKind::Text | FieldKind::Number | FieldKind::SingleChoice => {
            value.as_scalar().is_some()
        }
    }
}

fn required_message(def: &FieldDefinition) -> String {
    match def.kind {
        FieldKind::Text | FieldKind::Number => "This field is required",
        FieldKind::SingleChoice => "Please select an option",
        FieldKind::MultiChoice => "Please select at least one option",
    }
    .into()
}

/// Parses a numeric entry according to the field's format.
pub fn parse_number(def: &FieldDefinition, raw: &str) -> Option<f64> {
    let raw = raw.trim();
    match def.format {
        NumberFormat::Integer => raw.parse::<i64>().ok().map(|value| value as f64),
        NumberFormat::Decimal => raw.parse::<f64>().ok().filter(|value| value.is_finite()),
    }
}

fn check_number(def: &FieldDefinition, raw: &str) -> Option<ValidationError> {
    let Some(number) = parse_number(def, raw) else {
        let message = match def.format {
            NumberFormat::Integer => {
                format!("Please enter a valid {} (whole number)", def.label.to_lowercase())
            }
            NumberFormat::Decimal => format!("Please enter a valid {}", def.label.to_lowercase()),
        };
        return Some(base_error(def, ValidationCode::InvalidNumber, message));
    };

    let constraint = &def.constraint;
    if let Some(min) = constraint.min
        && number < min
    {
        return Some(base_error(
            def,
            ValidationCode::BelowMinimum,
            range_message(&def.label, constraint),
        ));
    }
    if let Some(max) = constraint.max
        && number > max
    {
        return Some(base_error(
            def,
            ValidationCode::AboveMaximum,
            range_message(&def.label, constraint),
        ));
    }
    None
}

fn range_message(label: &str, constraint: &Constraint) -> String {
    let unit = constraint
        .unit
        .as_deref()
        .map(|unit| format!(" {unit}"))
        .unwrap_or_default();
    match (constraint.min, constraint.max) {
        (Some(min), Some(max)) => format!("{label} must be between {min}-{max}{unit}"),
        (Some(min), None) => format!("{label} must be at least {min}{unit}"),
        (None, Some(max)) => format!("{label} must be at most {max}{unit}"),
        (None, None) => format!("{label} is out of range"),
    }
}

fn check_text(def: &FieldDefinition, text: &str) -> Option<ValidationError> {
    if let Some(max_len) = def.constraint.max_len
        && text.chars().count() > max_len
    {
        return Some(base_error(
            def,
            ValidationCode::TooLong,
            format!("{} must be at most {} characters", def.label, max_len),
        ));
    }

    if let Some(pattern) = &def.constraint.pattern
        && let Ok(regex) = Regex::new(pattern)
        && !regex.is_match(text)
    {
        return Some(base_error(
            def,
            ValidationCode::PatternMismatch,
            "value does not match the expected format".into(),
        ));
    }

    None
}

fn check_options(def: &FieldDefinition, value: &FieldValue) -> Option<ValidationError> {
    let unknown = match value {
        FieldValue::One(choice) => !def.has_option(choice),
        FieldValue::Many(choices) => choices.iter().any(|choice| !def.has_option(choice)),
    };
    if unknown {
        return Some(base_error(
            def,
            ValidationCode::InvalidOption,
            "Please choose one of the listed options".into(),
        ));
    }
    match (value, def.exclusive_option()) {
        (FieldValue::Many(choices), Some(exclusive))
            if choices.len() > 1 && choices.contains(&exclusive.value) =>
        {
            Some(base_error(
                def,
                ValidationCode::InvalidOption,
                format!("'{}' cannot be combined with other options", exclusive.label),
            ))
        }
        _ => None,
    }
}

fn base_error(def: &FieldDefinition, code: ValidationCode, message: String) -> ValidationError {
    ValidationError {
        field: def.name.clone(),
        label: def.label.clone(),
        code,
        message,
    }
}
