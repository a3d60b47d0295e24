use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::progress::{SectionProgress, section_status};
use crate::red_flag::{RedFlagReport, detect};
use crate::spec::{FieldKind, FormSpec, Target};
use crate::transform::{TransformError, to_payload};
use crate::validate::{ErrorLedger, FormValidation, LedgerDelta, ValidationError, validate_form};
use crate::value::{FieldValue, FormSnapshot};
use crate::visibility::{
    VisibilityState, disabled_options, effective_required, evaluate, normalize_exclusive,
    resolve_visibility,
};

/// A single edit made by the user. `None` clears the field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChanged {
    pub name: String,
    pub value: Option<FieldValue>,
}

impl FieldChanged {
    pub fn set(name: impl Into<String>, value: FieldValue) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
        }
    }

    pub fn clear(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("field '{0}' is locked while a red flag blocks the form")]
    Locked(String),
    #[error("option '{option}' of '{field}' is disabled by the current selection")]
    OptionDisabled { field: String, option: String },
    #[error("field '{field}' expects a {expected} value")]
    KindMismatch {
        field: String,
        expected: &'static str,
    },
}

/// Everything one edit caused.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeReport {
    /// Value stored after exclusive-option normalization.
    pub stored: Option<FieldValue>,
    /// Fields written by mirror rules, in cascade order.
    pub mirrored: Vec<String>,
    /// Sections and fields whose visibility or required-ness moved.
    pub moved: Vec<Target>,
    pub errors: LedgerDelta,
    pub red_flags_changed: bool,
}

/// Interaction state of one field for a renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldState {
    pub visible: bool,
    pub required: bool,
    /// False while locked by an active block.
    pub enabled: bool,
    pub disabled_options: BTreeSet<String>,
}

/// The single owner of a form's mutable state.
///
/// Values, visibility, red flags, the error ledger and section progress all
/// change through [`FormSession::apply`] or [`FormSession::restore`], so they
/// never drift apart.
#[derive(Debug, Clone)]
pub struct FormSession {
    spec: Arc<FormSpec>,
    snapshot: FormSnapshot,
    visibility: VisibilityState,
    red_flags: RedFlagReport,
    ledger: ErrorLedger,
    progress: SectionProgress,
}

impl FormSession {
    pub fn new(spec: Arc<FormSpec>) -> Self {
        let snapshot = FormSnapshot::new();
        let visibility = resolve_visibility(&spec, &snapshot);
        let progress = SectionProgress::for_form(&spec);
        Self {
            spec,
            snapshot,
            visibility,
            red_flags: RedFlagReport::default(),
            ledger: ErrorLedger::default(),
            progress,
        }
    }

    /// Rebuilds every derived state from a saved snapshot. Multi-choice
    /// answers holding an exclusive option are reduced to that option.
    pub fn restore(&mut self, mut snapshot: FormSnapshot) {
        for field in self.spec.multi_choice_fields() {
            if let Some(value) = snapshot.remove(&field.name) {
                snapshot.set(field.name.clone(), normalize_exclusive(field, value));
            }
        }
        self.visibility = resolve_visibility(&self.spec, &snapshot);
        self.red_flags = detect(&self.spec, &snapshot);
        self.snapshot = snapshot;
        self.ledger.clear();
        debug!(fields = self.snapshot.len(), "restored session");
    }

    /// Drops all answers, as after a successful submission.
    pub fn reset(&mut self) {
        self.restore(FormSnapshot::new());
        self.progress = SectionProgress::for_form(&self.spec);
    }

    pub fn spec(&self) -> &FormSpec {
        &self.spec
    }

    pub fn spec_handle(&self) -> Arc<FormSpec> {
        Arc::clone(&self.spec)
    }

    pub fn snapshot(&self) -> &FormSnapshot {
        &self.snapshot
    }

    pub fn visibility(&self) -> &VisibilityState {
        &self.visibility
    }

    pub fn red_flags(&self) -> &RedFlagReport {
        &self.red_flags
    }

    pub fn errors(&self) -> &[ValidationError] {
        self.ledger.errors()
    }

    pub fn progress(&self) -> &SectionProgress {
        &self.progress
    }

    pub fn apply(&mut self, event: FieldChanged) -> Result<ChangeReport, SessionError> {
        let spec = Arc::clone(&self.spec);
        let field = spec
            .field(&event.name)
            .ok_or_else(|| SessionError::UnknownField(event.name.clone()))?;

        if self.is_locked(&field.name) {
            return Err(SessionError::Locked(field.name.clone()));
        }

        let value = match event.value {
            Some(value) => {
                check_kind(field.kind, &field.name, &value)?;
                if let Some(exclusive) = field.exclusive_option() {
                    let current = self.snapshot.get(&field.name);
                    let disabled = disabled_options(field, current);
                    if value.contains(&exclusive.value)
                        && let Some(option) = value
                            .as_set()
                            .and_then(|set| set.iter().find(|option| disabled.contains(*option)))
                    {
                        return Err(SessionError::OptionDisabled {
                            field: field.name.clone(),
                            option: option.clone(),
                        });
                    }
                }
                Some(normalize_exclusive(field, value))
            }
            None => None,
        };

        match &value {
            Some(value) => self.snapshot.set(field.name.clone(), value.clone()),
            None => self.snapshot.remove(&field.name),
        };

        let mut report = ChangeReport {
            stored: value,
            ..ChangeReport::default()
        };
        let mut checked = vec![field.name.clone()];
        let mut retract_only = Vec::new();
        let mut written = BTreeSet::from([field.name.clone()]);
        let mut queue = VecDeque::from([field.name.clone()]);

        while let Some(trigger) = queue.pop_front() {
            let outcome = evaluate(&spec, &trigger, &self.snapshot);
            for target in self.visibility.apply(&outcome.changes) {
                match &target {
                    Target::Field(name) => retract_only.push(name.clone()),
                    Target::Section(id) => {
                        if let Some(section) = spec.section(id) {
                            retract_only.extend(section.fields.iter().map(|f| f.name.clone()));
                        }
                    }
                }
                report.moved.push(target);
            }
            for write in outcome.mirrors {
                if !written.insert(write.target.clone()) {
                    continue;
                }
                let value = match spec.field(&write.target) {
                    Some(target) => normalize_exclusive(target, write.value),
                    None => write.value,
                };
                debug!(source = %write.source, target = %write.target, "mirrored value");
                self.snapshot.set(write.target.clone(), value);
                checked.push(write.target.clone());
                report.mirrored.push(write.target.clone());
                queue.push_back(write.target);
            }
        }

        let flags = detect(&spec, &self.snapshot);
        report.red_flags_changed = flags != self.red_flags;
        self.red_flags = flags;

        // Newly shown fields are not flagged until the user reaches them;
        // fields that moved only lose errors that no longer apply.
        let retract_only: Vec<String> = retract_only
            .into_iter()
            .filter(|name| !checked.contains(name) && self.ledger.error_for(name).is_some())
            .collect();
        report.errors = self.ledger.revalidate(
            &spec,
            &self.snapshot,
            &self.visibility,
            checked.iter().chain(retract_only.iter()).map(String::as_str),
        );

        debug!(
            field = %field.name,
            mirrored = report.mirrored.len(),
            moved = report.moved.len(),
            raised = report.errors.raised.len(),
            retracted = report.errors.retracted.len(),
            "applied field change"
        );
        Ok(report)
    }

    /// Full pass over the form; the ledger is replaced by its result.
    pub fn validate_all(&mut self) -> FormValidation {
        let validation = validate_form(&self.spec, &self.snapshot, &self.visibility);
        self.ledger.replace(&validation);
        validation
    }

    /// Validates one section and marks it complete when it has no errors.
    pub fn complete_section(&mut self, index: usize) -> Vec<ValidationError> {
        let Some(section) = self.spec.sections.get(index) else {
            return Vec::new();
        };
        let names: Vec<&str> = section.fields.iter().map(|f| f.name.as_str()).collect();
        self.ledger
            .revalidate(&self.spec, &self.snapshot, &self.visibility, names.iter().copied());
        let errors: Vec<ValidationError> = self
            .ledger
            .errors()
            .iter()
            .filter(|error| names.contains(&error.field.as_str()))
            .cloned()
            .collect();
        if errors.is_empty() {
            self.progress = self.progress.mark_complete(index + 1);
        }
        errors
    }

    pub fn expand_section(&mut self, index: usize) {
        self.progress = self.progress.expand(index + 1);
    }

    pub fn section_status(&self, index: usize) -> Option<String> {
        let section = self.spec.sections.get(index)?;
        Some(section_status(
            &self.spec,
            section,
            &self.snapshot,
            &self.visibility,
        ))
    }

    /// Submission is available only while no block is active.
    pub fn can_submit(&self) -> bool {
        !self.red_flags.blocks_submission()
    }

    /// Fields outside the first section are locked while a block is active,
    /// except the ones that raised it.
    pub fn is_locked(&self, name: &str) -> bool {
        if !self.red_flags.blocks_submission() {
            return false;
        }
        let in_first = self
            .spec
            .first_section()
            .is_some_and(|section| section.fields.iter().any(|f| f.name == name));
        !in_first && !self.red_flags.blocking_fields().any(|field| field == name)
    }

    pub fn field_state(&self, name: &str) -> Option<FieldState> {
        let field = self.spec.field(name)?;
        Some(FieldState {
            visible: self.visibility.is_field_visible(&self.spec, name),
            required: effective_required(&self.spec, field, &self.visibility),
            enabled: !self.is_locked(name),
            disabled_options: disabled_options(field, self.snapshot.get(name)),
        })
    }

    pub fn payload(&self) -> Result<serde_json::Map<String, serde_json::Value>, TransformError> {
        to_payload(&self.spec, &self.snapshot, &self.visibility)
    }
}

fn check_kind(kind: FieldKind, name: &str, value: &FieldValue) -> Result<(), SessionError> {
    let ok = match kind {
        FieldKind::MultiChoice => value.as_set().is_some(),
        FieldKind::Text | FieldKind::Number | FieldKind::SingleChoice => {
            value.as_scalar().is_some()
        }
    };
    if ok {
        Ok(())
    } else {
        Err(SessionError::KindMismatch {
            field: name.to_string(),
            expected: if kind == FieldKind::MultiChoice {
                "multi-choice"
            } else {
                "single"
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery;
    use crate::validate::ValidationCode;

    fn session() -> FormSession {
        FormSession::new(Arc::new(discovery::load().expect("discovery form")))
    }

    fn set(session: &mut FormSession, name: &str, value: &str) -> ChangeReport {
        session
            .apply(FieldChanged::set(name, FieldValue::one(value)))
            .expect("apply")
    }

    #[test]
    fn unknown_fields_and_wrong_kinds_are_rejected() {
        let mut session = session();
        assert_eq!(
            session.apply(FieldChanged::set("shoe_size", FieldValue::one("9"))),
            Err(SessionError::UnknownField("shoe_size".into()))
        );
        assert!(matches!(
            session.apply(FieldChanged::set("medical_conditions", FieldValue::one("none"))),
            Err(SessionError::KindMismatch { .. })
        ));
    }

    #[test]
    fn exclusive_option_disables_siblings_until_deselected() {
        let mut session = session();
        let report = session
            .apply(FieldChanged::set(
                "current_medications",
                FieldValue::many(["antidepressants", "none"]),
            ))
            .expect("apply");
        assert_eq!(report.stored, Some(FieldValue::many(["none"])));
        let state = session.field_state("current_medications").expect("state");
        assert!(state.disabled_options.contains("antidepressants"));

        assert!(matches!(
            session.apply(FieldChanged::set(
                "current_medications",
                FieldValue::many(["none", "antidepressants"]),
            )),
            Err(SessionError::OptionDisabled { .. })
        ));

        session
            .apply(FieldChanged::set(
                "current_medications",
                FieldValue::many(["antidepressants"]),
            ))
            .expect("apply");
        let state = session.field_state("current_medications").expect("state");
        assert!(state.disabled_options.is_empty());
    }

    #[test]
    fn minor_locks_later_sections_but_not_the_age_field() {
        let mut session = session();
        let report = set(&mut session, "age", "16");
        assert!(report.red_flags_changed);
        assert!(!session.can_submit());
        assert!(session.field_state("main_issue").is_some_and(|s| !s.enabled));
        assert!(session.field_state("weight_kg").is_some_and(|s| s.enabled));
        assert_eq!(
            session.apply(FieldChanged::set("main_issue", FieldValue::one("ed"))),
            Err(SessionError::Locked("main_issue".into()))
        );

        set(&mut session, "age", "25");
        assert!(session.can_submit());
        assert!(session.field_state("main_issue").is_some_and(|s| s.enabled));
    }

    #[test]
    fn emergency_field_stays_editable_while_it_blocks() {
        let mut session = session();
        set(&mut session, "emergency_red_flags", "priapism");
        assert!(!session.can_submit());
        assert!(session.field_state("emergency_red_flags").is_some_and(|s| s.enabled));
        assert!(session.field_state("sleep_quality").is_some_and(|s| !s.enabled));
        set(&mut session, "emergency_red_flags", "none");
        assert!(session.can_submit());
    }

    #[test]
    fn both_issues_mirror_activity_and_cascade() {
        let mut session = session();
        set(&mut session, "relationship_status", "married");
        set(&mut session, "main_issue", "both");
        let report = set(&mut session, "ed_sexual_activity_status", "active");

        assert_eq!(report.mirrored, vec!["pe_sexual_activity_status".to_string()]);
        assert_eq!(
            session.snapshot().get("pe_sexual_activity_status"),
            Some(&FieldValue::one("active"))
        );
        let visible = |name: &str| session.field_state(name).is_some_and(|s| s.visible);
        assert!(visible("ed_partner_hardness"));
        assert!(visible("pe_partner_control"));
        assert!(!visible("pe_sexual_activity_status"));
    }

    #[test]
    fn hiding_a_field_retracts_its_error() {
        let mut session = session();
        set(&mut session, "height_unit", "ft");
        set(&mut session, "height_feet", "9");
        assert_eq!(
            session.errors().first().map(|e| e.code),
            Some(ValidationCode::AboveMaximum)
        );
        let report = set(&mut session, "height_unit", "cm");
        assert_eq!(report.errors.retracted, vec!["height_feet".to_string()]);
        assert!(session.errors().is_empty());
    }

    #[test]
    fn restore_rebuilds_flags_and_visibility() {
        let mut session = session();
        let mut snapshot = FormSnapshot::new();
        snapshot.set("age", FieldValue::one("85"));
        snapshot.set("main_issue", FieldValue::one("pe"));
        session.restore(snapshot);

        assert!(session.can_submit());
        assert_eq!(session.red_flags().warnings().count(), 1);
        assert!(session.visibility().is_section_visible("pe_branch"));
        assert!(!session.visibility().is_section_visible("ed_branch"));
    }

    #[test]
    fn restore_applies_the_exclusive_option() {
        let mut session = session();
        let mut snapshot = FormSnapshot::new();
        snapshot.set("medical_conditions", FieldValue::many(["none", "diabetes"]));
        session.restore(snapshot);

        assert_eq!(
            session.snapshot().get("medical_conditions"),
            Some(&FieldValue::many(["none"]))
        );
        let state = session.field_state("medical_conditions").expect("state");
        assert!(state.disabled_options.contains("diabetes"));
        let payload = session.payload().expect("payload");
        assert_eq!(payload["medical_conditions"], serde_json::json!(["none"]));
    }

    #[test]
    fn completing_a_section_requires_its_fields() {
        let mut session = session();
        let errors = session.complete_section(0);
        assert!(errors.iter().any(|e| e.field == "age"));
        assert_eq!(session.progress().current, 1);

        set(&mut session, "age", "40");
        set(&mut session, "height_cm", "180");
        set(&mut session, "weight_kg", "80");
        assert!(session.complete_section(0).is_empty());
        assert_eq!(session.progress().current, 2);
        assert_eq!(session.section_status(0).as_deref(), Some("4/4 completed"));
    }
}
