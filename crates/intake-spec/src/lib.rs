#![allow(missing_docs)]

pub mod analysis;
pub mod condition;
pub mod discovery;
pub mod progress;
pub mod red_flag;
pub mod render;
pub mod schema;
pub mod session;
pub mod spec;
pub mod transform;
pub mod validate;
pub mod value;
pub mod visibility;

pub use analysis::{AnalysisResult, HealthStatus, RecommendedAction, RootCause, ServiceRedFlag};
pub use condition::Condition;
pub use progress::{Indicator, SectionProgress, section_status};
pub use red_flag::{
    EmergencySymptom, FlagKind, RedFlag, RedFlagReport, check_age_boundaries,
    check_emergency_symptom, detect,
};
pub use render::{
    DiagnosisView, ErrorBanner, FormView, RenderError, RenderStatus, build_form_view,
    error_banner, render_diagnosis_text, render_json_ui, render_text,
};
pub use schema::{analysis_schema, payload_schema, spec_schema};
pub use session::{ChangeReport, FieldChanged, FieldState, FormSession, SessionError};
pub use spec::{
    ChoiceOption, Constraint, Effect, FieldDefinition, FieldKind, FormSpec, MirrorRule,
    NumberFormat, RedFlagRule, Section, Severity, SpecError, Target, Transmit, VisibilityRule,
};
pub use transform::{TransformError, to_payload};
pub use validate::{
    ErrorLedger, FormValidation, LedgerDelta, ValidationCode, ValidationError, validate_field,
    validate_form,
};
pub use value::{FieldValue, FormSnapshot};
pub use visibility::{
    VisibilityChange, VisibilityMap, VisibilityOutcome, VisibilityState, evaluate,
    is_mirror_target, resolve_visibility,
};
