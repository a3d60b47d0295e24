pub mod field;
pub mod form;
pub mod rules;

pub use field::{ChoiceOption, Constraint, FieldDefinition, FieldKind, NumberFormat, Transmit};
pub use form::{FormPresentation, FormSpec, Section, SpecError};
pub use rules::{Effect, MirrorRule, RedFlagRule, Severity, Target, VisibilityRule};
