//! The built-in Discovery Call form.

use crate::spec::{FormSpec, SpecError};

/// Raw definition shipped with the crate.
pub const DISCOVERY_CALL_JSON: &str = include_str!("../forms/discovery_call.json");

/// Parses and checks the built-in form.
pub fn load() -> Result<FormSpec, SpecError> {
    FormSpec::from_json(DISCOVERY_CALL_JSON)
}
