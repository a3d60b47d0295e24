use std::collections::BTreeSet;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::spec::field::{FieldDefinition, FieldKind};
use crate::spec::rules::{MirrorRule, RedFlagRule, Target, VisibilityRule};

/// Presentation hints for a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormPresentation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intro: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
}

/// Top-level grouping of related questions, validated in declared order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Section {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default = "default_true")]
    pub visible_by_default: bool,
    pub fields: Vec<FieldDefinition>,
}

fn default_true() -> bool {
    true
}

/// Complete intake form definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormSpec {
    pub id: String,
    pub title: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation: Option<FormPresentation>,
    pub sections: Vec<Section>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub visibility: Vec<VisibilityRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mirrors: Vec<MirrorRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub red_flags: Vec<RedFlagRule>,
}

#[derive(Debug, Error, PartialEq)]
pub enum SpecError {
    #[error("failed to parse form spec: {0}")]
    Parse(String),
    #[error("duplicate section id '{0}'")]
    DuplicateSection(String),
    #[error("duplicate field name '{0}'")]
    DuplicateField(String),
    #[error("rule '{rule}' references unknown {kind} '{name}'")]
    UnknownReference {
        rule: String,
        kind: &'static str,
        name: String,
    },
    #[error("field '{field}' declares more than one exclusive option")]
    MultipleExclusive { field: String },
    #[error("field '{field}' has an invalid pattern: {reason}")]
    InvalidPattern { field: String, reason: String },
    #[error("choice field '{0}' has no options")]
    MissingOptions(String),
    #[error("form must declare at least one section")]
    NoSections,
}

impl FormSpec {
    pub fn from_json(json: &str) -> Result<Self, SpecError> {
        let spec: FormSpec =
            serde_json::from_str(json).map_err(|err| SpecError::Parse(err.to_string()))?;
        spec.check()?;
        Ok(spec)
    }

    /// Rejects duplicate names, unparsable patterns and rules pointing at fields
    /// or sections that do not exist.
    pub fn check(&self) -> Result<(), SpecError> {
        if self.sections.is_empty() {
            return Err(SpecError::NoSections);
        }

        let mut section_ids = BTreeSet::new();
        let mut field_names = BTreeSet::new();
        for section in &self.sections {
            if !section_ids.insert(section.id.as_str()) {
                return Err(SpecError::DuplicateSection(section.id.clone()));
            }
            for field in &section.fields {
                if !field_names.insert(field.name.as_str()) {
                    return Err(SpecError::DuplicateField(field.name.clone()));
                }
                if field.kind.is_choice() && field.options.is_empty() {
                    return Err(SpecError::MissingOptions(field.name.clone()));
                }
                if let Some(pattern) = &field.constraint.pattern
                    && let Err(err) = Regex::new(pattern)
                {
                    return Err(SpecError::InvalidPattern {
                        field: field.name.clone(),
                        reason: err.to_string(),
                    });
                }
                if field.options.iter().filter(|option| option.exclusive).count() > 1 {
                    return Err(SpecError::MultipleExclusive {
                        field: field.name.clone(),
                    });
                }
            }
        }

        let field_ref = |rule: &str, name: &str| {
            if field_names.contains(name) {
                Ok(())
            } else {
                Err(SpecError::UnknownReference {
                    rule: rule.to_string(),
                    kind: "field",
                    name: name.to_string(),
                })
            }
        };

        for rule in &self.visibility {
            field_ref(&rule.id, &rule.trigger)?;
            for target in &rule.targets {
                match target {
                    Target::Field(name) => field_ref(&rule.id, name)?,
                    Target::Section(id) if !section_ids.contains(id.as_str()) => {
                        return Err(SpecError::UnknownReference {
                            rule: rule.id.clone(),
                            kind: "section",
                            name: id.clone(),
                        });
                    }
                    Target::Section(_) => {}
                }
            }
        }

        for mirror in &self.mirrors {
            let label = format!("mirror {}->{}", mirror.source, mirror.target);
            field_ref(&label, &mirror.trigger)?;
            field_ref(&label, &mirror.source)?;
            field_ref(&label, &mirror.target)?;
        }

        for flag in &self.red_flags {
            field_ref("red_flag", flag.field())?;
        }

        Ok(())
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.sections.iter().flat_map(|section| section.fields.iter())
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields().find(|field| field.name == name)
    }

    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.id == id)
    }

    pub fn section_index(&self, id: &str) -> Option<usize> {
        self.sections.iter().position(|section| section.id == id)
    }

    /// Section that owns `field`.
    pub fn section_of(&self, field: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|section| section.fields.iter().any(|def| def.name == field))
    }

    /// Declaration order of a field across all sections.
    pub fn field_position(&self, name: &str) -> Option<usize> {
        self.fields().position(|field| field.name == name)
    }

    pub fn first_section(&self) -> Option<&Section> {
        self.sections.first()
    }

    pub fn multi_choice_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields()
            .filter(|field| field.kind == FieldKind::MultiChoice)
    }
}
