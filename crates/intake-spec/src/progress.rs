use std::collections::BTreeSet;

use serde::Serialize;

use crate::spec::{FormSpec, Section};
use crate::value::FormSnapshot;
use crate::visibility::{VisibilityState, effective_required};

/// Which section is open and which are done. Sections are numbered from 1.
///
/// Every transition returns a new value so the session owns the only copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionProgress {
    pub current: usize,
    pub completed: BTreeSet<usize>,
    pub total: usize,
}

/// Indicator state of one numbered section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    Completed,
    Active,
    Pending,
}

impl SectionProgress {
    pub fn new(total: usize) -> Self {
        Self {
            current: 1,
            completed: BTreeSet::new(),
            total,
        }
    }

    pub fn for_form(spec: &FormSpec) -> Self {
        Self::new(spec.sections.len())
    }

    /// Opens `section`; out-of-range numbers leave the progress untouched.
    pub fn expand(&self, section: usize) -> Self {
        if section == 0 || section > self.total {
            return self.clone();
        }
        Self {
            current: section,
            ..self.clone()
        }
    }

    /// Marks `section` done and opens the one after it, if any.
    pub fn mark_complete(&self, section: usize) -> Self {
        if section == 0 || section > self.total {
            return self.clone();
        }
        let mut completed = self.completed.clone();
        completed.insert(section);
        let current = if section < self.total {
            section + 1
        } else {
            self.current
        };
        Self {
            current,
            completed,
            total: self.total,
        }
    }

    /// Position of the open section, not the number of completed ones:
    /// section 1 is 0%, section 2 of 6 is 17%.
    pub fn percentage(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let ratio = self.current.saturating_sub(1) as f64 / self.total as f64;
        (ratio * 100.0).round() as u8
    }

    pub fn indicator(&self, section: usize) -> Indicator {
        if self.completed.contains(&section) {
            Indicator::Completed
        } else if section == self.current {
            Indicator::Active
        } else {
            Indicator::Pending
        }
    }

    pub fn label(&self) -> String {
        format!(
            "Section {} of {} • {}% Complete",
            self.current,
            self.total,
            self.percentage()
        )
    }
}

/// Header text of a section: `Optional`, or how many visible questions are done.
/// A question without an effective requirement counts as done.
pub fn section_status(
    spec: &FormSpec,
    section: &Section,
    snapshot: &FormSnapshot,
    visibility: &VisibilityState,
) -> String {
    if section.optional {
        return "Optional".into();
    }
    let visible: Vec<_> = section
        .fields
        .iter()
        .filter(|field| visibility.is_field_visible(spec, &field.name))
        .collect();
    let done = visible
        .iter()
        .filter(|field| {
            !effective_required(spec, field, visibility)
                || snapshot.get(&field.name).is_some_and(|value| !value.is_empty())
        })
        .count();
    format!("{done}/{} completed", visible.len())
}
