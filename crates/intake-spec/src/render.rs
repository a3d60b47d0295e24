use handlebars::Handlebars;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::analysis::{AnalysisResult, RootCause};
use crate::red_flag::RedFlag;
use crate::session::FormSession;
use crate::spec::FieldKind;
use crate::validate::ValidationError;
use crate::value::FieldValue;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid template: {0}")]
    Template(#[from] handlebars::TemplateError),
    #[error("failed to render: {0}")]
    Render(#[from] handlebars::RenderError),
}

/// Status labels returned by the form renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStatus {
    /// Visible required questions are still unanswered.
    NeedInput,
    /// Every visible required question has an answer.
    Complete,
    /// An active red flag blocks the form.
    Blocked,
}

impl RenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStatus::NeedInput => "need_input",
            RenderStatus::Complete => "complete",
            RenderStatus::Blocked => "blocked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionView {
    pub value: String,
    pub label: String,
    pub selected: bool,
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldView {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    pub visible: bool,
    pub enabled: bool,
    pub value: Option<FieldValue>,
    pub options: Vec<OptionView>,
    pub error: Option<String>,
    /// `used/limit` for capped text fields.
    pub char_count: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionView {
    pub id: String,
    pub title: String,
    pub status: String,
    pub visible: bool,
    pub fields: Vec<FieldView>,
}

/// Summary shown above the form after a failed submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBanner {
    pub message: String,
    pub fields: Vec<String>,
}

/// Everything a front-end needs to draw the form in its current state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormView {
    pub form_id: String,
    pub form_title: String,
    pub form_version: String,
    pub status: RenderStatus,
    pub progress: String,
    pub help: Option<String>,
    pub red_flags: Vec<RedFlag>,
    pub error_banner: Option<ErrorBanner>,
    pub sections: Vec<SectionView>,
}

pub fn error_banner(errors: &[ValidationError]) -> Option<ErrorBanner> {
    if errors.is_empty() {
        return None;
    }
    Some(ErrorBanner {
        message: format!("{} required fields missing", errors.len()),
        fields: errors.iter().map(|error| error.label.clone()).collect(),
    })
}

/// Build the form view from the session's current state.
pub fn build_form_view(session: &FormSession) -> FormView {
    let spec = session.spec();
    let snapshot = session.snapshot();
    let visibility = session.visibility();
    let mut missing_required = false;

    let sections = spec
        .sections
        .iter()
        .enumerate()
        .map(|(index, section)| {
            let fields = section
                .fields
                .iter()
                .map(|field| {
                    let state = session.field_state(&field.name);
                    let value = snapshot.get(&field.name).cloned();
                    let visible = state.as_ref().is_some_and(|s| s.visible);
                    let required = state.as_ref().is_some_and(|s| s.required);
                    if visible && required && value.as_ref().is_none_or(FieldValue::is_empty) {
                        missing_required = true;
                    }
                    let disabled = state
                        .as_ref()
                        .map(|s| s.disabled_options.clone())
                        .unwrap_or_default();
                    FieldView {
                        name: field.name.clone(),
                        label: field.label.clone(),
                        kind: field.kind,
                        required,
                        visible,
                        enabled: state.as_ref().is_none_or(|s| s.enabled),
                        options: field
                            .options
                            .iter()
                            .map(|option| OptionView {
                                value: option.value.clone(),
                                label: option.label.clone(),
                                selected: value.as_ref().is_some_and(|v| v.contains(&option.value)),
                                disabled: disabled.contains(&option.value),
                            })
                            .collect(),
                        error: session
                            .errors()
                            .iter()
                            .find(|error| error.field == field.name)
                            .map(|error| error.message.clone()),
                        char_count: field.constraint.max_len.filter(|_| field.kind == FieldKind::Text).map(|limit| {
                            let used = value
                                .as_ref()
                                .and_then(FieldValue::as_scalar)
                                .map(|text| text.chars().count())
                                .unwrap_or(0);
                            format!("{used}/{limit}")
                        }),
                        value,
                    }
                })
                .collect();
            SectionView {
                id: section.id.clone(),
                title: section.title.clone(),
                status: session.section_status(index).unwrap_or_default(),
                visible: visibility.is_section_visible(&section.id),
                fields,
            }
        })
        .collect();

    let status = if !session.can_submit() {
        RenderStatus::Blocked
    } else if missing_required {
        RenderStatus::NeedInput
    } else {
        RenderStatus::Complete
    };

    let help = spec
        .presentation
        .as_ref()
        .and_then(|presentation| presentation.intro.clone())
        .or_else(|| spec.description.clone());

    FormView {
        form_id: spec.id.clone(),
        form_title: spec.title.clone(),
        form_version: spec.version.clone(),
        status,
        progress: session.progress().label(),
        help,
        red_flags: session.red_flags().flags.clone(),
        error_banner: error_banner(session.errors()),
        sections,
    }
}

/// Render the view as a structured JSON-friendly value.
pub fn render_json_ui(view: &FormView) -> Value {
    let sections = view
        .sections
        .iter()
        .filter(|section| section.visible)
        .map(|section| {
            let fields = section
                .fields
                .iter()
                .filter(|field| field.visible)
                .map(|field| serde_json::to_value(field).unwrap_or(Value::Null))
                .collect::<Vec<_>>();
            json!({
                "id": section.id,
                "title": section.title,
                "status": section.status,
                "fields": fields,
            })
        })
        .collect::<Vec<_>>();

    json!({
        "form_id": view.form_id,
        "form_title": view.form_title,
        "form_version": view.form_version,
        "status": view.status.as_str(),
        "progress": view.progress,
        "help": view.help,
        "red_flags": view.red_flags,
        "error_banner": view.error_banner,
        "sections": sections,
    })
}

/// Render the view as human-friendly text.
pub fn render_text(view: &FormView) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Form: {} (v{})", view.form_title, view.form_version));
    lines.push(format!("Status: {} ({})", view.status.as_str(), view.progress));
    if let Some(help) = &view.help {
        lines.push(format!("Help: {help}"));
    }
    for flag in &view.red_flags {
        lines.push(format!("! {}", flag.message));
    }
    if let Some(banner) = &view.error_banner {
        lines.push(format!("{}: {}", banner.message, banner.fields.join(", ")));
    }

    for section in view.sections.iter().filter(|section| section.visible) {
        lines.push(format!("[{}] {}", section.title, section.status));
        for field in section.fields.iter().filter(|field| field.visible) {
            let mut entry = format!(" - {} ({})", field.name, field.label);
            if field.required {
                entry.push_str(" [required]");
            }
            if !field.enabled {
                entry.push_str(" [locked]");
            }
            if let Some(value) = &field.value {
                entry.push_str(&format!(" = {}", value.display()));
            }
            if let Some(count) = &field.char_count {
                entry.push_str(&format!(" ({count})"));
            }
            lines.push(entry);
            if let Some(error) = &field.error {
                lines.push(format!("     ! {error}"));
            }
        }
    }

    lines.join("\n")
}

/// Red flag reported by the analysis service, shown instead of the diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertView {
    pub message: String,
    pub action: Option<String>,
    pub severity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RootCauseView {
    pub rank: usize,
    pub category: String,
    pub simple_term: Option<String>,
    pub confidence_percent: u8,
    pub explanation: String,
    pub contributing_factors: Vec<String>,
    pub analogy: Option<String>,
}

impl RootCauseView {
    fn new(rank: usize, cause: &RootCause) -> Self {
        Self {
            rank,
            category: cause.category.clone(),
            simple_term: cause.simple_term.clone(),
            confidence_percent: cause.confidence_percent(),
            explanation: cause.explanation.clone(),
            contributing_factors: cause.contributing_factors.clone(),
            analogy: cause.analogy.clone(),
        }
    }
}

/// Presentation of an analysis result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosisView {
    pub alert: Option<AlertView>,
    pub primary_diagnosis: Option<String>,
    pub root_causes: Vec<RootCauseView>,
    pub summary: Option<String>,
    pub treatment: Option<String>,
    pub actions: Vec<String>,
    pub requires_specialist: bool,
    pub elapsed: Option<String>,
    pub chunks: u32,
    pub model: Option<String>,
    pub language: Option<String>,
}

impl From<&AnalysisResult> for DiagnosisView {
    fn from(result: &AnalysisResult) -> Self {
        let alert = result.red_flags.first().map(|flag| AlertView {
            message: flag.message().to_string(),
            action: flag.action().map(str::to_string),
            severity: flag.severity().map(str::to_string),
        });
        Self {
            alert,
            primary_diagnosis: result.primary_diagnosis.clone(),
            root_causes: result
                .root_causes
                .iter()
                .enumerate()
                .map(|(index, cause)| RootCauseView::new(index + 1, cause))
                .collect(),
            summary: result.summary.clone(),
            treatment: result.treatment_recommendation.clone(),
            actions: result
                .recommended_actions
                .iter()
                .map(|action| action.describe())
                .collect(),
            requires_specialist: result.requires_specialist,
            elapsed: result
                .processing_time_ms
                .map(|ms| format!("{:.2}s", ms as f64 / 1000.0)),
            chunks: result.retrieval_chunks_used.unwrap_or(0),
            model: result.model_used.clone(),
            language: result.language.clone(),
        }
    }
}

const DIAGNOSIS_TEMPLATE: &str = r#"{{#if alert~}}
RED FLAG DETECTED
{{alert.message}}
{{#if alert.action}}Required action: {{alert.action}}
{{/if}}{{#if alert.severity}}Severity: {{alert.severity}}
{{/if}}
{{~else~}}
Diagnosis complete{{#if elapsed}} in {{elapsed}}{{/if}} ({{chunks}} knowledge chunks)
{{#if primary_diagnosis}}Primary diagnosis: {{primary_diagnosis}}
{{/if}}
{{#each root_causes}}
Root cause #{{rank}}: {{category}}{{#if simple_term}} ({{simple_term}}){{/if}} - {{confidence_percent}}% confidence
  {{explanation}}
{{#each contributing_factors}}  * {{this}}
{{/each}}{{#if analogy}}  Analogy: {{analogy}}
{{/if}}{{/each}}
{{#if summary}}Summary: {{summary}}
{{/if}}{{#if treatment}}Treatment recommendation: {{treatment}}
{{/if}}{{#each actions}}- {{this}}
{{/each}}{{#if requires_specialist}}Specialist referral required.
{{/if}}{{#if language}}Language: {{language}}
{{/if}}{{#if model}}Model: {{model}}
{{/if}}
{{~/if}}"#;

/// Renders the diagnosis as plain text.
pub fn render_diagnosis_text(view: &DiagnosisView) -> Result<String, RenderError> {
    let mut engine = Handlebars::new();
    engine.register_escape_fn(handlebars::no_escape);
    engine.register_template_string("diagnosis", DIAGNOSIS_TEMPLATE)?;
    Ok(engine.render("diagnosis", view)?)
}
