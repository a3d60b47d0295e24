use std::collections::BTreeSet;

use intake_spec::{
    FieldDefinition, FieldKind, FieldState, FieldValue, FormSession, FormView, RedFlag, Severity,
};

/// Controls which bits of state the wizard prints.
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum Verbosity {
    /// Clean output: question prompts only.
    Clean,
    /// Verbose output: section status, choices, error details, help text.
    Verbose,
}

impl Verbosity {
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Clean
        }
    }

    pub fn is_verbose(&self) -> bool {
        matches!(self, Verbosity::Verbose)
    }
}

/// Prints prompts and feedback while the form is being filled in.
pub struct WizardPresenter {
    verbosity: Verbosity,
    header_printed: bool,
    show_answers_json: bool,
    current_section: Option<usize>,
}

impl WizardPresenter {
    pub fn new(verbosity: Verbosity, show_answers_json: bool) -> Self {
        Self {
            verbosity,
            header_printed: false,
            show_answers_json,
            current_section: None,
        }
    }

    pub fn show_header(&mut self, view: &FormView) {
        if self.header_printed {
            return;
        }
        println!("Form: {} (v{})", view.form_title, view.form_version);
        if self.verbosity.is_verbose()
            && let Some(help) = &view.help
        {
            println!("Help: {}", help);
        }
        self.header_printed = true;
    }

    /// Prints the section banner once per section change.
    pub fn show_section(&mut self, session: &FormSession, index: usize) {
        if self.current_section == Some(index) {
            return;
        }
        self.current_section = Some(index);
        let Some(section) = session.spec().sections.get(index) else {
            return;
        };
        println!();
        println!("== {} ==", section.title);
        if self.verbosity.is_verbose() {
            println!("{}", session.progress().label());
            if let Some(status) = session.section_status(index) {
                println!("Status: {}", status);
            }
        }
    }

    pub fn show_prompt(&self, prompt: &PromptContext) {
        let mut line = format!("{}/{} {}", prompt.index, prompt.total, prompt.title);
        if prompt.required {
            line.push_str(" *");
        }
        if let Some(hint) = &prompt.hint {
            line.push(' ');
            line.push_str(hint);
        }
        println!("{}", line);
        if let Some(current) = &prompt.current {
            println!("Current answer: {}", current);
        }
        if let Some(error) = &prompt.error {
            println!("! {}", error);
        }
        if !prompt.choices.is_empty() {
            for (position, choice) in prompt.choices.iter().enumerate() {
                println!("  {}) {}", position + 1, choice);
            }
        }
    }

    pub fn show_parse_error(&self, error: &AnswerParseError) {
        eprintln!("Invalid answer: {}", error.user_message);
        if self.verbosity.is_verbose()
            && let Some(debug) = &error.debug_message
        {
            eprintln!("  Expected: {}", debug);
        }
    }

    pub fn show_field_error(&self, message: &str) {
        eprintln!("! {}", message);
    }

    pub fn show_red_flags(&self, flags: &[RedFlag]) {
        for flag in flags {
            match flag.severity {
                Severity::Block => eprintln!("[BLOCKED] {}", flag.message),
                Severity::Warning => eprintln!("[WARNING] {}", flag.message),
            }
        }
    }

    pub fn show_locked(&self, field_labels: &[String]) {
        eprintln!(
            "The form is locked. Change {} to continue, or type 'exit'.",
            field_labels.join(" or ")
        );
    }

    pub fn show_completion(&self, session: &FormSession) {
        println!();
        println!("All questions answered ({})", session.progress().label());
        if self.show_answers_json {
            match serde_json::to_string_pretty(session.snapshot()) {
                Ok(pretty) => println!("{}", pretty),
                Err(err) => eprintln!("Failed to serialize answers to JSON: {}", err),
            }
        }
    }
}

/// Context used to format a single prompt.
pub struct PromptContext {
    pub index: usize,
    pub total: usize,
    pub title: String,
    pub required: bool,
    pub hint: Option<String>,
    pub choices: Vec<String>,
    pub current: Option<String>,
    pub error: Option<String>,
}

impl PromptContext {
    /// `index` is the 1-based position of the field among the visible fields
    /// of its section.
    pub fn new(
        field: &FieldDefinition,
        state: &FieldState,
        session: &FormSession,
        index: usize,
        total: usize,
    ) -> Self {
        let choices = field
            .options
            .iter()
            .map(|option| {
                let mut entry = format!("{} [{}]", option.label, option.value);
                if state.disabled_options.contains(&option.value) {
                    entry.push_str(" (unavailable)");
                }
                entry
            })
            .collect();
        let error = session
            .errors()
            .iter()
            .find(|error| error.field == field.name)
            .map(|error| error.message.clone());
        Self {
            index: index.max(1),
            total,
            title: field.label.clone(),
            required: state.required,
            hint: hint(field),
            choices,
            current: session.snapshot().get(&field.name).map(FieldValue::display),
            error,
        }
    }
}

fn hint(field: &FieldDefinition) -> Option<String> {
    match field.kind {
        FieldKind::Number => match (field.constraint.min, field.constraint.max) {
            (Some(min), Some(max)) => Some(format!("({}-{})", min, max)),
            _ => Some("(number)".to_string()),
        },
        FieldKind::SingleChoice => Some("(pick one: number or value)".to_string()),
        FieldKind::MultiChoice => Some("(pick any: comma separated)".to_string()),
        FieldKind::Text => field
            .constraint
            .max_len
            .map(|limit| format!("(up to {} characters)", limit)),
    }
}

/// Error produced when parsing answers from the user.
#[derive(Debug)]
pub struct AnswerParseError {
    pub user_message: String,
    pub debug_message: Option<String>,
}

impl AnswerParseError {
    pub fn new(user_message: impl Into<String>, debug_message: Option<String>) -> Self {
        Self {
            user_message: user_message.into(),
            debug_message,
        }
    }
}

/// Parses one line of input for `field`. `Ok(None)` means the optional
/// question was skipped.
pub fn parse_answer(
    field: &FieldDefinition,
    required: bool,
    raw: &str,
) -> Result<Option<FieldValue>, AnswerParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        if required {
            return Err(AnswerParseError::new(
                "This question requires an answer.",
                None,
            ));
        }
        return Ok(None);
    }

    match field.kind {
        FieldKind::Text => Ok(Some(FieldValue::one(trimmed))),
        FieldKind::Number => parse_number(trimmed).map(Some),
        FieldKind::SingleChoice => parse_choice(field, trimmed)
            .map(FieldValue::one)
            .map(Some),
        FieldKind::MultiChoice => parse_choices(field, trimmed).map(Some),
    }
}

fn parse_number(raw: &str) -> Result<FieldValue, AnswerParseError> {
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(FieldValue::one(raw)),
        Ok(_) => Err(AnswerParseError::new(
            "Please enter a finite number.",
            Some("number must be finite".to_string()),
        )),
        Err(_) => Err(AnswerParseError::new(
            "Please enter a number.",
            Some("expected number".to_string()),
        )),
    }
}

/// Accepts an option's value, its label, or its 1-based position.
fn parse_choice(field: &FieldDefinition, raw: &str) -> Result<String, AnswerParseError> {
    if let Ok(position) = raw.parse::<usize>()
        && let Some(option) = position.checked_sub(1).and_then(|i| field.options.get(i))
    {
        return Ok(option.value.clone());
    }
    field
        .options
        .iter()
        .find(|option| {
            option.value.eq_ignore_ascii_case(raw) || option.label.eq_ignore_ascii_case(raw)
        })
        .map(|option| option.value.clone())
        .ok_or_else(|| {
            let allowed = field
                .options
                .iter()
                .map(|option| option.value.as_str())
                .collect::<Vec<_>>();
            AnswerParseError::new(
                format!("'{}' is not one of the listed choices.", raw),
                Some(format!("allowed values: {}", allowed.join(", "))),
            )
        })
}

fn parse_choices(field: &FieldDefinition, raw: &str) -> Result<FieldValue, AnswerParseError> {
    let picked = raw
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| parse_choice(field, token))
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(FieldValue::Many(picked))
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_spec::discovery;

    fn field(name: &str) -> FieldDefinition {
        discovery::load()
            .expect("discovery form")
            .field(name)
            .cloned()
            .expect("field")
    }

    #[test]
    fn numbers_keep_the_entered_text() {
        let age = field("age");
        assert_eq!(
            parse_answer(&age, true, " 42 ").expect("age"),
            Some(FieldValue::one("42"))
        );
        assert!(parse_answer(&age, true, "forty").is_err());
    }

    #[test]
    fn single_choice_accepts_value_label_or_position() {
        let issue = field("main_issue");
        let first = issue.options[0].clone();
        for input in [first.value.as_str(), first.label.as_str(), "1"] {
            assert_eq!(
                parse_answer(&issue, true, input).expect("choice"),
                Some(FieldValue::one(first.value.clone()))
            );
        }
        assert!(parse_answer(&issue, true, "99").is_err());
        assert!(parse_answer(&issue, true, "unknown").is_err());
    }

    #[test]
    fn multi_choice_splits_on_commas() {
        let conditions = field("medical_conditions");
        let answer = parse_answer(&conditions, true, "1, 2,1").expect("choices");
        let expected = FieldValue::many([
            conditions.options[0].value.clone(),
            conditions.options[1].value.clone(),
        ]);
        assert_eq!(answer, Some(expected));
    }

    #[test]
    fn blank_answers_skip_only_optional_questions() {
        let age = field("age");
        assert!(parse_answer(&age, true, "   ").is_err());
        assert_eq!(parse_answer(&age, false, "").expect("skip"), None);
    }
}
