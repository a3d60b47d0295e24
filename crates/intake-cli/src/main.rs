mod wizard;

use clap::{Parser, Subcommand, ValueEnum};
use intake_client::{
    AnalysisClient, FileSnapshotStore, FormController, HttpAnalysisClient, IntakeConfig,
    PipelineState, SnapshotStore, StoreError, SubmissionPipeline, SubmitError, SubmitOutcome,
};
use intake_spec::{
    DiagnosisView, FieldChanged, FieldDefinition, FieldState, FieldValue, FormSession,
    FormSnapshot, FormSpec, RedFlag, Severity, ValidationError, analysis_schema,
    build_form_view, discovery, error_banner, payload_schema, render_diagnosis_text,
    render_json_ui, render_text, spec_schema,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use wizard::{PromptContext, Verbosity, WizardPresenter, parse_answer};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Discovery Call intake form in the terminal",
    long_about = "Fill in, check and submit the Discovery Call medical intake form against the analysis service"
)]
struct Cli {
    /// Analysis service root, e.g. http://localhost:8000.
    #[arg(long, global = true, value_name = "URL")]
    base_url: Option<String>,
    /// Directory holding the saved in-progress form.
    #[arg(long, global = true, value_name = "DIR")]
    state_dir: Option<PathBuf>,
    /// Seconds to wait for the analysis service.
    #[arg(long, global = true, value_name = "SECS")]
    timeout_secs: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SchemaKind {
    /// The form definition format.
    Spec,
    /// The body sent to the analysis service.
    Payload,
    /// The analysis service response.
    Analysis,
}

#[derive(Subcommand)]
enum Command {
    /// Fill in the form question by question, resuming any saved answers.
    Fill {
        /// JSON file with answers to start from.
        #[arg(long, value_name = "ANSWERS")]
        answers: Option<PathBuf>,
        /// Discard the saved form and start empty.
        #[arg(long)]
        fresh: bool,
        /// Show verbose output (section progress, parse expectations).
        #[arg(long, alias = "debug")]
        verbose: bool,
        /// Print the answers as JSON once every question is answered.
        #[arg(long)]
        answers_json: bool,
    },
    /// Validate an answers file and report red flags.
    Validate {
        /// Path to the answers JSON file.
        #[arg(long, value_name = "ANSWERS")]
        answers: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print the analysis payload an answers file would produce.
    Payload {
        #[arg(long, value_name = "ANSWERS")]
        answers: PathBuf,
    },
    /// Validate an answers file, send it for analysis and print the diagnosis.
    Submit {
        #[arg(long, value_name = "ANSWERS")]
        answers: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Check that the analysis service is up.
    Health,
    /// Show the form as it would render, optionally with answers filled in.
    Describe {
        #[arg(long, value_name = "ANSWERS")]
        answers: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print a JSON schema.
    Schema {
        #[arg(value_enum)]
        kind: SchemaKind,
    },
}

#[tokio::main]
async fn main() -> CliResult<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "discovery_intake=info,intake_client=warn".into()),
        )
        .with(fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    debug!(base_url = %config.base_url, "configuration loaded");

    match cli.command {
        Command::Fill {
            answers,
            fresh,
            verbose,
            answers_json,
        } => run_fill(&config, answers, fresh, verbose, answers_json).await,
        Command::Validate { answers, format } => run_validate(&answers, format),
        Command::Payload { answers } => run_payload(&answers),
        Command::Submit { answers, format } => run_submit(&config, &answers, format).await,
        Command::Health => run_health(&config).await,
        Command::Describe { answers, format } => run_describe(answers.as_deref(), format),
        Command::Schema { kind } => run_schema(kind),
    }
}

/// Config file and environment first, then command-line flags.
fn load_config(cli: &Cli) -> CliResult<IntakeConfig> {
    let mut config = IntakeConfig::load()?;
    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(dir) = &cli.state_dir {
        config.state_dir = Some(dir.clone());
    }
    if let Some(secs) = cli.timeout_secs {
        if secs == 0 {
            return Err("--timeout-secs must be greater than zero".into());
        }
        config.timeout_secs = secs;
    }
    Ok(config)
}

fn load_spec() -> CliResult<Arc<FormSpec>> {
    Ok(Arc::new(discovery::load()?))
}

fn read_snapshot(path: &Path) -> CliResult<FormSnapshot> {
    let contents = fs::read_to_string(path)?;
    let answers: Value = serde_json::from_str(&contents)?;
    if !answers.is_object() {
        return Err(format!("{} must contain a JSON object", path.display()).into());
    }
    Ok(FormSnapshot::from_json(&answers))
}

/// Builds a session from an answers file. Also returns the answer keys the
/// form does not know.
fn load_session(path: &Path) -> CliResult<(FormSession, Vec<String>)> {
    let spec = load_spec()?;
    let snapshot = read_snapshot(path)?;
    let unknown_fields = snapshot
        .iter()
        .map(|(name, _)| name)
        .filter(|name| spec.field(name).is_none())
        .cloned()
        .collect();
    let mut session = FormSession::new(spec);
    session.restore(snapshot);
    Ok((session, unknown_fields))
}

#[derive(Serialize)]
struct ValidationReport<'a> {
    valid: bool,
    errors: &'a [ValidationError],
    first_invalid_section: Option<&'a str>,
    red_flags: &'a [RedFlag],
    submission_blocked: bool,
    unknown_fields: &'a [String],
}

fn run_validate(answers_path: &Path, format: OutputFormat) -> CliResult<()> {
    let (mut session, unknown_fields) = load_session(answers_path)?;
    let validation = session.validate_all();
    let blocked = !session.can_submit();

    match format {
        OutputFormat::Json => {
            let report = ValidationReport {
                valid: validation.is_valid,
                errors: &validation.errors,
                first_invalid_section: validation.first_invalid_section_id(session.spec()),
                red_flags: &session.red_flags().flags,
                submission_blocked: blocked,
                unknown_fields: &unknown_fields,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!(
                "Validation result: {}",
                if validation.is_valid { "valid" } else { "invalid" }
            );
            describe_errors(&validation.errors);
            describe_red_flags(&session.red_flags().flags);
            if !unknown_fields.is_empty() {
                println!("Unknown answer fields: {}", unknown_fields.join(", "));
            }
        }
    }

    if !validation.is_valid {
        Err("validation failed".into())
    } else if blocked {
        Err("submission blocked by an active red flag".into())
    } else {
        Ok(())
    }
}

fn describe_errors(errors: &[ValidationError]) {
    let Some(banner) = error_banner(errors) else {
        return;
    };
    println!("{}: {}", banner.message, banner.fields.join(", "));
    println!("Errors:");
    for error in errors {
        println!("  {} - {}", error.field, error.message);
    }
}

fn describe_red_flags(flags: &[RedFlag]) {
    if flags.is_empty() {
        return;
    }
    println!("Red flags:");
    for flag in flags {
        println!("  [{}] {}", severity_label(flag.severity), flag.message);
    }
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Block => "block",
        Severity::Warning => "warning",
    }
}

fn run_payload(answers_path: &Path) -> CliResult<()> {
    let (session, _) = load_session(answers_path)?;
    let payload = session.payload()?;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

async fn run_submit(config: &IntakeConfig, answers_path: &Path, format: OutputFormat) -> CliResult<()> {
    let (mut session, _) = load_session(answers_path)?;
    let client: Arc<dyn AnalysisClient> = Arc::new(HttpAnalysisClient::new(config));
    let mut pipeline = SubmissionPipeline::new(client, config.timeout());
    info!(url = %config.analyze_url(), "submitting form");
    let outcome = pipeline.submit(&mut session).await;
    report_outcome(outcome, format)
}

fn report_outcome(outcome: SubmitOutcome, format: OutputFormat) -> CliResult<()> {
    match outcome {
        SubmitOutcome::Success(result) => {
            match format {
                OutputFormat::Text => {
                    println!("{}", render_diagnosis_text(&DiagnosisView::from(&result))?)
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
            }
            Ok(())
        }
        SubmitOutcome::Invalid(validation) => {
            describe_errors(&validation.errors);
            Err("validation failed".into())
        }
        SubmitOutcome::Blocked(flags) => {
            describe_red_flags(&flags);
            Err("submission blocked by an active red flag".into())
        }
        SubmitOutcome::Failed(err) => {
            eprintln!("{}", err.user_message());
            Err(err.into())
        }
    }
}

async fn run_health(config: &IntakeConfig) -> CliResult<()> {
    let client = HttpAnalysisClient::new(config);
    let health = match client.health().await {
        Ok(health) => health,
        Err(err) => {
            eprintln!("{}", SubmitError::from(err.clone()).user_message());
            return Err(err.into());
        }
    };
    println!("Status: {}", health.status);
    if let Some(version) = &health.version {
        println!("Version: {}", version);
    }
    for (service, up) in &health.services {
        println!("  {}: {}", service, if *up { "up" } else { "down" });
    }
    if health.is_healthy() {
        Ok(())
    } else {
        Err("analysis service is not healthy".into())
    }
}

fn run_describe(answers_path: Option<&Path>, format: OutputFormat) -> CliResult<()> {
    let session = match answers_path {
        Some(path) => load_session(path)?.0,
        None => FormSession::new(load_spec()?),
    };
    let view = build_form_view(&session);
    match format {
        OutputFormat::Text => println!("{}", render_text(&view)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&render_json_ui(&view))?),
    }
    Ok(())
}

fn run_schema(kind: SchemaKind) -> CliResult<()> {
    let schema = match kind {
        SchemaKind::Spec => spec_schema()?,
        SchemaKind::Payload => payload_schema(&*load_spec()?),
        SchemaKind::Analysis => analysis_schema()?,
    };
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

async fn run_fill(
    config: &IntakeConfig,
    answers_path: Option<PathBuf>,
    fresh: bool,
    verbose: bool,
    answers_json: bool,
) -> CliResult<()> {
    let spec = load_spec()?;
    let state_dir = config.resolved_state_dir().ok_or(StoreError::NoStateDir)?;
    let store: Arc<dyn SnapshotStore> = Arc::new(FileSnapshotStore::new(state_dir));
    if fresh {
        store.clear().await?;
    }
    let client: Arc<dyn AnalysisClient> = Arc::new(HttpAnalysisClient::new(config));
    let mut controller = FormController::open(spec, store, client, config).await?;
    if let Some(path) = answers_path {
        controller.restore(read_snapshot(&path)?);
    }

    let mut states = controller.subscribe();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            if *states.borrow_and_update() == PipelineState::Submitting {
                eprintln!("Analyzing your answers...");
            }
        }
    });

    let mut presenter = WizardPresenter::new(Verbosity::from_verbose(verbose), answers_json);
    let result = run_wizard(&mut controller, &mut presenter).await;
    controller.close().await?;
    result
}

/// Next question to ask, with its position among the visible fields of its section.
struct NextQuestion {
    section: usize,
    field: FieldDefinition,
    state: FieldState,
    index: usize,
    total: usize,
}

/// While a block is active only the fields that raised it are asked again.
/// Otherwise the first enabled field that is unanswered or failing wins.
fn next_question(session: &FormSession, skipped: &BTreeSet<String>) -> Option<NextQuestion> {
    let spec = session.spec();
    let blocking: Vec<&str> = session.red_flags().blocking_fields().collect();

    for (section, definition) in spec.sections.iter().enumerate() {
        let visible: Vec<&FieldDefinition> = definition
            .fields
            .iter()
            .filter(|field| session.visibility().is_field_visible(spec, &field.name))
            .collect();
        for (position, field) in visible.iter().enumerate() {
            let Some(state) = session.field_state(&field.name) else {
                continue;
            };
            let wanted = if blocking.is_empty() {
                let failing = session.errors().iter().any(|error| error.field == field.name);
                let unanswered = session
                    .snapshot()
                    .get(&field.name)
                    .is_none_or(FieldValue::is_empty);
                state.enabled && (failing || (unanswered && !skipped.contains(&field.name)))
            } else {
                blocking.contains(&field.name.as_str())
            };
            if wanted {
                return Some(NextQuestion {
                    section,
                    field: (*field).clone(),
                    state,
                    index: position + 1,
                    total: visible.len(),
                });
            }
        }
    }
    None
}

async fn run_wizard(
    controller: &mut FormController,
    presenter: &mut WizardPresenter,
) -> CliResult<()> {
    presenter.show_header(&build_form_view(controller.session()));
    let mut skipped = BTreeSet::new();
    let mut section = 0;

    loop {
        while let Some(next) = next_question(controller.session(), &skipped) {
            for done in section..next.section {
                controller.complete_section(done);
            }
            section = section.max(next.section);
            presenter.show_section(controller.session(), next.section);

            let prompt = PromptContext::new(
                &next.field,
                &next.state,
                controller.session(),
                next.index,
                next.total,
            );
            let event = match prompt_question(&prompt, &next.field, next.state.required, presenter)? {
                Answer::Set(value) => FieldChanged::set(&next.field.name, value),
                Answer::Keep => continue,
                Answer::Skip => {
                    skipped.insert(next.field.name.clone());
                    if controller.session().snapshot().get(&next.field.name).is_none() {
                        continue;
                    }
                    FieldChanged::clear(&next.field.name)
                }
            };

            match controller.change(event) {
                Ok(report) => {
                    if let Some(error) = controller
                        .session()
                        .errors()
                        .iter()
                        .find(|error| error.field == next.field.name)
                    {
                        presenter.show_field_error(&error.message);
                    }
                    if report.red_flags_changed {
                        presenter.show_red_flags(&controller.session().red_flags().flags);
                    }
                    if !controller.session().can_submit() {
                        let session = controller.session();
                        let labels = session
                            .red_flags()
                            .blocking_fields()
                            .filter_map(|name| session.spec().field(name))
                            .map(|field| field.label.clone())
                            .collect::<Vec<_>>();
                        presenter.show_locked(&labels);
                    }
                }
                Err(err) => presenter.show_field_error(&err.to_string()),
            }
        }

        for done in section..controller.session().spec().sections.len() {
            controller.complete_section(done);
        }
        presenter.show_completion(controller.session());

        if !prompt_bool("Submit the form for analysis?", false)? {
            println!("Answers saved; run `discovery-intake fill` to continue later.");
            return Ok(());
        }

        match controller.submit().await {
            SubmitOutcome::Invalid(validation) => {
                describe_errors(&validation.errors);
                section = validation.first_invalid_section.unwrap_or(0);
            }
            SubmitOutcome::Failed(err) => {
                eprintln!("{}", err.user_message());
                if !prompt_bool("Try again?", true)? {
                    println!("Answers saved; run `discovery-intake fill` to retry later.");
                    return Ok(());
                }
            }
            outcome => return report_outcome(outcome, OutputFormat::Text),
        }
    }
}

enum Answer {
    Set(FieldValue),
    /// Blank input on an optional question.
    Skip,
    /// Blank input on a question that already holds a valid answer.
    Keep,
}

fn prompt_question(
    prompt: &PromptContext,
    field: &FieldDefinition,
    required: bool,
    presenter: &WizardPresenter,
) -> CliResult<Answer> {
    loop {
        presenter.show_prompt(prompt);
        let input = read_input("> ")?;
        if input.eq_ignore_ascii_case("exit") {
            return Err("wizard aborted by user; answers are saved".into());
        }
        if input.is_empty()
            && let Some(current) = prompt.current.as_ref().filter(|_| prompt.error.is_none())
        {
            debug!(field = %field.name, %current, "keeping answer");
            return Ok(Answer::Keep);
        }
        match parse_answer(field, required, &input) {
            Ok(Some(value)) => return Ok(Answer::Set(value)),
            Ok(None) => return Ok(Answer::Skip),
            Err(err) => presenter.show_parse_error(&err),
        }
    }
}

fn read_input(prompt: &str) -> CliResult<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Err("input closed before the form was finished; answers are saved".into());
    }
    Ok(line.trim().to_string())
}

fn prompt_bool(prompt: &str, default: bool) -> CliResult<bool> {
    let suffix = if default { "[Y/n]" } else { "[y/N]" };
    loop {
        let input = read_input(&format!("{} {} ", prompt, suffix))?;
        if input.eq_ignore_ascii_case("exit") {
            return Err("wizard aborted by user; answers are saved".into());
        }
        match input.to_lowercase().as_str() {
            "" => return Ok(default),
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => eprintln!("Invalid answer: Please enter yes or no."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_cmd::Command;
    use assert_fs::prelude::*;
    use serde_json::json;

    const COMPLETE_ED: &str = include_str!("../../intake-spec/tests/fixtures/complete_ed.json");
    const MINOR: &str = include_str!("../../intake-spec/tests/fixtures/minor.json");

    /// Runs the binary isolated from the user's config and environment.
    fn intake(workspace: &assert_fs::TempDir) -> Command {
        let mut cmd = Command::cargo_bin("discovery-intake").expect("binary");
        cmd.env("XDG_CONFIG_HOME", workspace.path())
            .env("HOME", workspace.path())
            .env_remove("DISCOVERY_INTAKE_BASE_URL")
            .env_remove("DISCOVERY_INTAKE_TIMEOUT_SECS")
            .env_remove("DISCOVERY_INTAKE_STATE_DIR")
            .env_remove("RUST_LOG");
        cmd
    }

    fn stdout_of(output: &std::process::Output) -> String {
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    fn session_with(answers: Value) -> FormSession {
        let mut session = FormSession::new(load_spec().expect("spec"));
        session.restore(FormSnapshot::from_json(&answers));
        session
    }

    #[test]
    fn first_question_is_age() {
        let session = session_with(json!({}));
        let next = next_question(&session, &BTreeSet::new()).expect("question");
        assert_eq!(next.section, 0);
        assert_eq!(next.field.name, "age");
        assert_eq!(next.index, 1);
    }

    #[test]
    fn skipped_optional_questions_are_not_asked_again() {
        let session = session_with(json!({ "age": 30 }));
        let first = next_question(&session, &BTreeSet::new()).expect("question");
        assert_eq!(first.field.name, "height_unit");

        let skipped = BTreeSet::from(["height_unit".to_string()]);
        let next = next_question(&session, &skipped).expect("question");
        assert_eq!(next.field.name, "height_cm");
    }

    #[test]
    fn active_block_only_asks_the_triggering_field() {
        let session = session_with(json!({ "age": 15, "weight_kg": 60 }));
        let next = next_question(&session, &BTreeSet::new()).expect("question");
        assert_eq!(next.field.name, "age");
    }

    #[test]
    fn unknown_answer_keys_are_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("answers.json");
        fs::write(&path, r#"{"age": 40, "favourite_colour": "blue"}"#).expect("write");
        let (session, unknown) = load_session(&path).expect("session");
        assert_eq!(unknown, vec!["favourite_colour".to_string()]);
        assert_eq!(session.snapshot().len(), 2);
    }

    #[test]
    fn answers_must_be_an_object() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("answers.json");
        fs::write(&path, "[1, 2]").expect("write");
        assert!(read_snapshot(&path).is_err());
    }

    #[test]
    fn validate_accepts_a_complete_form() -> Result<(), Box<dyn std::error::Error>> {
        let workspace = assert_fs::TempDir::new()?;
        let answers = workspace.child("answers.json");
        answers.write_str(COMPLETE_ED)?;

        let assert = intake(&workspace)
            .arg("validate")
            .arg("--answers")
            .arg(answers.path())
            .assert()
            .success();
        assert!(stdout_of(assert.get_output()).contains("Validation result: valid"));
        Ok(())
    }

    #[test]
    fn validate_reports_minor_as_blocking() -> Result<(), Box<dyn std::error::Error>> {
        let workspace = assert_fs::TempDir::new()?;
        let answers = workspace.child("answers.json");
        answers.write_str(MINOR)?;

        let assert = intake(&workspace)
            .arg("validate")
            .arg("--answers")
            .arg(answers.path())
            .assert()
            .failure();
        let stdout = stdout_of(assert.get_output());
        assert!(stdout.contains("Red flags:"));
        assert!(stdout.contains("[block] RED FLAG: Patient is a minor"));
        assert!(!stdout.contains("Age must be between"));
        Ok(())
    }

    #[test]
    fn validate_json_lists_missing_fields() -> Result<(), Box<dyn std::error::Error>> {
        let workspace = assert_fs::TempDir::new()?;
        let answers = workspace.child("answers.json");
        answers.write_str(r#"{"age": 30, "weight_kg": 70, "mood": "fine"}"#)?;

        let assert = intake(&workspace)
            .args(["validate", "--format", "json", "--answers"])
            .arg(answers.path())
            .assert()
            .failure();
        let report: Value = serde_json::from_str(&stdout_of(assert.get_output()))?;
        assert_eq!(report["valid"], json!(false));
        assert_eq!(report["submission_blocked"], json!(false));
        assert_eq!(report["unknown_fields"], json!(["mood"]));
        assert_eq!(report["first_invalid_section"], json!("client_info"));
        let fields = report["errors"]
            .as_array()
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(|error| error["field"].as_str())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        assert!(fields.contains(&"height_cm"));
        assert!(fields.contains(&"main_issue"));
        Ok(())
    }

    #[test]
    fn payload_prints_the_transformed_answers() -> Result<(), Box<dyn std::error::Error>> {
        let workspace = assert_fs::TempDir::new()?;
        let answers = workspace.child("answers.json");
        answers.write_str(COMPLETE_ED)?;

        let assert = intake(&workspace)
            .arg("payload")
            .arg("--answers")
            .arg(answers.path())
            .assert()
            .success();
        let payload: Value = serde_json::from_str(&stdout_of(assert.get_output()))?;
        assert_eq!(payload["height_cm"], json!(176.0));
        assert_eq!(payload["weight"], json!(78.5));
        assert_eq!(payload["height_ft"], Value::Null);
        assert_eq!(payload["previous_treatments"], json!([]));
        assert_eq!(payload["form_version"], json!("2.2"));
        assert!(payload.get("height_unit").is_none());
        Ok(())
    }

    #[test]
    fn schema_and_describe_need_no_answers() -> Result<(), Box<dyn std::error::Error>> {
        let workspace = assert_fs::TempDir::new()?;

        let assert = intake(&workspace)
            .args(["schema", "payload"])
            .assert()
            .success();
        let schema: Value = serde_json::from_str(&stdout_of(assert.get_output()))?;
        assert!(schema["properties"].get("weight").is_some());

        let assert = intake(&workspace).arg("describe").assert().success();
        let text = stdout_of(assert.get_output());
        assert!(text.contains("Section 1 of 9"));
        assert!(text.contains(" - age (Age)"));
        Ok(())
    }

    #[test]
    fn fill_saves_answers_when_aborted() -> Result<(), Box<dyn std::error::Error>> {
        let workspace = assert_fs::TempDir::new()?;
        let answers = workspace.child("answers.json");
        answers.write_str(COMPLETE_ED)?;
        let state_dir = workspace.child("state");

        intake(&workspace)
            .arg("--state-dir")
            .arg(state_dir.path())
            .args(["fill", "--fresh", "--answers"])
            .arg(answers.path())
            .write_stdin("exit\n")
            .assert()
            .failure();

        let saved = fs::read_to_string(state_dir.path().join(intake_client::STATE_FILE))?;
        let saved: Value = serde_json::from_str(&saved)?;
        assert_eq!(saved["values"]["age"], json!("34"));
        Ok(())
    }
}
