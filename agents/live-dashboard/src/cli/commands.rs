//! CLI command definitions for the FormPulse dashboard
//!
//! Offline commands (`check-form`, `check-answers`, `replay`) work on local
//! files. Online commands (`watch`, `submit`, `serve`) talk to the forms API
//! and its push channel. `export` does either.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::output::{ExportFormat, ExportOutput, FormOutput, OutputFormat, ReportOutput, SnapshotOutput};
use super::ExitCode;
use crate::client::{ApiClientConfig, FormApiClient};
use crate::config::DashboardConfig;
use crate::error::{DashboardError, Result};
use crate::server::{create_router, serve, ServerState};
use crate::session::DashboardSession;
use crate::telemetry::DashboardMetricsRegistry;
use formpulse_core::{
    answer_map, parse_message, AggregationSnapshot, AnalyticsSummary, Answer, AnswerChecker, AnswerMap,
    ChannelMessage, ExportRow, Form, Ingestor, SchemaError,
};

/// FormPulse live dashboard CLI
///
/// Check form definitions and answers offline, or follow a published
/// form's responses as they arrive.
#[derive(Parser, Debug)]
#[command(name = "formpulse")]
#[command(about = "FormPulse - Live response dashboards for typed forms", long_about = None)]
#[command(version)]
pub struct FormPulseCli {
    /// Output verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress results and logs; errors and the exit code remain
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// TOML configuration file
    #[arg(long, global = true, env = "FORMPULSE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Base URL of the forms API
    #[arg(long, global = true)]
    pub api_base: Option<String>,

    /// Push-channel endpoint
    #[arg(long, global = true)]
    pub ws_base: Option<String>,

    #[command(subcommand)]
    pub command: FormPulseCommands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum FormPulseCommands {
    /// Check a form definition
    ///
    /// Reports every malformed field rather than stopping at the first.
    CheckForm {
        /// Form file (JSON or YAML); a bare list of fields is accepted
        #[arg(short, long)]
        form: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: Option<OutputFormat>,
    },

    /// Check a set of answers against a form
    CheckAnswers {
        /// Form file (JSON or YAML)
        #[arg(short, long)]
        form: PathBuf,

        /// Answers file: an object keyed by field id, or a list of answers
        #[arg(short, long)]
        answers: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: Option<OutputFormat>,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },

    /// Aggregate recorded push-channel messages
    ///
    /// Each non-empty line of the events file is one raw message.
    Replay {
        /// Form file (JSON or YAML)
        #[arg(short, long)]
        form: PathBuf,

        /// Recorded messages, one per line
        #[arg(short, long)]
        events: PathBuf,

        /// Starting counts: a summary body or a bare snapshot
        #[arg(short, long)]
        snapshot: Option<PathBuf>,

        /// Ignore messages addressed to other forms
        #[arg(long)]
        form_id: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: Option<OutputFormat>,
    },

    /// Follow a form's responses until interrupted
    Watch {
        /// Form id
        form_id: String,

        /// Output format; JSON and YAML print one document per change
        #[arg(long, value_enum, default_value = "table")]
        format: Option<OutputFormat>,
    },

    /// Submit one response
    Submit {
        /// Form id
        form_id: String,

        /// Answers file: an object keyed by field id, or a list of answers
        #[arg(short, long)]
        answers: PathBuf,
    },

    /// Export responses as one row per answer
    ///
    /// Fetches the forms API export, or builds it from recorded messages
    /// when `--events` is given.
    Export {
        /// Form id; required unless `--events` is given
        #[arg(required_unless_present = "events")]
        form_id: Option<String>,

        /// Recorded messages, one per line
        #[arg(short, long)]
        events: Option<PathBuf>,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "csv")]
        format: ExportFormat,
    },

    /// Follow a form and expose its snapshot over HTTP
    Serve {
        /// Form id
        form_id: String,

        /// Listen address, overriding the configured one
        #[arg(short, long)]
        listen: Option<String>,
    },
}

/// Resolve configuration: defaults, file, environment, then flags
pub fn load_config(cli: &FormPulseCli) -> Result<DashboardConfig> {
    let mut config = match &cli.config {
        Some(path) => DashboardConfig::from_file(path)?,
        None => DashboardConfig::default(),
    }
    .merge_env();

    if let Some(api_base) = &cli.api_base {
        config.api_base = api_base.clone();
    }
    if let Some(ws_base) = &cli.ws_base {
        config.ws_base = ws_base.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Execute the check-form command
pub fn execute_check_form(form: PathBuf, format: Option<OutputFormat>) -> Result<ExitCode> {
    let value = read_document(&form)?;
    let (form, errors) = parse_form_lenient(value)?;

    if let Some(format) = format {
        FormOutput::new(&form, &errors).render(format)?;
    }

    Ok(if errors.is_empty() {
        ExitCode::Success
    } else {
        ExitCode::SchemaError
    })
}

/// Execute the check-answers command
pub fn execute_check_answers(
    form: PathBuf,
    answers: PathBuf,
    format: Option<OutputFormat>,
    strict: bool,
) -> Result<ExitCode> {
    let form = load_form(&form)?;
    let answers = load_answers(&answers)?;

    let report = AnswerChecker::new().check(&form.fields, &answers);
    let output = ReportOutput::from_report(&report);
    if let Some(format) = format {
        output.render(format)?;
    }

    let has_errors = output.error_count > 0 || (strict && output.warning_count > 0);
    Ok(ExitCode::from_validation_result(has_errors, output.warning_count > 0))
}

/// Execute the replay command
pub fn execute_replay(
    form: PathBuf,
    events: PathBuf,
    snapshot: Option<PathBuf>,
    form_id: Option<String>,
    format: Option<OutputFormat>,
) -> Result<ExitCode> {
    let form = load_form(&form)?;
    let initial = match &snapshot {
        Some(path) => load_snapshot(path)?,
        None => AggregationSnapshot::new(),
    };
    let content = read_file(&events)?;

    let mut ingestor = Ingestor::new(&form.fields);
    if let Some(form_id) = form_id {
        ingestor = ingestor.with_form_id(form_id);
    }
    ingestor.initialize(initial);

    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        ingestor.handle_message(line);
    }

    let stats = ingestor.stats().clone();
    tracing::info!(messages = stats.messages, applied = stats.applied, "Replay finished");

    if let Some(format) = format {
        SnapshotOutput::new(&form, &ingestor.snapshot())
            .with_stats(stats.clone())
            .render(format)?;
    }

    Ok(ExitCode::from_validation_result(false, stats.malformed > 0))
}

/// Execute the watch command
///
/// With no format the session is followed silently until interrupted.
pub async fn execute_watch(config: DashboardConfig, form_id: String, format: Option<OutputFormat>) -> Result<ExitCode> {
    let client = Arc::new(FormApiClient::with_config(ApiClientConfig::from(&config))?);
    let session = DashboardSession::open(client, &config, &form_id, None).await?;
    let mut handle = session.handle();

    loop {
        tokio::select! {
            changed = handle.changed() => {
                if !changed {
                    break;
                }
                let state = handle.state();
                let Some(format) = format.filter(|_| state.initialized) else {
                    continue;
                };
                SnapshotOutput::new(session.form(), &state.snapshot)
                    .with_connected(state.connected)
                    .with_stats(state.stats)
                    .render(format)?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    let degraded = handle.is_degraded();
    session.close().await;
    Ok(ExitCode::from_validation_result(false, degraded))
}

/// Execute the submit command
pub async fn execute_submit(config: DashboardConfig, form_id: String, answers: PathBuf, quiet: bool) -> Result<ExitCode> {
    let answers = load_answers(&answers)?;
    let client = FormApiClient::with_config(ApiClientConfig::from(&config))?;

    let mut form = client.fetch_form(&form_id).await?;
    if form.id.is_none() {
        form.id = Some(form_id.clone());
    }
    client.submit_response(&form, &answers).await?;

    if !quiet {
        println!("Response submitted to {}", form_id);
    }
    Ok(ExitCode::Success)
}

/// Execute the export command
///
/// Rows come from `events` when given, otherwise from the forms API. Stdout
/// output is suppressed by `quiet`; a file given with `output` is always
/// written.
pub async fn execute_export(
    config: Option<DashboardConfig>,
    form_id: Option<String>,
    events: Option<PathBuf>,
    output: Option<PathBuf>,
    format: ExportFormat,
    quiet: bool,
) -> Result<ExitCode> {
    let (rows, skipped) = match (&events, &form_id, config) {
        (Some(events), _, _) => export_recorded(&read_file(events)?, form_id.as_deref()),
        (None, Some(form_id), Some(config)) => {
            let client = FormApiClient::with_config(ApiClientConfig::from(&config))?;
            (client.export_responses(form_id).await?, 0)
        }
        _ => return Err(DashboardError::invalid_input("A form id or an events file is required")),
    };
    tracing::info!(rows = rows.len(), skipped, "Export finished");

    let export = ExportOutput::new(rows);
    match &output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .map_err(|e| DashboardError::file_error(format!("Failed to create '{}': {}", path.display(), e)))?;
            export.write_to(format, std::io::BufWriter::new(file))?;
        }
        None if !quiet => export.write_to(format, std::io::stdout().lock())?,
        None => {}
    }

    Ok(ExitCode::from_validation_result(false, skipped > 0))
}

/// Export rows from recorded messages, and the number of lines skipped
///
/// Messages for other forms are left out when `form_id` is set.
pub fn export_recorded(content: &str, form_id: Option<&str>) -> (Vec<ExportRow>, usize) {
    let mut rows = Vec::new();
    let mut skipped = 0;
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match parse_message(line) {
            Ok(ChannelMessage::ResponseCreated { form_id: actual, event }) => {
                let foreign = matches!((form_id, actual.as_deref()), (Some(want), Some(got)) if want != got);
                if !foreign {
                    rows.extend(ExportRow::from_response(&event));
                }
            }
            Ok(ChannelMessage::Other { .. }) => {}
            Err(e) => {
                skipped += 1;
                tracing::debug!(error = %e, "Skipping malformed recorded message");
            }
        }
    }
    (rows, skipped)
}

/// Execute the serve command
pub async fn execute_serve(mut config: DashboardConfig, form_id: String, listen: Option<String>) -> Result<ExitCode> {
    if let Some(listen) = listen {
        config.listen_addr = listen;
    }
    let addr = config.listen_addr()?;

    let registry = Arc::new(DashboardMetricsRegistry::new()?);
    let client = Arc::new(FormApiClient::with_config(ApiClientConfig::from(&config))?);
    let session = DashboardSession::open(client, &config, &form_id, Some(registry.dashboard())).await?;

    let state = ServerState::new(session.handle(), registry, form_id, session.session_id());
    let router = create_router(state);
    serve(addr, router, async {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutting down");
    })
    .await?;

    session.close().await;
    Ok(ExitCode::Success)
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| DashboardError::file_error(format!("Failed to read '{}': {}", path.display(), e)))
}

/// Read a JSON or YAML document, chosen by extension
pub fn read_document(path: &Path) -> Result<serde_json::Value> {
    let content = read_file(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "json" => serde_json::from_str(&content)
            .map_err(|e| DashboardError::parse_error(format!("Invalid JSON in '{}': {}", path.display(), e))),
        "yaml" | "yml" => serde_yaml::from_str(&content)
            .map_err(|e| DashboardError::parse_error(format!("Invalid YAML in '{}': {}", path.display(), e))),
        _ => Err(DashboardError::invalid_input(format!(
            "Unsupported file format: {}. Supported formats: json, yaml, yml",
            extension
        ))),
    }
}

/// Load a form, rejecting it on the first schema error
pub fn load_form(path: &Path) -> Result<Form> {
    let (form, errors) = parse_form_lenient(read_document(path)?)?;
    match errors.into_iter().next() {
        Some(err) => Err(err.into()),
        None => Ok(form),
    }
}

/// Parse a form, collecting every schema error
///
/// Fields that fail to convert, and later fields repeating an id, are left
/// out of the returned form.
pub fn parse_form_lenient(value: serde_json::Value) -> Result<(Form, Vec<SchemaError>)> {
    Ok(Form::from_value_lenient(value)?)
}

/// Load answers keyed by field id, or as a list of `{fieldId, value}`
pub fn load_answers(path: &Path) -> Result<AnswerMap> {
    match read_document(path)? {
        value @ serde_json::Value::Array(_) => {
            let answers: Vec<Answer> = serde_json::from_value(value)?;
            Ok(answer_map(answers))
        }
        value => Ok(serde_json::from_value(value)?),
    }
}

/// Load starting counts, either `{"buckets": {...}}` or the bare map
pub fn load_snapshot(path: &Path) -> Result<AggregationSnapshot> {
    let value = read_document(path)?;
    let is_summary = value
        .as_object()
        .map(|map| map.len() == 1 && map.contains_key("buckets"))
        .unwrap_or(false);

    if is_summary {
        let summary: AnalyticsSummary = serde_json::from_value(value)?;
        Ok(summary.buckets)
    } else {
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;
    use std::io::Write;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("formpulse-{}-{}", uuid::Uuid::new_v4(), name));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_cli_definition() {
        FormPulseCli::command().debug_assert();
    }

    #[test]
    fn test_parse_watch() {
        let cli = FormPulseCli::parse_from(["formpulse", "-vv", "watch", "65f0", "--api-base", "http://api"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.api_base.as_deref(), Some("http://api"));
        assert!(matches!(cli.command, FormPulseCommands::Watch { ref form_id, .. } if form_id == "65f0"));
    }

    #[test]
    fn test_parse_form_lenient_collects_errors() {
        let value = json!({
            "title": "Feedback",
            "status": "published",
            "fields": [
                {"id": "q1", "type": "mcq", "label": "Pick", "options": []},
                {"id": "q2", "type": "slider", "label": "Drag"},
                {"id": "q3", "type": "rating", "label": "Score"},
                {"id": "q3", "type": "text", "label": "Again"}
            ]
        });
        let (form, errors) = parse_form_lenient(value).unwrap();
        assert_eq!(form.title, "Feedback");
        assert!(form.is_published());
        assert_eq!(form.fields.len(), 1);
        assert_eq!(form.fields[0].kind.type_name(), "rating");
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[2], SchemaError::DuplicateFieldId(ref id) if id == "q3"));
    }

    #[test]
    fn test_parse_form_lenient_rejects_non_forms() {
        assert!(matches!(parse_form_lenient(json!("form")), Err(DashboardError::ParseError(_))));
        assert!(matches!(
            parse_form_lenient(json!({"fields": "q1"})),
            Err(DashboardError::ParseError(_))
        ));
    }

    #[test]
    fn test_parse_form_lenient_bare_list() {
        let value = json!([{"id": "name", "type": "text", "label": "Name", "required": true}]);
        let (form, errors) = parse_form_lenient(value).unwrap();
        assert!(errors.is_empty());
        assert!(form.fields[0].required);
    }

    #[test]
    fn test_load_answers_both_shapes() {
        let map = temp_file("answers.json", r#"{"q1": "Very", "q2": 4}"#);
        let list = temp_file("answers.yaml", "- fieldId: q1\n  value: Very\n- fieldId: q2\n  value: 4\n");

        let from_map = load_answers(&map).unwrap();
        let from_list = load_answers(&list).unwrap();
        assert_eq!(from_map, from_list);
        assert_eq!(from_map.len(), 2);

        std::fs::remove_file(map).ok();
        std::fs::remove_file(list).ok();
    }

    #[test]
    fn test_load_snapshot_both_shapes() {
        let summary = temp_file("summary.json", r#"{"buckets": {"q1": {"Very": 2}}}"#);
        let bare = temp_file("bare.json", r#"{"q1": {"Very": 2}}"#);

        assert_eq!(load_snapshot(&summary).unwrap(), load_snapshot(&bare).unwrap());
        assert_eq!(load_snapshot(&bare).unwrap().count("q1", "Very"), 2);

        std::fs::remove_file(summary).ok();
        std::fs::remove_file(bare).ok();
    }

    #[test]
    fn test_read_document_rejects_unknown_extension() {
        let path = temp_file("form.txt", "{}");
        assert!(matches!(read_document(&path), Err(DashboardError::InvalidInput(_))));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_replay_exit_codes() {
        let form = temp_file(
            "form.json",
            r#"{"fields": [{"id": "q1", "type": "mcq", "label": "Pick", "options": ["A", "B"]}]}"#,
        );
        let clean = temp_file(
            "clean.jsonl",
            "{\"type\":\"response:created\",\"payload\":{\"answers\":[{\"fieldId\":\"q1\",\"value\":\"A\"}]}}\n\n",
        );
        let broken = temp_file("broken.jsonl", "{not json\n");

        let code = execute_replay(form.clone(), clean.clone(), None, None, Some(OutputFormat::Json)).unwrap();
        assert_eq!(code, ExitCode::Success);
        let code = execute_replay(form.clone(), broken.clone(), None, None, Some(OutputFormat::Json)).unwrap();
        assert_eq!(code, ExitCode::ValidationWarning);

        for path in [form, clean, broken] {
            std::fs::remove_file(path).ok();
        }
    }

    #[test]
    fn test_parse_export() {
        let cli = FormPulseCli::parse_from(["formpulse", "export", "--events", "events.jsonl", "--format", "json"]);
        assert!(matches!(
            cli.command,
            FormPulseCommands::Export { form_id: None, format: ExportFormat::Json, .. }
        ));
        assert!(FormPulseCli::try_parse_from(["formpulse", "export"]).is_err());
    }

    #[test]
    fn test_export_recorded() {
        let content = [
            r#"{"type":"response:created","formId":"f1","payload":{"submittedAt":"2024-03-01T10:00:00Z","answers":[{"fieldId":"q1","value":"A"},{"fieldId":"q2","value":["x","y"]}]}}"#,
            r#"{"type":"response:created","formId":"f2","payload":{"answers":[{"fieldId":"q1","value":"B"}]}}"#,
            r#"{"type":"form:published","formId":"f1","payload":{}}"#,
            "{not json",
        ]
        .join("\n");

        let (rows, skipped) = export_recorded(&content, Some("f1"));
        assert_eq!(skipped, 1);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].submitted_at, "2024-03-01T10:00:00Z");
        assert_eq!(rows[1].value, "x|y");

        let (rows, _) = export_recorded(&content, None);
        assert_eq!(rows.len(), 3);
    }

    #[tokio::test]
    async fn test_export_to_file() {
        let events = temp_file(
            "events.jsonl",
            "{\"type\":\"response:created\",\"payload\":{\"answers\":[{\"fieldId\":\"q1\",\"value\":4}]}}\n",
        );
        let target = std::env::temp_dir().join(format!("formpulse-{}-export.csv", uuid::Uuid::new_v4()));

        let code = execute_export(None, None, Some(events.clone()), Some(target.clone()), ExportFormat::Csv, true)
            .await
            .unwrap();
        assert_eq!(code, ExitCode::Success);
        assert_eq!(
            std::fs::read_to_string(&target).unwrap(),
            "submittedAt,fieldId,value\n,q1,4\n"
        );

        for path in [events, target] {
            std::fs::remove_file(path).ok();
        }
    }

    #[test]
    fn test_quiet_commands_still_report_exit_code() {
        let form = temp_file(
            "form.json",
            r#"{"fields": [{"id": "name", "type": "text", "label": "Name", "required": true}]}"#,
        );
        let empty = temp_file("answers.json", "{}");

        let code = execute_check_answers(form.clone(), empty.clone(), None, false).unwrap();
        assert_eq!(code, ExitCode::ValidationError);
        let code = execute_check_form(form.clone(), None).unwrap();
        assert_eq!(code, ExitCode::Success);

        for path in [form, empty] {
            std::fs::remove_file(path).ok();
        }
    }

    #[test]
    fn test_check_answers_exit_code() {
        let form = temp_file(
            "form.json",
            r#"{"fields": [{"id": "name", "type": "text", "label": "Name", "required": true}]}"#,
        );
        let empty = temp_file("answers.json", "{}");
        let filled = temp_file("filled.json", r#"{"name": "Ada"}"#);

        let code = execute_check_answers(form.clone(), empty.clone(), Some(OutputFormat::Json), false).unwrap();
        assert_eq!(code, ExitCode::ValidationError);
        let code = execute_check_answers(form.clone(), filled.clone(), Some(OutputFormat::Json), false).unwrap();
        assert_eq!(code, ExitCode::Success);

        for path in [form, empty, filled] {
            std::fs::remove_file(path).ok();
        }
    }
}
