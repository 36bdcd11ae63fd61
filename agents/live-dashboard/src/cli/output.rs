//! Output formatting for the FormPulse CLI
//!
//! Every command result is a serializable struct rendered as JSON, YAML, or
//! a colored human-readable table.

use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::{self, Write};

use crate::error::{DashboardError, Result};
use formpulse_core::{
    AggregationSnapshot, ExportRow, Field, FieldKind, Form, IngestStats, SchemaError, Severity, ValidationFinding,
    ValidationReport, EXPORT_HEADER,
};

/// Output format options for CLI results
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum OutputFormat {
    /// Human-readable table format with colors
    #[default]
    Table,
    /// JSON format for machine processing
    Json,
    /// YAML format
    Yaml,
}

/// Format to render with, or `None` when `--quiet` suppresses results
pub fn visible(format: Option<OutputFormat>, quiet: bool) -> Option<OutputFormat> {
    if quiet {
        None
    } else {
        Some(format.unwrap_or_default())
    }
}

/// Output format options for `export`
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug, Default)]
pub enum ExportFormat {
    /// `submittedAt,fieldId,value` with a header row
    #[default]
    Csv,
    /// JSON array of rows
    Json,
    /// YAML list of rows
    Yaml,
}

/// Render a value as JSON or YAML, or fall back to `table` for humans
fn render_with<T, F>(value: &T, format: OutputFormat, table: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(&mut io::Stdout) -> io::Result<()>,
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)
                .map_err(|e| DashboardError::SerializationError(e.to_string()))?;
            println!("{}", json);
        }
        OutputFormat::Yaml => {
            let yaml =
                serde_yaml::to_string(value).map_err(|e| DashboardError::SerializationError(e.to_string()))?;
            println!("{}", yaml);
        }
        OutputFormat::Table => {
            let mut stdout = io::stdout();
            table(&mut stdout)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn header(out: &mut io::Stdout, title: &str) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", title.cyan().bold())?;
    writeln!(out, "{}", "=".repeat(60))
}

/// One row of a form check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRow {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub label: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Authored keys the dashboard carries without interpreting
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl FieldRow {
    pub fn from_field(field: &Field) -> Self {
        let detail = match &field.kind {
            FieldKind::Text | FieldKind::Textarea => field.placeholder.clone(),
            FieldKind::Mcq { options } | FieldKind::Checkbox { options } => Some(options.join(" | ")),
            FieldKind::Rating { min, max } => Some(format!("{}..={}", min, max)),
        };
        Self {
            id: field.id.clone(),
            type_name: field.kind.type_name().to_string(),
            label: field.label.clone(),
            required: field.required,
            detail,
            extra: field.extra.clone(),
        }
    }
}

/// A rejected field configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaIssue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_id: Option<String>,
    pub message: String,
}

impl From<&SchemaError> for SchemaIssue {
    fn from(err: &SchemaError) -> Self {
        Self {
            field_id: err.field_id().map(str::to_string),
            message: err.to_string(),
        }
    }
}

/// Result of `check-form`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormOutput {
    pub valid: bool,
    pub title: String,
    pub status: String,
    pub fields: Vec<FieldRow>,
    pub errors: Vec<SchemaIssue>,
}

impl FormOutput {
    pub fn new(form: &Form, errors: &[SchemaError]) -> Self {
        Self {
            valid: errors.is_empty(),
            title: form.title.clone(),
            status: form.status.to_string(),
            fields: form.fields.iter().map(FieldRow::from_field).collect(),
            errors: errors.iter().map(SchemaIssue::from).collect(),
        }
    }

    pub fn render(&self, format: OutputFormat) -> Result<()> {
        render_with(self, format, |out| {
            header(out, &format!("Form: {} ({})", self.title, self.status))?;
            for (index, field) in self.fields.iter().enumerate() {
                let required = if field.required { "*".red().to_string() } else { " ".to_string() };
                writeln!(
                    out,
                    "{:>3}. {}{} [{}] {}",
                    index + 1,
                    field.id.bold(),
                    required,
                    field.type_name.cyan(),
                    field.label
                )?;
                if let Some(detail) = &field.detail {
                    writeln!(out, "     {}", detail.dimmed())?;
                }
                for (key, value) in &field.extra {
                    writeln!(out, "     {} {}", format!("{}:", key).dimmed(), value)?;
                }
            }
            writeln!(out)?;
            if self.valid {
                writeln!(out, "{} {} field(s), schema is valid", "+".green(), self.fields.len())?;
            } else {
                writeln!(out, "{} {} schema error(s)", "x".red(), self.errors.len())?;
                for issue in &self.errors {
                    writeln!(out, "  {} {}", "x".red(), issue.message)?;
                }
            }
            Ok(())
        })
    }
}

/// Result of `check-answers`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportOutput {
    pub valid: bool,
    pub error_count: usize,
    pub warning_count: usize,
    pub rules_evaluated: usize,
    pub findings: Vec<ValidationFinding>,
    pub summary: String,
}

impl ReportOutput {
    pub fn from_report(report: &ValidationReport) -> Self {
        let count = |severity| report.findings.iter().filter(|f| f.severity == severity).count();
        let error_count = count(Severity::Error);
        let warning_count = count(Severity::Warning);

        let summary = if error_count == 0 && warning_count == 0 {
            "Answers are valid".to_string()
        } else if error_count == 0 {
            format!("Answers are valid with {} warning(s)", warning_count)
        } else {
            format!("Answers have {} error(s) and {} warning(s)", error_count, warning_count)
        };

        Self {
            valid: report.is_valid,
            error_count,
            warning_count,
            rules_evaluated: report.rules_evaluated,
            findings: report.findings.clone(),
            summary,
        }
    }

    pub fn render(&self, format: OutputFormat) -> Result<()> {
        render_with(self, format, |out| {
            header(out, "Answer Check")?;
            let icon = if self.valid { "+".green() } else { "x".red() };
            writeln!(out, "{} {}", icon, self.summary)?;

            for finding in &self.findings {
                let label = match finding.severity {
                    Severity::Error => "ERROR".red().bold(),
                    Severity::Warning => "WARNING".yellow().bold(),
                    Severity::Info => "INFO".blue().bold(),
                };
                writeln!(out)?;
                writeln!(out, "[{}] {} {}", finding.rule_id.dimmed(), label, finding.message)?;
                writeln!(out, "  {} {}", "Field:".dimmed(), finding.field_id.cyan())?;
                if let (Some(expected), Some(actual)) = (&finding.expected, &finding.actual) {
                    writeln!(out, "  {} {} (got {})", "Expected:".dimmed(), expected, actual)?;
                }
                if let Some(suggestion) = &finding.suggestion {
                    writeln!(out, "  {} {}", "Fix:".dimmed(), suggestion.green())?;
                }
            }
            Ok(())
        })
    }
}

/// One bucket of a field distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketRow {
    pub key: String,
    pub count: u64,
}

/// Distribution of one field's answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDistribution {
    pub field_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub total: u64,
    pub buckets: Vec<BucketRow>,
}

/// Rendered aggregation snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
    pub fields: Vec<FieldDistribution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<IngestStats>,
}

impl SnapshotOutput {
    /// Order fields as the form does; fields missing from it come last
    pub fn new(form: &Form, snapshot: &AggregationSnapshot) -> Self {
        let mut fields: Vec<FieldDistribution> = form
            .fields
            .iter()
            .map(|field| distribution(Some(field), &field.id, snapshot))
            .collect();
        fields.extend(
            snapshot
                .iter()
                .filter(|(id, _)| form.field(id).is_none())
                .map(|(id, _)| distribution(None, id, snapshot)),
        );

        Self {
            form_id: form.id.clone(),
            connected: None,
            fields,
            stats: None,
        }
    }

    pub fn with_stats(mut self, stats: IngestStats) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn with_connected(mut self, connected: bool) -> Self {
        self.connected = Some(connected);
        self
    }

    pub fn render(&self, format: OutputFormat) -> Result<()> {
        render_with(self, format, |out| {
            let title = match &self.form_id {
                Some(id) => format!("Responses for {}", id),
                None => "Responses".to_string(),
            };
            header(out, &title)?;
            if let Some(connected) = self.connected {
                let status = if connected { "connected".green() } else { "disconnected".red() };
                writeln!(out, "Push channel: {}", status)?;
            }

            for field in &self.fields {
                writeln!(out)?;
                let label = field.label.as_deref().unwrap_or("(not in form)");
                writeln!(out, "{} {} {}", field.field_id.bold(), label, format!("[{}]", field.total).dimmed())?;
                let width = field.buckets.iter().map(|b| b.key.chars().count()).max().unwrap_or(0).min(32);
                for bucket in &field.buckets {
                    let bar = bar(bucket.count, field.total);
                    writeln!(out, "  {:<width$} {:>6} {}", bucket.key, bucket.count, bar.green(), width = width)?;
                }
            }

            if let Some(stats) = &self.stats {
                writeln!(out)?;
                writeln!(
                    out,
                    "{} messages, {} applied, {} replayed, {} ignored, {} malformed",
                    stats.messages, stats.applied, stats.replayed, stats.ignored, stats.malformed
                )?;
            }
            Ok(())
        })
    }
}

/// Widest rating scale listed value by value
const MAX_RATING_ROWS: i64 = 20;

fn distribution(field: Option<&Field>, field_id: &str, snapshot: &AggregationSnapshot) -> FieldDistribution {
    let table = snapshot.table(field_id);
    let count = |key: &str| table.map(|t| t.get(key)).unwrap_or(0);

    // Configured values first, in authoring order, including zero counts
    let configured: Vec<String> = match field.map(|f| &f.kind) {
        Some(FieldKind::Mcq { options }) | Some(FieldKind::Checkbox { options }) => {
            let mut seen = HashSet::new();
            options.iter().filter(|o| seen.insert(o.as_str())).cloned().collect()
        }
        Some(FieldKind::Rating { min, max })
            if max.checked_sub(*min).is_some_and(|span| (0..=MAX_RATING_ROWS).contains(&span)) =>
        {
            (*min..=*max).map(|n| n.to_string()).collect()
        }
        _ => Vec::new(),
    };
    let mut buckets: Vec<BucketRow> = configured
        .iter()
        .map(|key| BucketRow {
            key: key.clone(),
            count: count(key),
        })
        .collect();

    let mut others: Vec<BucketRow> = table
        .into_iter()
        .flat_map(|t| t.iter())
        .filter(|(key, _)| !configured.iter().any(|c| c == key))
        .map(|(key, count)| BucketRow {
            key: key.to_string(),
            count,
        })
        .collect();
    others.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    buckets.extend(others);

    FieldDistribution {
        field_id: field_id.to_string(),
        label: field.map(|f| f.label.clone()),
        total: table.map(|t| t.total()).unwrap_or(0),
        buckets,
    }
}

/// Exported responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExportOutput {
    pub rows: Vec<ExportRow>,
}

impl ExportOutput {
    pub fn new(rows: Vec<ExportRow>) -> Self {
        Self { rows }
    }

    /// Write the rows to `out`
    pub fn write_to<W: Write>(&self, format: ExportFormat, out: W) -> Result<()> {
        match format {
            ExportFormat::Csv => {
                let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(out);
                writer.write_record(EXPORT_HEADER)?;
                for row in &self.rows {
                    writer.serialize(row)?;
                }
                writer.flush()?;
            }
            ExportFormat::Json => {
                serde_json::to_writer_pretty(out, &self.rows)
                    .map_err(|e| DashboardError::SerializationError(e.to_string()))?;
            }
            ExportFormat::Yaml => {
                serde_yaml::to_writer(out, &self.rows)
                    .map_err(|e| DashboardError::SerializationError(e.to_string()))?;
            }
        }
        Ok(())
    }
}

fn bar(count: u64, total: u64) -> String {
    const WIDTH: u64 = 30;
    if total == 0 {
        return String::new();
    }
    "#".repeat((count * WIDTH / total) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn form() -> Form {
        Form::draft("Feedback")
            .with_field(Field::mcq("q1", "How useful?", ["Very", "Somewhat"]).unwrap())
            .unwrap()
            .with_field(Field::rating("q2", "Score", 1, 3).unwrap())
            .unwrap()
            .with_field(Field::text("q3", "Comments"))
            .unwrap()
    }

    #[test]
    fn test_snapshot_output_ordering() {
        let snapshot: AggregationSnapshot = serde_json::from_value(json!({
            "q1": {"Somewhat": 2, "Other": 1},
            "q2": {"3": 4},
            "q3": {"b": 1, "a": 1, "c": 5},
            "gone": {"x": 1}
        }))
        .unwrap();

        let output = SnapshotOutput::new(&form(), &snapshot);
        let ids: Vec<_> = output.fields.iter().map(|f| f.field_id.as_str()).collect();
        assert_eq!(ids, vec!["q1", "q2", "q3", "gone"]);

        let keys = |i: usize| -> Vec<(String, u64)> {
            output.fields[i].buckets.iter().map(|b| (b.key.clone(), b.count)).collect()
        };
        assert_eq!(
            keys(0),
            vec![("Very".to_string(), 0), ("Somewhat".to_string(), 2), ("Other".to_string(), 1)]
        );
        assert_eq!(
            keys(1),
            vec![("1".to_string(), 0), ("2".to_string(), 0), ("3".to_string(), 4)]
        );
        assert_eq!(
            keys(2),
            vec![("c".to_string(), 5), ("a".to_string(), 1), ("b".to_string(), 1)]
        );
        assert_eq!(output.fields[3].label, None);
        assert_eq!(output.fields[0].total, 3);
    }

    #[test]
    fn test_report_output_summary() {
        let report = formpulse_core::AnswerChecker::new().check(&form().fields, &Default::default());
        let output = ReportOutput::from_report(&report);
        assert!(output.valid);
        assert_eq!(output.summary, "Answers are valid");
    }

    #[test]
    fn test_form_output() {
        let errors = vec![SchemaError::MissingOptions {
            field_id: "q9".to_string(),
            type_name: "mcq".to_string(),
        }];
        let output = FormOutput::new(&form(), &errors);
        assert!(!output.valid);
        assert_eq!(output.fields[1].detail.as_deref(), Some("1..=3"));
        assert_eq!(output.errors[0].field_id.as_deref(), Some("q9"));
    }

    #[test]
    fn test_rating_rows_for_extreme_bounds() {
        let wide = Field::rating("wide", "Wide", i64::MIN, i64::MAX).unwrap();
        let output = distribution(Some(&wide), "wide", &AggregationSnapshot::new());
        assert!(output.buckets.is_empty());

        let snapshot: AggregationSnapshot = serde_json::from_value(json!({"wide": {"7": 2}})).unwrap();
        let output = distribution(Some(&wide), "wide", &snapshot);
        assert_eq!(output.buckets, vec![BucketRow { key: "7".to_string(), count: 2 }]);
    }

    #[test]
    fn test_repeated_options_listed_once() {
        let field = Field::mcq("q1", "Pick", ["A", "B", "A"]).unwrap();
        let snapshot: AggregationSnapshot = serde_json::from_value(json!({"q1": {"A": 3}})).unwrap();

        let output = distribution(Some(&field), "q1", &snapshot);
        assert_eq!(
            output.buckets,
            vec![
                BucketRow { key: "A".to_string(), count: 3 },
                BucketRow { key: "B".to_string(), count: 0 },
            ]
        );
        assert_eq!(output.buckets.iter().map(|b| b.count).sum::<u64>(), output.total);
    }

    #[test]
    fn test_field_row_keeps_extra_keys() {
        let value = json!({
            "title": "Feedback",
            "fields": [{
                "id": "q2",
                "type": "text",
                "label": "Why?",
                "placeholder": "Tell us",
                "visibleIf": {"fieldId": "q1", "operator": "equals", "value": "No"}
            }]
        });
        let (form, errors) = Form::from_value_lenient(value).unwrap();
        assert!(errors.is_empty());

        let row = serde_json::to_value(FieldRow::from_field(&form.fields[0])).unwrap();
        assert_eq!(row["detail"], json!("Tell us"));
        assert_eq!(row["extra"]["visibleIf"]["operator"], json!("equals"));
    }

    #[test]
    fn test_quiet_hides_results() {
        assert_eq!(visible(Some(OutputFormat::Json), true), None);
        assert_eq!(visible(None, false), Some(OutputFormat::Table));
        assert_eq!(visible(Some(OutputFormat::Yaml), false), Some(OutputFormat::Yaml));
    }

    #[test]
    fn test_export_csv_quotes_cells() {
        let output = ExportOutput::new(vec![ExportRow {
            submitted_at: "2024-03-01T10:00:00Z".to_string(),
            field_id: "q4".to_string(),
            value: "fast, \"mostly\"".to_string(),
        }]);
        let mut buffer = Vec::new();
        output.write_to(ExportFormat::Csv, &mut buffer).unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "submittedAt,fieldId,value\n2024-03-01T10:00:00Z,q4,\"fast, \"\"mostly\"\"\"\n"
        );

        let mut buffer = Vec::new();
        ExportOutput::new(Vec::new()).write_to(ExportFormat::Csv, &mut buffer).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "submittedAt,fieldId,value\n");
    }

    #[test]
    fn test_bar() {
        assert_eq!(bar(0, 0), "");
        assert_eq!(bar(1, 2).len(), 15);
    }
}
