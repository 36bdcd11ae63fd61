//! Flat response export
//!
//! One row per answer: `submittedAt, fieldId, value`. Values are flattened
//! to a single cell; selections are joined with `|`.

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::answer::AnswerValue;
use crate::envelope::ResponseCreated;
use crate::normalize::canonical_float;

/// Column names of an export, in order
pub const EXPORT_HEADER: [&str; 3] = ["submittedAt", "fieldId", "value"];

/// Separator between the elements of a multi-valued answer
pub const SELECTION_SEPARATOR: &str = "|";

/// One exported answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRow {
    /// RFC 3339 timestamp with second precision; empty when unknown
    pub submitted_at: String,
    pub field_id: String,
    pub value: String,
}

impl ExportRow {
    /// Rows for every answer of one response, in answer order
    pub fn from_response(event: &ResponseCreated) -> Vec<ExportRow> {
        let submitted_at = event
            .submitted_at
            .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default();

        event
            .answers
            .iter()
            .map(|answer| ExportRow {
                submitted_at: submitted_at.clone(),
                field_id: answer.field_id.clone(),
                value: export_cell(&answer.value),
            })
            .collect()
    }
}

/// Single-cell rendering of an answer value
pub fn export_cell(value: &AnswerValue) -> String {
    match value {
        AnswerValue::Text(text) => text.clone(),
        AnswerValue::Integer(n) => n.to_string(),
        AnswerValue::Float(f) => canonical_float(*f),
        AnswerValue::Selection(items) => items.join(SELECTION_SEPARATOR),
        AnswerValue::Other(other) => json_cell(other),
    }
}

fn json_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) => canonical_float(f),
            (None, None) => n.to_string(),
        },
        serde_json::Value::Array(items) => items
            .iter()
            .map(json_cell)
            .collect::<Vec<_>>()
            .join(SELECTION_SEPARATOR),
        other => other.to_string(),
    }
}
