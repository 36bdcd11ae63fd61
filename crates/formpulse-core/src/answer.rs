//! Answer values as submitted by respondents
//!
//! Answer payloads travel as loosely typed JSON. [`AnswerValue`] captures the
//! shapes the field types produce (string, integer, set of strings) and keeps
//! anything else verbatim so that historical data never fails to decode.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single answer value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    /// `text`, `textarea` and `mcq` answers
    Text(String),
    /// `rating` answers
    Integer(i64),
    /// Non-integral numbers; only produced by drifted or hand-written data
    Float(f64),
    /// `checkbox` answers
    Selection(Vec<String>),
    /// Any other JSON value
    Other(serde_json::Value),
}

impl AnswerValue {
    /// True when the value carries no answer at all: `""`, `[]` or `null`
    pub fn is_blank(&self) -> bool {
        match self {
            AnswerValue::Text(s) => s.is_empty(),
            AnswerValue::Selection(items) => items.is_empty(),
            AnswerValue::Other(value) => {
                value.is_null() || value.as_array().is_some_and(|a| a.is_empty())
            }
            AnswerValue::Integer(_) | AnswerValue::Float(_) => false,
        }
    }

    /// JSON type name of the value, for diagnostics
    pub fn shape(&self) -> &'static str {
        match self {
            AnswerValue::Text(_) => "string",
            AnswerValue::Integer(_) | AnswerValue::Float(_) => "number",
            AnswerValue::Selection(_) => "array",
            AnswerValue::Other(value) => match value {
                serde_json::Value::Null => "null",
                serde_json::Value::Bool(_) => "boolean",
                serde_json::Value::Number(_) => "number",
                serde_json::Value::String(_) => "string",
                serde_json::Value::Array(_) => "array",
                serde_json::Value::Object(_) => "object",
            },
        }
    }
}

impl From<&str> for AnswerValue {
    fn from(value: &str) -> Self {
        AnswerValue::Text(value.to_string())
    }
}

impl From<String> for AnswerValue {
    fn from(value: String) -> Self {
        AnswerValue::Text(value)
    }
}

impl From<i64> for AnswerValue {
    fn from(value: i64) -> Self {
        AnswerValue::Integer(value)
    }
}

impl From<Vec<String>> for AnswerValue {
    fn from(value: Vec<String>) -> Self {
        AnswerValue::Selection(value)
    }
}

impl From<Vec<&str>> for AnswerValue {
    fn from(value: Vec<&str>) -> Self {
        AnswerValue::Selection(value.into_iter().map(str::to_string).collect())
    }
}

/// One `(fieldId, value)` pair of a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub field_id: String,
    pub value: AnswerValue,
}

impl Answer {
    pub fn new(field_id: impl Into<String>, value: impl Into<AnswerValue>) -> Self {
        Self {
            field_id: field_id.into(),
            value: value.into(),
        }
    }
}

/// Answers keyed by field id, as collected by a respondent client
pub type AnswerMap = BTreeMap<String, AnswerValue>;

/// Collapse an answer list into a map; later answers for the same field win
pub fn answer_map<I>(answers: I) -> AnswerMap
where
    I: IntoIterator<Item = Answer>,
{
    answers
        .into_iter()
        .map(|a| (a.field_id, a.value))
        .collect()
}

/// Flatten a map back into the wire list
pub fn answer_list(answers: &AnswerMap) -> Vec<Answer> {
    answers
        .iter()
        .map(|(field_id, value)| Answer {
            field_id: field_id.clone(),
            value: value.clone(),
        })
        .collect()
}
