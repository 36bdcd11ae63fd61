//! Built-in answer rules
//!
//! Each rule looks at one aspect of an answer set and reports every
//! violation it finds; the checker never stops at the first one.

use std::collections::HashMap;

use super::{RuleCategory, Severity, ValidationFinding};
use crate::answer::{AnswerMap, AnswerValue};
use crate::schema::{Field, FieldKind};

/// A deterministic check over a form's fields and one answer set
pub trait AnswerRule: Send + Sync {
    /// Stable identifier, reported on every finding
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn category(&self) -> RuleCategory;

    fn default_severity(&self) -> Severity {
        Severity::Error
    }

    fn evaluate(&self, fields: &[Field], answers: &AnswerMap) -> Vec<ValidationFinding>;
}

fn finding(rule: &dyn AnswerRule, field_id: &str, message: impl Into<String>) -> ValidationFinding {
    ValidationFinding::new(rule.id(), rule.category(), rule.default_severity(), message, field_id)
}

/// Answers to known fields that carry a value, in form order
fn answered<'a>(fields: &'a [Field], answers: &'a AnswerMap) -> impl Iterator<Item = (&'a Field, &'a AnswerValue)> {
    fields.iter().filter_map(move |field| {
        answers
            .get(&field.id)
            .filter(|value| !value.is_blank())
            .map(|value| (field, value))
    })
}

/// Required fields must have a non-blank answer
pub struct RequiredRule;

impl AnswerRule for RequiredRule {
    fn id(&self) -> &str {
        "required"
    }

    fn name(&self) -> &str {
        "Required fields answered"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Required
    }

    fn evaluate(&self, fields: &[Field], answers: &AnswerMap) -> Vec<ValidationFinding> {
        fields
            .iter()
            .filter(|field| field.required)
            .filter_map(|field| {
                let actual = match answers.get(&field.id) {
                    None => "missing",
                    Some(value) if value.is_blank() => "blank",
                    Some(_) => return None,
                };
                Some(
                    finding(self, &field.id, format!("Please fill: {}", field.label))
                        .with_actual(actual)
                        .with_suggestion(format!("Provide a {} answer for '{}'", field.kind, field.label)),
                )
            })
            .collect()
    }
}

/// Every answer must reference a field of the form
pub struct KnownFieldRule;

impl AnswerRule for KnownFieldRule {
    fn id(&self) -> &str {
        "known_field"
    }

    fn name(&self) -> &str {
        "Answers reference known fields"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Reference
    }

    fn evaluate(&self, fields: &[Field], answers: &AnswerMap) -> Vec<ValidationFinding> {
        let known: HashMap<&str, &Field> = fields.iter().map(|f| (f.id.as_str(), f)).collect();
        answers
            .keys()
            .filter(|id| !known.contains_key(id.as_str()))
            .map(|id| {
                finding(self, id, format!("Unknown field: {}", id))
                    .with_suggestion("Remove the answer or refresh the form definition")
            })
            .collect()
    }
}

/// Answer values must have the shape their field type produces
pub struct ValueShapeRule;

impl ValueShapeRule {
    fn expected(kind: &FieldKind) -> &'static str {
        match kind {
            FieldKind::Text | FieldKind::Textarea | FieldKind::Mcq { .. } => "string",
            FieldKind::Checkbox { .. } => "array of strings",
            FieldKind::Rating { .. } => "integer",
        }
    }

    fn matches(kind: &FieldKind, value: &AnswerValue) -> bool {
        match kind {
            FieldKind::Text | FieldKind::Textarea | FieldKind::Mcq { .. } => {
                matches!(value, AnswerValue::Text(_))
            }
            FieldKind::Checkbox { .. } => matches!(value, AnswerValue::Selection(_)),
            FieldKind::Rating { .. } => matches!(value, AnswerValue::Integer(_)),
        }
    }
}

impl AnswerRule for ValueShapeRule {
    fn id(&self) -> &str {
        "value_shape"
    }

    fn name(&self) -> &str {
        "Answer shape matches field type"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Type
    }

    fn evaluate(&self, fields: &[Field], answers: &AnswerMap) -> Vec<ValidationFinding> {
        answered(fields, answers)
            .filter(|(field, value)| !Self::matches(&field.kind, value))
            .map(|(field, value)| {
                let expected = Self::expected(&field.kind);
                finding(self, &field.id, format!("Field {} expects {}", field.id, expected))
                    .with_expected(expected)
                    .with_actual(value.shape())
            })
            .collect()
    }
}

/// Choice answers must be among the field's options
pub struct OptionMembershipRule;

impl AnswerRule for OptionMembershipRule {
    fn id(&self) -> &str {
        "option_membership"
    }

    fn name(&self) -> &str {
        "Choices are valid options"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Enum
    }

    fn evaluate(&self, fields: &[Field], answers: &AnswerMap) -> Vec<ValidationFinding> {
        let mut findings = Vec::new();
        for (field, value) in answered(fields, answers) {
            let invalid: Vec<&str> = match (&field.kind, value) {
                (FieldKind::Mcq { options }, AnswerValue::Text(choice)) => {
                    if options.contains(choice) {
                        continue;
                    }
                    vec![choice.as_str()]
                }
                (FieldKind::Checkbox { options }, AnswerValue::Selection(selected)) => selected
                    .iter()
                    .filter(|s| !options.contains(s))
                    .map(String::as_str)
                    .collect(),
                _ => continue,
            };
            if invalid.is_empty() {
                continue;
            }
            let options = field.kind.options().unwrap_or_default().join(", ");
            findings.push(
                finding(self, &field.id, format!("Field {} has invalid option", field.id))
                    .with_expected(format!("one of: {}", options))
                    .with_actual(invalid.join(", ")),
            );
        }
        findings
    }
}

/// Ratings must lie within the field's bounds
pub struct RatingRangeRule;

impl AnswerRule for RatingRangeRule {
    fn id(&self) -> &str {
        "rating_range"
    }

    fn name(&self) -> &str {
        "Ratings within bounds"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Bounds
    }

    fn evaluate(&self, fields: &[Field], answers: &AnswerMap) -> Vec<ValidationFinding> {
        answered(fields, answers)
            .filter_map(|(field, value)| match (&field.kind, value) {
                (FieldKind::Rating { min, max }, AnswerValue::Integer(n)) if n < min || n > max => Some(
                    finding(self, &field.id, format!("Field {} out of range", field.id))
                        .with_expected(format!("{}..={}", min, max))
                        .with_actual(n.to_string())
                        .with_suggestion(format!("Choose a rating between {} and {}", min, max)),
                ),
                _ => None,
            })
            .collect()
    }
}
