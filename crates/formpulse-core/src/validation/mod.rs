//! Answer validation
//!
//! Two layers live here:
//!
//! - [`first_unfilled_required`] / [`require_complete`]: the check a
//!   respondent client runs before submitting. A required field is unfilled
//!   when its answer is absent, an empty string, an empty selection or `null`.
//! - [`AnswerChecker`]: a rule engine producing a [`ValidationReport`] of
//!   findings for a whole answer set (unknown fields, shape mismatches,
//!   option membership, rating bounds). It is advisory; nothing in the
//!   aggregation path consults it.

pub mod rules;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::answer::AnswerMap;
use crate::error::ValidationError;
use crate::schema::Field;

pub use rules::{
    AnswerRule, KnownFieldRule, OptionMembershipRule, RatingRangeRule, RequiredRule, ValueShapeRule,
};

/// First required field, in form order, without a usable answer
pub fn first_unfilled_required<'a>(fields: &'a [Field], answers: &AnswerMap) -> Option<&'a Field> {
    fields
        .iter()
        .filter(|field| field.required)
        .find(|field| answers.get(&field.id).map_or(true, |value| value.is_blank()))
}

/// Gate a submission on every required field being filled
pub fn require_complete(fields: &[Field], answers: &AnswerMap) -> Result<(), ValidationError> {
    match first_unfilled_required(fields, answers) {
        Some(field) => Err(ValidationError::RequiredFieldUnfilled {
            field_id: field.id.clone(),
            label: field.label.clone(),
        }),
        None => Ok(()),
    }
}

/// Categories of answer rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    /// Presence of required answers
    Required,
    /// Answers must reference fields of the form
    Reference,
    /// Answer value shape must match the field type
    Type,
    /// Choice answers must be among the field's options
    Enum,
    /// Numeric answers must lie within the field's bounds
    Bounds,
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleCategory::Required => write!(f, "required"),
            RuleCategory::Reference => write!(f, "reference"),
            RuleCategory::Type => write!(f, "type"),
            RuleCategory::Enum => write!(f, "enum"),
            RuleCategory::Bounds => write!(f, "bounds"),
        }
    }
}

/// Severity of a finding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    #[default]
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// One issue detected in an answer set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFinding {
    /// Rule that produced the finding
    pub rule_id: String,
    pub category: RuleCategory,
    pub severity: Severity,
    pub message: String,
    /// Field the finding is about
    pub field_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ValidationFinding {
    pub fn new(
        rule_id: impl Into<String>,
        category: RuleCategory,
        severity: Severity,
        message: impl Into<String>,
        field_id: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            category,
            severity,
            message: message.into(),
            field_id: field_id.into(),
            expected: None,
            actual: None,
            suggestion: None,
        }
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn with_actual(mut self, actual: impl Into<String>) -> Self {
        self.actual = Some(actual.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Errors block a submission, lower severities do not
    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} at '{}': {}",
            self.severity, self.rule_id, self.field_id, self.message
        )
    }
}

/// Per-category totals of a report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub rules_evaluated: usize,
    pub findings_count: usize,
    pub blocking_count: usize,
}

/// Outcome of checking an answer set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// No blocking findings
    pub is_valid: bool,
    pub findings: Vec<ValidationFinding>,
    pub rules_evaluated: usize,
    pub rules_passed: usize,
    pub rules_failed: usize,
    pub category_summary: BTreeMap<RuleCategory, CategorySummary>,
}

impl ValidationReport {
    fn new() -> Self {
        Self {
            is_valid: true,
            findings: Vec::new(),
            rules_evaluated: 0,
            rules_passed: 0,
            rules_failed: 0,
            category_summary: BTreeMap::new(),
        }
    }

    fn add_rule_result(&mut self, category: RuleCategory, findings: Vec<ValidationFinding>) {
        self.rules_evaluated += 1;
        let summary = self.category_summary.entry(category).or_default();
        summary.rules_evaluated += 1;

        if findings.is_empty() {
            self.rules_passed += 1;
            return;
        }

        self.rules_failed += 1;
        let blocking = findings.iter().filter(|f| f.is_blocking()).count();
        summary.findings_count += findings.len();
        summary.blocking_count += blocking;
        if blocking > 0 {
            self.is_valid = false;
        }
        self.findings.extend(findings);
    }

    /// Findings about one field
    pub fn findings_for<'a>(&'a self, field_id: &'a str) -> impl Iterator<Item = &'a ValidationFinding> + 'a {
        self.findings.iter().filter(move |f| f.field_id == field_id)
    }

    pub fn blocking_count(&self) -> usize {
        self.findings.iter().filter(|f| f.is_blocking()).count()
    }
}

/// Runs a set of [`AnswerRule`]s over an answer set
pub struct AnswerChecker {
    rules: Vec<Box<dyn AnswerRule>>,
}

impl Default for AnswerChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl AnswerChecker {
    /// Checker with every built-in rule registered
    pub fn new() -> Self {
        let mut checker = Self::empty();
        checker.register(Box::new(RequiredRule));
        checker.register(Box::new(KnownFieldRule));
        checker.register(Box::new(ValueShapeRule));
        checker.register(Box::new(OptionMembershipRule));
        checker.register(Box::new(RatingRangeRule));
        checker
    }

    /// Checker without rules
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn register(&mut self, rule: Box<dyn AnswerRule>) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> impl Iterator<Item = &dyn AnswerRule> {
        self.rules.iter().map(|r| r.as_ref())
    }

    /// Evaluate every rule; deterministic for a given input
    pub fn check(&self, fields: &[Field], answers: &AnswerMap) -> ValidationReport {
        let mut report = ValidationReport::new();
        for rule in &self.rules {
            let findings = rule.evaluate(fields, answers);
            if !findings.is_empty() {
                tracing::debug!(rule = rule.id(), findings = findings.len(), "Answer rule failed");
            }
            report.add_rule_result(rule.category(), findings);
        }
        report
    }
}
