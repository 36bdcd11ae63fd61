//! Answer normalization
//!
//! Turns an answer value into the set of bucket keys it contributes to a
//! field's frequency table. Normalization is total: values whose shape does
//! not match the field type (schema drift between authoring time and
//! response time) are keyed by their canonical string form instead of being
//! rejected, so the live view never stalls on historical data.

use std::collections::BTreeSet;

use crate::answer::AnswerValue;
use crate::schema::{Field, FieldKind};

/// Aggregation dimension derived from an answer value
pub type BucketKey = String;

/// Keys produced by one answer
pub type BucketKeys = BTreeSet<BucketKey>;

/// Normalize an answer for a known field
pub fn normalize(field: &Field, value: &AnswerValue) -> BucketKeys {
    normalize_kind(&field.kind, value)
}

/// Normalize an answer given only the field's variant
pub fn normalize_kind(kind: &FieldKind, value: &AnswerValue) -> BucketKeys {
    match kind {
        FieldKind::Text | FieldKind::Textarea | FieldKind::Mcq { .. } => match value {
            AnswerValue::Text(text) => single(text.clone()),
            other => drifted(kind, other),
        },
        FieldKind::Checkbox { .. } => match value {
            AnswerValue::Selection(items) => items.iter().cloned().collect(),
            other => drifted(kind, other),
        },
        FieldKind::Rating { .. } => match value {
            AnswerValue::Integer(n) => single(n.to_string()),
            other => drifted(kind, other),
        },
    }
}

/// Shape-only normalization for answers whose field is not in the schema
///
/// Arrays fan out per element, strings are used verbatim, other scalars use
/// their canonical string form and `null` contributes nothing.
pub fn normalize_untyped(value: &AnswerValue) -> BucketKeys {
    match value {
        AnswerValue::Text(text) => single(text.clone()),
        AnswerValue::Integer(n) => single(n.to_string()),
        AnswerValue::Float(f) => single(canonical_float(*f)),
        AnswerValue::Selection(items) => items.iter().cloned().collect(),
        AnswerValue::Other(serde_json::Value::Array(items)) => {
            items.iter().filter_map(json_key).collect()
        }
        AnswerValue::Other(other) => json_key(other).into_iter().collect(),
    }
}

fn drifted(kind: &FieldKind, value: &AnswerValue) -> BucketKeys {
    tracing::trace!(
        field_type = kind.type_name(),
        value_shape = value.shape(),
        "Answer shape does not match field type, keying by canonical form"
    );
    normalize_untyped(value)
}

fn single(key: BucketKey) -> BucketKeys {
    let mut keys = BucketKeys::new();
    keys.insert(key);
    keys
}

/// Canonical key of a scalar JSON value
fn json_key(value: &serde_json::Value) -> Option<BucketKey> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Number(n) => Some(match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (None, Some(u), _) => u.to_string(),
            (None, None, Some(f)) => canonical_float(f),
            (None, None, None) => n.to_string(),
        }),
        nested => Some(nested.to_string()),
    }
}

/// Shortest round-trip form; integral values print without a fraction
pub(crate) fn canonical_float(value: f64) -> String {
    // 2^53: beyond this not every integer is representable
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if value.is_finite() && value.fract() == 0.0 && value.abs() <= MAX_EXACT {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys<const N: usize>(items: [&str; N]) -> BucketKeys {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_text_kept_verbatim() {
        let field = Field::text("q1", "Name");
        assert_eq!(normalize(&field, &"  Ada  ".into()), keys(["  Ada  "]));

        let field = Field::textarea("q2", "Bio");
        let long = "x".repeat(10_000);
        assert_eq!(normalize(&field, &long.clone().into()).into_iter().next(), Some(long));
    }

    #[test]
    fn test_mcq_does_not_check_membership() {
        let field = Field::mcq("q1", "How?", ["Very", "Somewhat"]).unwrap();
        assert_eq!(normalize(&field, &"Not at all".into()), keys(["Not at all"]));
    }

    #[test]
    fn test_checkbox_fans_out() {
        let field = Field::checkbox("q1", "Pick", ["A", "B", "C"]).unwrap();
        assert_eq!(normalize(&field, &vec!["A", "B"].into()), keys(["A", "B"]));
        assert!(normalize(&field, &AnswerValue::Selection(vec![])).is_empty());
    }

    #[test]
    fn test_rating_is_string_keyed() {
        let field = Field::rating("r", "Score", 1, 5).unwrap();
        assert_eq!(normalize(&field, &AnswerValue::Integer(4)), keys(["4"]));
    }

    #[test]
    fn test_drifted_values_never_fail() {
        let rating = Field::rating("r", "Score", 1, 5).unwrap();
        assert_eq!(normalize(&rating, &"4".into()), keys(["4"]));
        assert_eq!(normalize(&rating, &AnswerValue::Float(4.0)), keys(["4"]));
        assert_eq!(normalize(&rating, &AnswerValue::Float(3.5)), keys(["3.5"]));

        let checkbox = Field::checkbox("c", "Pick", ["A"]).unwrap();
        assert_eq!(normalize(&checkbox, &"A".into()), keys(["A"]));

        let text = Field::text("t", "Name");
        assert_eq!(normalize(&text, &AnswerValue::Other(json!(true))), keys(["true"]));
        assert!(normalize(&text, &AnswerValue::Other(json!(null))).is_empty());
    }

    #[test]
    fn test_untyped_fan_out() {
        assert_eq!(normalize_untyped(&AnswerValue::Other(json!([1, "a", null]))), keys(["1", "a"]));
        assert_eq!(
            normalize_untyped(&AnswerValue::Other(json!({"k": 1}))),
            keys([r#"{"k":1}"#])
        );
    }

    #[test]
    fn test_canonical_float() {
        assert_eq!(canonical_float(2.0), "2");
        assert_eq!(canonical_float(-0.25), "-0.25");
        assert_eq!(canonical_float(f64::NAN), "NaN");
    }
}
