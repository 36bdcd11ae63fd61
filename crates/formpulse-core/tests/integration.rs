//! Integration tests for FormPulse core
//!
//! Exercises the full message path:
//! - form decoding and schema checks
//! - push-channel messages through the ingestor into the store
//! - snapshot reconciliation with early events
//! - submission gating
//! - count properties over arbitrary answer streams

use formpulse_core::{
    normalize, require_complete, AggregationSnapshot, Answer, AnswerChecker, AnswerMap, AnswerValue,
    BucketKeys, Envelope, ExportRow, Field, Form, IngestOutcome, Ingestor, ResponseCreated,
    SchemaError,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashMap;

/// Helper building the form used across tests
fn feedback_form() -> Form {
    serde_json::from_value(json!({
        "_id": "f1",
        "title": "Product feedback",
        "status": "published",
        "fields": [
            {"id": "q1", "type": "mcq", "label": "How useful?", "required": true, "options": ["Very", "Somewhat", "Not at all"]},
            {"id": "q2", "type": "checkbox", "label": "Which parts?", "options": ["Docs", "API", "CLI"]},
            {"id": "q3", "type": "rating", "label": "Score", "min": 1, "max": 5},
            {"id": "q4", "type": "textarea", "label": "Anything else?"}
        ]
    }))
    .unwrap()
}

fn broadcast(answers: Vec<Answer>) -> String {
    let envelope = Envelope::response_created(Some("f1".to_string()), &ResponseCreated::new(answers));
    serde_json::to_string(&envelope).unwrap()
}

#[test]
fn test_live_session_flow() {
    let form = feedback_form();
    assert!(form.validate().is_ok());

    let mut ingestor = Ingestor::new(&form.fields).with_form_id("f1");

    // Arrives before the summary fetch completes
    let early = ingestor.handle_message(&broadcast(vec![Answer::new("q1", "Very")]));
    assert!(matches!(early, IngestOutcome::Buffered { .. }));

    let fetched: AggregationSnapshot = serde_json::from_value(json!({
        "q1": {"Very": 3, "Somewhat": 1},
        "q3": {"5": 2}
    }))
    .unwrap();
    let replay = ingestor.initialize(fetched);
    assert_eq!(replay.replayed, 1);

    ingestor.handle_message(&broadcast(vec![
        Answer::new("q1", "Somewhat"),
        Answer::new("q2", vec!["Docs", "CLI"]),
        Answer::new("q3", 5i64),
        Answer::new("q4", "Great tool"),
    ]));
    ingestor.handle_message("garbage");
    ingestor.handle_message(r#"{"type":"form:published","formId":"f1","payload":{}}"#);

    assert_eq!(
        serde_json::to_value(ingestor.snapshot()).unwrap(),
        json!({
            "q1": {"Very": 4, "Somewhat": 2},
            "q2": {"Docs": 1, "CLI": 1},
            "q3": {"5": 3},
            "q4": {"Great tool": 1}
        })
    );

    let stats = ingestor.stats();
    assert_eq!(stats.messages, 4);
    assert_eq!(stats.malformed, 1);
    assert_eq!(stats.ignored, 1);
}

#[test]
fn test_submission_gating() {
    let form = feedback_form();
    let mut answers = AnswerMap::new();
    answers.insert("q3".to_string(), AnswerValue::Integer(4));

    let err = require_complete(&form.fields, &answers).unwrap_err();
    assert_eq!(err.to_string(), "Please fill: How useful?");

    answers.insert("q1".to_string(), "Very".into());
    assert!(require_complete(&form.fields, &answers).is_ok());

    let report = AnswerChecker::new().check(&form.fields, &answers);
    assert!(report.is_valid);
}

#[test]
fn test_schema_drift_does_not_stall() {
    let form = feedback_form();
    let mut ingestor = Ingestor::new(&form.fields);
    ingestor.initialize(AggregationSnapshot::new());

    // Field q3 turned from text into a rating after these responses were created
    let outcome = ingestor.handle_message(&broadcast(vec![
        Answer::new("q3", "five"),
        Answer::new("removed", true_value()),
    ]));
    assert!(matches!(outcome, IngestOutcome::Applied { answers: 2, increments: 2 }));
    assert_eq!(ingestor.snapshot().count("q3", "five"), 1);
    assert_eq!(ingestor.snapshot().count("removed", "true"), 1);
}

#[test]
fn test_stored_form_with_invalid_fields_still_counts() {
    // Stored forms are not validated on save; one bad field must not block the rest
    let (form, errors) = Form::from_value_lenient(json!({
        "_id": "f1",
        "title": "Legacy",
        "fields": [
            {"id": "q1", "type": "mcq", "label": "Pick", "options": []},
            {"id": "q2", "type": "rating", "label": "Score", "min": 5, "max": 1},
            {"id": "q3", "type": "text", "label": "Name"}
        ]
    }))
    .unwrap();
    assert_eq!(form.fields.len(), 1);
    assert_eq!(errors.len(), 2);
    assert!(matches!(errors[0], SchemaError::MissingOptions { ref field_id, .. } if field_id == "q1"));
    assert!(form.validate().is_ok());

    let mut ingestor = Ingestor::new(&form.fields).with_form_id("f1");
    ingestor.initialize(AggregationSnapshot::new());
    let outcome = ingestor.handle_message(&broadcast(vec![
        Answer::new("q1", "Yes"),
        Answer::new("q2", 4i64),
        Answer::new("q3", "Ada"),
    ]));

    assert!(matches!(outcome, IngestOutcome::Applied { answers: 3, increments: 3 }));
    let snapshot = ingestor.snapshot();
    assert_eq!(snapshot.count("q1", "Yes"), 1);
    assert_eq!(snapshot.count("q2", "4"), 1);
    assert_eq!(snapshot.count("q3", "Ada"), 1);
    assert_eq!(ingestor.stats().unknown_field_answers, 2);
}

#[test]
fn test_export_rows_match_bucket_keys() {
    let event = ResponseCreated::new(vec![
        Answer::new("q2", vec!["Docs", "CLI"]),
        Answer::new("q3", 5i64),
    ]);
    let rows = ExportRow::from_response(&event);
    let values: Vec<&str> = rows.iter().map(|r| r.value.as_str()).collect();
    assert_eq!(values, vec!["Docs|CLI", "5"]);
}

fn true_value() -> AnswerValue {
    AnswerValue::Other(json!(true))
}

fn choice_fields() -> Vec<Field> {
    vec![
        Field::mcq("m", "Pick one", ["a", "b", "c"]).unwrap(),
        Field::checkbox("c", "Pick any", ["a", "b", "c"]).unwrap(),
        Field::rating("r", "Score", 1, 5).unwrap(),
    ]
}

fn arb_answer() -> impl Strategy<Value = Answer> {
    prop_oneof![
        prop::sample::select(vec!["a", "b", "c"]).prop_map(|v| Answer::new("m", v)),
        prop::sample::subsequence(vec!["a", "b", "c"], 0..=3).prop_map(|v| Answer::new("c", v)),
        (1i64..=5).prop_map(|v| Answer::new("r", v)),
    ]
}

proptest! {
    #[test]
    fn prop_counts_match_normalized_keys(
        responses in prop::collection::vec(prop::collection::vec(arb_answer(), 0..4), 0..40)
    ) {
        let fields = choice_fields();
        let mut ingestor = Ingestor::new(&fields);
        ingestor.initialize(AggregationSnapshot::new());

        let mut expected: HashMap<(String, String), u64> = HashMap::new();
        for answers in &responses {
            for answer in answers {
                let field = fields.iter().find(|f| f.id == answer.field_id).unwrap();
                let keys: BucketKeys = normalize(field, &answer.value);
                for key in keys {
                    *expected.entry((answer.field_id.clone(), key)).or_default() += 1;
                }
            }
            ingestor.handle_message(&broadcast(answers.clone()));
        }

        let snapshot = ingestor.snapshot();
        for ((field_id, key), count) in &expected {
            prop_assert_eq!(snapshot.count(field_id, key), *count);
        }
        let total: u64 = snapshot.iter().map(|(_, table)| table.total()).sum();
        prop_assert_eq!(total, expected.values().sum::<u64>());
    }

    #[test]
    fn prop_counts_never_decrease(
        responses in prop::collection::vec(prop::collection::vec(arb_answer(), 1..4), 1..20)
    ) {
        let mut ingestor = Ingestor::new(&choice_fields());
        ingestor.initialize(AggregationSnapshot::new());

        let mut previous = ingestor.snapshot();
        for answers in responses {
            ingestor.handle_message(&broadcast(answers));
            let current = ingestor.snapshot();
            for (field_id, table) in previous.iter() {
                for (key, count) in table.iter() {
                    prop_assert!(current.count(field_id, key) >= count);
                }
            }
            previous = current;
        }
    }

    #[test]
    fn prop_replay_equals_live(
        responses in prop::collection::vec(prop::collection::vec(arb_answer(), 0..4), 0..20),
        split in 0usize..20
    ) {
        let split = split.min(responses.len());

        let mut live = Ingestor::new(&choice_fields());
        live.initialize(AggregationSnapshot::new());
        for answers in &responses {
            live.handle_message(&broadcast(answers.clone()));
        }

        let mut racing = Ingestor::new(&choice_fields());
        for answers in &responses[..split] {
            racing.handle_message(&broadcast(answers.clone()));
        }
        racing.initialize(AggregationSnapshot::new());
        for answers in &responses[split..] {
            racing.handle_message(&broadcast(answers.clone()));
        }

        prop_assert_eq!(live.snapshot(), racing.snapshot());
    }
}
