//! Push-channel message contract
//!
//! Every message is a JSON envelope `{ "type": ..., "payload": ... }`,
//! optionally tagged with the `formId` it was broadcast for. Only
//! `response:created` is acted upon; other discriminants are reported as
//! [`ChannelMessage::Other`] so that new event kinds pass through harmlessly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::answer::Answer;
use crate::error::ParseError;

/// Discriminant of the response-created event
pub const RESPONSE_CREATED: &str = "response:created";

/// Raw envelope as carried by the push channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_id: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Wrap a response-created event for broadcast
    pub fn response_created(form_id: Option<String>, event: &ResponseCreated) -> Self {
        Self {
            kind: RESPONSE_CREATED.to_string(),
            form_id,
            payload: serde_json::to_value(event).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Payload of a `response:created` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseCreated {
    pub answers: Vec<Answer>,
    /// Missing or unreadable timestamps decode as `None`
    #[serde(default, deserialize_with = "lenient_timestamp", skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(text)) => match DateTime::parse_from_rfc3339(&text) {
            Ok(at) => Some(at.with_timezone(&Utc)),
            Err(e) => {
                tracing::debug!(value = %text, error = %e, "Ignoring unreadable submittedAt");
                None
            }
        },
        Some(serde_json::Value::Null) | None => None,
        Some(other) => {
            tracing::debug!(value = %other, "Ignoring non-string submittedAt");
            None
        }
    })
}

impl ResponseCreated {
    pub fn new(answers: Vec<Answer>) -> Self {
        Self {
            answers,
            submitted_at: None,
        }
    }

    pub fn submitted_at(mut self, at: DateTime<Utc>) -> Self {
        self.submitted_at = Some(at);
        self
    }
}

/// A decoded push-channel message
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    ResponseCreated {
        form_id: Option<String>,
        event: ResponseCreated,
    },
    /// Any other well-formed envelope
    Other { kind: String },
}

/// Decode one push-channel message
pub fn parse_message(raw: &str) -> Result<ChannelMessage, ParseError> {
    let envelope: Envelope =
        serde_json::from_str(raw).map_err(|e| ParseError::envelope(e.to_string()))?;

    if envelope.kind != RESPONSE_CREATED {
        return Ok(ChannelMessage::Other {
            kind: envelope.kind,
        });
    }

    let event: ResponseCreated = serde_json::from_value(envelope.payload)
        .map_err(|e| ParseError::payload(RESPONSE_CREATED, e.to_string()))?;

    Ok(ChannelMessage::ResponseCreated {
        form_id: envelope.form_id,
        event,
    })
}
