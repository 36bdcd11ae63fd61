//! Error types for FormPulse core
//!
//! Three failure families exist, each surfaced differently:
//!
//! - [`SchemaError`]: malformed field configuration, reported at authoring time
//! - [`ParseError`]: malformed push-channel message, dropped by the ingestor
//! - [`ValidationError`]: a required field is unfilled at submission time

use thiserror::Error;

/// Malformed field or form configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Field type tag is not one of the recognized variants
    #[error("Field '{field_id}' has unsupported type '{type_name}'")]
    UnknownType { field_id: String, type_name: String },

    /// Choice field without any options
    #[error("Field '{field_id}' of type '{type_name}' requires a non-empty options list")]
    MissingOptions { field_id: String, type_name: String },

    /// Rating bounds are inverted
    #[error("Field '{field_id}' has rating min {min} greater than max {max}")]
    InvertedRange { field_id: String, min: i64, max: i64 },

    /// Field id is blank
    #[error("Field at position {position} has an empty id")]
    EmptyFieldId { position: usize },

    /// Two fields in one form share an id
    #[error("Duplicate field id '{0}'")]
    DuplicateFieldId(String),

    /// Field record does not decode at all
    #[error("Field at position {position} is malformed: {reason}")]
    MalformedField { position: usize, reason: String },
}

impl SchemaError {
    /// Id of the offending field, when one is known
    pub fn field_id(&self) -> Option<&str> {
        match self {
            SchemaError::UnknownType { field_id, .. }
            | SchemaError::MissingOptions { field_id, .. }
            | SchemaError::InvertedRange { field_id, .. } => Some(field_id),
            SchemaError::DuplicateFieldId(id) => Some(id),
            SchemaError::EmptyFieldId { .. } | SchemaError::MalformedField { .. } => None,
        }
    }
}

/// Malformed push-channel message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Body is not well-formed JSON or lacks the envelope shape
    #[error("Malformed envelope: {0}")]
    Envelope(String),

    /// Envelope is fine but its payload does not match the event contract
    #[error("Malformed '{event}' payload: {reason}")]
    Payload { event: String, reason: String },
}

impl ParseError {
    pub fn envelope(msg: impl Into<String>) -> Self {
        ParseError::Envelope(msg.into())
    }

    pub fn payload(event: impl Into<String>, reason: impl Into<String>) -> Self {
        ParseError::Payload {
            event: event.into(),
            reason: reason.into(),
        }
    }
}

/// Submission blocked by client-side validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field has no usable answer
    #[error("Please fill: {label}")]
    RequiredFieldUnfilled { field_id: String, label: String },
}

impl ValidationError {
    /// Id of the field the respondent has to correct
    pub fn field_id(&self) -> &str {
        match self {
            ValidationError::RequiredFieldUnfilled { field_id, .. } => field_id,
        }
    }
}

/// Result alias for schema construction
pub type SchemaResult<T> = std::result::Result<T, SchemaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_display() {
        let err = SchemaError::InvertedRange {
            field_id: "q3".to_string(),
            min: 5,
            max: 1,
        };
        assert_eq!(err.to_string(), "Field 'q3' has rating min 5 greater than max 1");
        assert_eq!(err.field_id(), Some("q3"));
    }

    #[test]
    fn test_empty_id_has_no_field_id() {
        let err = SchemaError::EmptyFieldId { position: 2 };
        assert_eq!(err.field_id(), None);
    }

    #[test]
    fn test_parse_error_constructors() {
        let err = ParseError::payload("response:created", "missing field `answers`");
        assert!(matches!(err, ParseError::Payload { .. }));
        assert!(err.to_string().contains("response:created"));

        let err = ParseError::envelope("expected value at line 1 column 1");
        assert!(matches!(err, ParseError::Envelope(_)));
    }

    #[test]
    fn test_validation_error_names_field() {
        let err = ValidationError::RequiredFieldUnfilled {
            field_id: "q1".to_string(),
            label: "Your name".to_string(),
        };
        assert_eq!(err.to_string(), "Please fill: Your name");
        assert_eq!(err.field_id(), "q1");
    }
}
