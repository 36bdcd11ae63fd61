//! FormPulse core
//!
//! Live response aggregation for typed forms. A form is an ordered list of
//! [`Field`]s; every submitted response is a list of [`Answer`]s. The engine
//! turns answers into bucket keys and maintains one frequency table per field
//! so a dashboard can render response distributions as they change.
//!
//! ## Architecture
//!
//! 1. **Schema** (`schema`): closed set of field variants, raw wire records
//!    converted through `TryFrom` so a [`Field`] is always valid.
//! 2. **Normalize** (`normalize`): total mapping from answer value to bucket
//!    keys; drifted values are keyed by their canonical form.
//! 3. **Aggregate** (`aggregate`): the [`AggregationStore`] owning the
//!    per-field frequency tables of one session.
//! 4. **Envelope / Ingest** (`envelope`, `ingest`): push-channel message
//!    contract and the per-message [`Ingestor`], including buffering of
//!    events that arrive before the initial snapshot.
//! 5. **Export** (`export`): one flat row per answer for CSV reports.
//! 6. **Validation** (`validation`): required-field gating for submissions
//!    and the advisory [`AnswerChecker`].
//!
//! Everything here is synchronous and performs no I/O.
//!
//! ## Example
//!
//! ```rust
//! use formpulse_core::{AggregationSnapshot, Field, Ingestor};
//!
//! let fields = vec![Field::mcq("q1", "How useful?", ["Very", "Somewhat"]).unwrap()];
//! let mut ingestor = Ingestor::new(&fields);
//! ingestor.initialize(AggregationSnapshot::new());
//!
//! ingestor.handle_message(
//!     r#"{"type":"response:created","payload":{"answers":[{"fieldId":"q1","value":"Very"}]}}"#,
//! );
//! assert_eq!(ingestor.snapshot().count("q1", "Very"), 1);
//! ```

pub mod aggregate;
pub mod answer;
pub mod envelope;
pub mod error;
pub mod export;
pub mod ingest;
pub mod normalize;
pub mod schema;
pub mod validation;

pub use aggregate::{AggregationSnapshot, AggregationStore, AnalyticsSummary, FrequencyTable, InitOutcome};
pub use answer::{answer_list, answer_map, Answer, AnswerMap, AnswerValue};
pub use envelope::{parse_message, ChannelMessage, Envelope, ResponseCreated, RESPONSE_CREATED};
pub use error::{ParseError, SchemaError, SchemaResult, ValidationError};
pub use export::{export_cell, ExportRow, EXPORT_HEADER, SELECTION_SEPARATOR};
pub use ingest::{DropReason, IngestOutcome, IngestStats, Ingestor, ReplayOutcome, DEFAULT_MAX_PENDING};
pub use normalize::{normalize, normalize_kind, normalize_untyped, BucketKey, BucketKeys};
pub use schema::{
    validate_fields, Field, FieldIndex, FieldKind, Form, FormStatus, RawField, DEFAULT_RATING_MAX,
    DEFAULT_RATING_MIN, UNTITLED_FORM,
};
pub use validation::{
    first_unfilled_required, require_complete, AnswerChecker, AnswerRule, RuleCategory, Severity,
    ValidationFinding, ValidationReport,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
