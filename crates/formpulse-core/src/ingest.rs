//! Per-message ingestion
//!
//! The [`Ingestor`] turns raw push-channel messages into store updates. Each
//! call to [`Ingestor::handle_message`] is one atomic step: the message is
//! fully decoded before any count changes, so a reader between two calls
//! always sees a consistent snapshot.
//!
//! The initial snapshot fetch and the push-channel subscription race each
//! other. Events that arrive before [`Ingestor::initialize`] are buffered in
//! arrival order and replayed on top of the fetched snapshot.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::aggregate::{AggregationSnapshot, AggregationStore, InitOutcome};
use crate::envelope::{parse_message, ChannelMessage, ResponseCreated};
use crate::error::ParseError;
use crate::normalize::{normalize_kind, normalize_untyped};
use crate::schema::{Field, FieldIndex};

/// Default bound on events held back before initialization
pub const DEFAULT_MAX_PENDING: usize = 10_000;

/// Why a message was not applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Message failed to decode
    Malformed(ParseError),
    /// Pre-initialization buffer is at capacity
    BufferFull,
}

/// Effect of one handled message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Answers were counted
    Applied { answers: usize, increments: usize },
    /// Held back until the store is initialized
    Buffered { pending: usize },
    /// Well-formed but not relevant to this session
    Ignored { kind: String },
    /// Not applied and not retained
    Dropped(DropReason),
}

/// Result of initializing through the ingestor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub init: InitOutcome,
    /// Buffered events applied after the snapshot was installed
    pub replayed: usize,
    /// Answers counted by the replayed events
    pub answers: usize,
    /// Bucket increments applied by the replayed events
    pub increments: usize,
}

/// Running counters of an ingestor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub messages: u64,
    pub applied: u64,
    pub buffered: u64,
    pub replayed: u64,
    pub ignored: u64,
    pub malformed: u64,
    pub overflowed: u64,
    pub answers: u64,
    pub unknown_field_answers: u64,
    pub increments: u64,
}

/// Parses, normalizes and aggregates push-channel messages for one form
#[derive(Debug)]
pub struct Ingestor {
    index: FieldIndex,
    store: AggregationStore,
    form_id: Option<String>,
    pending: VecDeque<ResponseCreated>,
    max_pending: usize,
    stats: IngestStats,
}

impl Ingestor {
    /// Create an ingestor for a form's field list
    pub fn new(fields: &[Field]) -> Self {
        Self {
            index: FieldIndex::from_fields(fields),
            store: AggregationStore::new(),
            form_id: None,
            pending: VecDeque::new(),
            max_pending: DEFAULT_MAX_PENDING,
            stats: IngestStats::default(),
        }
    }

    /// Ignore envelopes explicitly tagged for another form
    pub fn with_form_id(mut self, form_id: impl Into<String>) -> Self {
        self.form_id = Some(form_id.into());
        self
    }

    /// Bound the pre-initialization buffer
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Handle one raw push-channel message
    pub fn handle_message(&mut self, raw: &str) -> IngestOutcome {
        self.stats.messages += 1;

        match parse_message(raw) {
            Ok(ChannelMessage::ResponseCreated { form_id, event }) => {
                if let (Some(expected), Some(actual)) = (&self.form_id, &form_id) {
                    if expected != actual {
                        self.stats.ignored += 1;
                        tracing::debug!(
                            expected = %expected,
                            actual = %actual,
                            "Ignoring event for another form"
                        );
                        return IngestOutcome::Ignored {
                            kind: format!("foreign form '{}'", actual),
                        };
                    }
                }
                self.handle_event(event)
            }
            Ok(ChannelMessage::Other { kind }) => {
                self.stats.ignored += 1;
                tracing::trace!(kind = %kind, "Ignoring push-channel event");
                IngestOutcome::Ignored { kind }
            }
            Err(e) => {
                self.stats.malformed += 1;
                tracing::debug!(error = %e, "Dropping malformed push-channel message");
                IngestOutcome::Dropped(DropReason::Malformed(e))
            }
        }
    }

    /// Handle an already decoded event
    pub fn handle_event(&mut self, event: ResponseCreated) -> IngestOutcome {
        if self.store.is_initialized() {
            let (answers, increments) = self.apply(&event);
            self.stats.applied += 1;
            return IngestOutcome::Applied { answers, increments };
        }

        if self.pending.len() >= self.max_pending {
            self.stats.overflowed += 1;
            tracing::warn!(
                max_pending = self.max_pending,
                "Pre-initialization buffer full, dropping event"
            );
            return IngestOutcome::Dropped(DropReason::BufferFull);
        }

        self.pending.push_back(event);
        self.stats.buffered += 1;
        IngestOutcome::Buffered {
            pending: self.pending.len(),
        }
    }

    /// Install the fetched snapshot and replay buffered events onto it
    pub fn initialize(&mut self, snapshot: AggregationSnapshot) -> ReplayOutcome {
        let init = self.store.initialize(snapshot);
        if init == InitOutcome::AlreadyInitialized {
            return ReplayOutcome {
                init,
                replayed: 0,
                answers: 0,
                increments: 0,
            };
        }

        let (mut replayed, mut answers, mut increments) = (0, 0, 0);
        while let Some(event) = self.pending.pop_front() {
            let (event_answers, event_increments) = self.apply(&event);
            replayed += 1;
            answers += event_answers;
            increments += event_increments;
        }
        self.stats.replayed += replayed as u64;

        if replayed > 0 {
            tracing::info!(replayed, "Replayed events received before initialization");
        }
        ReplayOutcome {
            init,
            replayed,
            answers,
            increments,
        }
    }

    fn apply(&mut self, event: &ResponseCreated) -> (usize, usize) {
        let mut increments = 0;
        for answer in &event.answers {
            let keys = match self.index.kind(&answer.field_id) {
                Some(kind) => normalize_kind(kind, &answer.value),
                None => {
                    self.stats.unknown_field_answers += 1;
                    tracing::debug!(
                        field_id = %answer.field_id,
                        "Answer references a field missing from the schema"
                    );
                    normalize_untyped(&answer.value)
                }
            };
            self.store.ingest(&answer.field_id, &keys);
            increments += keys.len();
        }
        self.stats.answers += event.answers.len() as u64;
        self.stats.increments += increments as u64;
        (event.answers.len(), increments)
    }

    /// Copy of the current aggregation state
    pub fn snapshot(&self) -> AggregationSnapshot {
        self.store.read()
    }

    pub fn store(&self) -> &AggregationStore {
        &self.store
    }

    pub fn is_initialized(&self) -> bool {
        self.store.is_initialized()
    }

    /// Events waiting for initialization
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }
}
