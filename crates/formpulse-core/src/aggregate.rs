//! Aggregation store
//!
//! Holds the per-field frequency tables a live dashboard renders. The store
//! is the sole owner of its [`AggregationSnapshot`]: callers seed it once
//! with [`AggregationStore::initialize`], feed it normalized bucket keys via
//! [`AggregationStore::ingest`], and read defensive copies through
//! [`AggregationStore::read`]. Counts only ever increase.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::normalize::{BucketKey, BucketKeys};

/// Bucket key to count mapping for one field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrequencyTable(BTreeMap<BucketKey, u64>);

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count for a key; absent keys count as zero
    pub fn get(&self, key: &str) -> u64 {
        self.0.get(key).copied().unwrap_or(0)
    }

    fn increment(&mut self, key: &str) {
        match self.0.get_mut(key) {
            Some(count) => *count = count.saturating_add(1),
            None => {
                self.0.insert(key.to_string(), 1);
            }
        }
    }

    /// Sum of all counts
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<K: Into<BucketKey>> FromIterator<(K, u64)> for FrequencyTable {
    fn from_iter<T: IntoIterator<Item = (K, u64)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Field id to frequency table mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregationSnapshot(BTreeMap<String, FrequencyTable>);

impl AggregationSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table for a field, if any answer has been counted for it
    pub fn table(&self, field_id: &str) -> Option<&FrequencyTable> {
        self.0.get(field_id)
    }

    /// Count of one bucket; absent fields and keys count as zero
    pub fn count(&self, field_id: &str, key: &str) -> u64 {
        self.table(field_id).map(|t| t.get(key)).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FrequencyTable)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn table_mut(&mut self, field_id: &str) -> &mut FrequencyTable {
        self.0.entry(field_id.to_string()).or_default()
    }
}

impl<K: Into<String>> FromIterator<(K, FrequencyTable)> for AggregationSnapshot {
    fn from_iter<T: IntoIterator<Item = (K, FrequencyTable)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Analytics summary as served by the remote API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    #[serde(default)]
    pub buckets: AggregationSnapshot,
}

/// Result of an [`AggregationStore::initialize`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// Snapshot installed
    Initialized,
    /// Store was already seeded; the new snapshot was discarded
    AlreadyInitialized,
}

/// Owner of the live aggregation snapshot for one dashboard session
#[derive(Debug, Default)]
pub struct AggregationStore {
    snapshot: AggregationSnapshot,
    initialized: bool,
    increments: u64,
}

impl AggregationStore {
    /// Create an empty, uninitialized store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a fetched snapshot
    ///
    /// Only the first call takes effect. Increments applied before it are
    /// replaced together with the rest of the state; the ingestor buffers
    /// early events so that this does not happen in a live session.
    pub fn initialize(&mut self, snapshot: AggregationSnapshot) -> InitOutcome {
        if self.initialized {
            tracing::warn!(
                fields = snapshot.len(),
                "Aggregation store already initialized, ignoring snapshot"
            );
            return InitOutcome::AlreadyInitialized;
        }
        if self.increments > 0 {
            tracing::warn!(
                discarded_increments = self.increments,
                "Initializing aggregation store after ingestion, earlier increments are replaced"
            );
        }
        tracing::debug!(fields = snapshot.len(), "Aggregation store initialized");
        self.snapshot = snapshot;
        self.initialized = true;
        InitOutcome::Initialized
    }

    /// Count one occurrence of every key for a field
    pub fn ingest(&mut self, field_id: &str, keys: &BucketKeys) {
        if keys.is_empty() {
            return;
        }
        let table = self.snapshot.table_mut(field_id);
        for key in keys {
            table.increment(key);
        }
        self.increments += keys.len() as u64;
    }

    /// Copy of the current state
    pub fn read(&self) -> AggregationSnapshot {
        self.snapshot.clone()
    }

    /// Borrowed view of the current state
    pub fn view(&self) -> &AggregationSnapshot {
        &self.snapshot
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Number of bucket increments applied through [`ingest`](Self::ingest)
    pub fn total_increments(&self) -> u64 {
        self.increments
    }
}
