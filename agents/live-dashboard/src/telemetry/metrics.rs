//! Prometheus metrics for the live dashboard
//!
//! - `formpulse_ingest_events_total` (counter) - Push-channel messages by outcome
//! - `formpulse_ingest_answers_total` (counter) - Answers counted
//! - `formpulse_ingest_bucket_increments_total` (counter) - Bucket increments applied
//! - `formpulse_ingest_pending_events` (gauge) - Events waiting for the initial snapshot
//! - `formpulse_channel_connected` (gauge) - 1 while the push channel is up
//! - `formpulse_api_requests_total` (counter) - API calls by operation and result
//! - `formpulse_api_request_duration_seconds` (histogram) - API call latency

use prometheus::{CounterVec, Gauge, HistogramVec, IntCounter, Opts, Registry};
use std::sync::Arc;

use crate::error::{DashboardError, Result};
use formpulse_core::{DropReason, IngestOutcome, ReplayOutcome};

/// Ingestion and API metrics
pub struct DashboardMetrics {
    events_total: CounterVec,
    answers_total: IntCounter,
    increments_total: IntCounter,
    pending_events: Gauge,
    connected: Gauge,
    api_requests_total: CounterVec,
    api_duration_seconds: HistogramVec,
}

impl DashboardMetrics {
    /// Create the metrics and register them with `registry`
    pub fn new(registry: &Registry) -> Result<Self> {
        let events_total = CounterVec::new(
            Opts::new("events_total", "Push-channel messages handled, by outcome")
                .namespace("formpulse")
                .subsystem("ingest"),
            &["outcome"],
        )?;

        let answers_total = IntCounter::with_opts(
            Opts::new("answers_total", "Answers counted into the aggregation")
                .namespace("formpulse")
                .subsystem("ingest"),
        )?;

        let increments_total = IntCounter::with_opts(
            Opts::new("bucket_increments_total", "Bucket increments applied")
                .namespace("formpulse")
                .subsystem("ingest"),
        )?;

        let pending_events = Gauge::with_opts(
            Opts::new("pending_events", "Events buffered until the initial snapshot arrives")
                .namespace("formpulse")
                .subsystem("ingest"),
        )?;

        let connected = Gauge::with_opts(
            Opts::new("connected", "Whether the push channel is connected")
                .namespace("formpulse")
                .subsystem("channel"),
        )?;

        let api_requests_total = CounterVec::new(
            Opts::new("requests_total", "Forms API requests by operation and result")
                .namespace("formpulse")
                .subsystem("api"),
            &["operation", "result"],
        )?;

        let api_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("request_duration_seconds", "Forms API request duration in seconds")
                .namespace("formpulse")
                .subsystem("api")
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["operation"],
        )?;

        registry.register(Box::new(events_total.clone()))?;
        registry.register(Box::new(answers_total.clone()))?;
        registry.register(Box::new(increments_total.clone()))?;
        registry.register(Box::new(pending_events.clone()))?;
        registry.register(Box::new(connected.clone()))?;
        registry.register(Box::new(api_requests_total.clone()))?;
        registry.register(Box::new(api_duration_seconds.clone()))?;

        Ok(Self {
            events_total,
            answers_total,
            increments_total,
            pending_events,
            connected,
            api_requests_total,
            api_duration_seconds,
        })
    }

    /// Record the outcome of one handled message
    pub fn record_outcome(&self, outcome: &IngestOutcome) {
        let label = match outcome {
            IngestOutcome::Applied { answers, increments } => {
                self.answers_total.inc_by(*answers as u64);
                self.increments_total.inc_by(*increments as u64);
                "applied"
            }
            IngestOutcome::Buffered { .. } => "buffered",
            IngestOutcome::Ignored { .. } => "ignored",
            IngestOutcome::Dropped(DropReason::Malformed(_)) => "malformed",
            IngestOutcome::Dropped(DropReason::BufferFull) => "overflow",
        };
        self.events_total.with_label_values(&[label]).inc();
    }

    /// Record events replayed after initialization, with their answers
    pub fn record_replay(&self, replay: &ReplayOutcome) {
        self.events_total
            .with_label_values(&["replayed"])
            .inc_by(replay.replayed as f64);
        self.answers_total.inc_by(replay.answers as u64);
        self.increments_total.inc_by(replay.increments as u64);
    }

    pub fn set_pending(&self, pending: usize) {
        self.pending_events.set(pending as f64);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.set(if connected { 1.0 } else { 0.0 });
    }

    /// Record one API call
    pub fn record_api_request(&self, operation: &str, success: bool, duration_secs: f64) {
        let result = if success { "success" } else { "failure" };
        self.api_requests_total.with_label_values(&[operation, result]).inc();
        self.api_duration_seconds
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    /// Count recorded for one outcome label
    pub fn events_with_outcome(&self, outcome: &str) -> f64 {
        self.events_total.with_label_values(&[outcome]).get()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.get() > 0.0
    }
}

/// Registry owning the dashboard metrics
pub struct DashboardMetricsRegistry {
    registry: Registry,
    dashboard: Arc<DashboardMetrics>,
}

impl DashboardMetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let dashboard = Arc::new(DashboardMetrics::new(&registry)?);
        Ok(Self { registry, dashboard })
    }

    pub fn dashboard(&self) -> Arc<DashboardMetrics> {
        Arc::clone(&self.dashboard)
    }

    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Encode metrics as text for scraping
    pub fn encode_text(&self) -> Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| DashboardError::InternalError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formpulse_core::{InitOutcome, ParseError};

    #[test]
    fn test_record_outcomes() {
        let registry = DashboardMetricsRegistry::new().unwrap();
        let metrics = registry.dashboard();

        metrics.record_outcome(&IngestOutcome::Applied { answers: 3, increments: 4 });
        metrics.record_outcome(&IngestOutcome::Applied { answers: 1, increments: 1 });
        metrics.record_outcome(&IngestOutcome::Dropped(DropReason::Malformed(ParseError::envelope("x"))));
        metrics.record_outcome(&IngestOutcome::Ignored { kind: "form:updated".to_string() });

        assert_eq!(metrics.events_with_outcome("applied"), 2.0);
        assert_eq!(metrics.events_with_outcome("malformed"), 1.0);
        assert_eq!(metrics.answers_total.get(), 4);
        assert_eq!(metrics.increments_total.get(), 5);
    }

    #[test]
    fn test_replay_counts_answers() {
        let registry = DashboardMetricsRegistry::new().unwrap();
        let metrics = registry.dashboard();

        metrics.record_outcome(&IngestOutcome::Buffered { pending: 1 });
        metrics.record_outcome(&IngestOutcome::Buffered { pending: 2 });
        metrics.record_replay(&ReplayOutcome {
            init: InitOutcome::Initialized,
            replayed: 2,
            answers: 3,
            increments: 5,
        });

        assert_eq!(metrics.events_with_outcome("buffered"), 2.0);
        assert_eq!(metrics.events_with_outcome("replayed"), 2.0);
        assert_eq!(metrics.answers_total.get(), 3);
        assert_eq!(metrics.increments_total.get(), 5);
    }

    #[test]
    fn test_connected_gauge() {
        let registry = DashboardMetricsRegistry::new().unwrap();
        let metrics = registry.dashboard();
        assert!(!metrics.is_connected());
        metrics.set_connected(true);
        assert!(metrics.is_connected());
    }

    #[test]
    fn test_encode_text() {
        let registry = DashboardMetricsRegistry::new().unwrap();
        let metrics = registry.dashboard();
        metrics.record_api_request("fetch_summary", true, 0.02);
        metrics.set_pending(3);

        let text = registry.encode_text().unwrap();
        assert!(text.contains("formpulse_api_requests_total"));
        assert!(text.contains("formpulse_ingest_pending_events 3"));
    }
}
