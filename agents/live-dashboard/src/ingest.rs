//! Event ingestion loop
//!
//! One tokio task owns the [`Ingestor`] and with it the aggregation store.
//! It consumes transport events strictly in delivery order, one at a time,
//! and publishes a [`DashboardState`] through a `watch` channel after each
//! one. Readers never touch the store; they clone what was published.
//!
//! The initial snapshot arrives on a oneshot channel and may race with the
//! first push-channel events. Early events are buffered by the ingestor and
//! replayed once the snapshot lands. If the snapshot sender is dropped
//! without sending, the session starts from an empty snapshot and is marked
//! degraded.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

use crate::channel::ChannelEvent;
use crate::telemetry::DashboardMetrics;
use formpulse_core::{AggregationSnapshot, IngestOutcome, IngestStats, Ingestor};

/// Everything a renderer needs, published after every handled event
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardState {
    /// True between connect acknowledgement and disconnect
    pub connected: bool,
    /// Initial snapshot has been installed
    pub initialized: bool,
    /// Initial snapshot could not be fetched; counts start from zero
    pub degraded: bool,
    /// Events waiting for the initial snapshot
    pub pending: usize,
    pub stats: IngestStats,
    pub snapshot: AggregationSnapshot,
}

/// Read side of a running ingestion loop
#[derive(Debug, Clone)]
pub struct DashboardHandle {
    state: watch::Receiver<DashboardState>,
}

impl DashboardHandle {
    /// Copy of the latest published state
    pub fn state(&self) -> DashboardState {
        self.state.borrow().clone()
    }

    /// Copy of the latest published snapshot
    pub fn snapshot(&self) -> AggregationSnapshot {
        self.state.borrow().snapshot.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    pub fn is_initialized(&self) -> bool {
        self.state.borrow().initialized
    }

    pub fn is_degraded(&self) -> bool {
        self.state.borrow().degraded
    }

    /// Wait for the next publication; `false` once the loop has ended
    pub async fn changed(&mut self) -> bool {
        self.state.changed().await.is_ok()
    }

    /// Raw receiver, for callers that want to `select!` on it
    pub fn subscribe(&self) -> watch::Receiver<DashboardState> {
        self.state.clone()
    }
}

/// How the loop ended
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopSummary {
    pub stats: IngestStats,
    pub initialized: bool,
    /// Close reason reported by the transport, if any
    pub close_reason: Option<String>,
}

/// Drives an [`Ingestor`] from a push-channel event stream
pub struct IngestionLoop {
    ingestor: Ingestor,
    events: mpsc::Receiver<ChannelEvent>,
    initial: Option<oneshot::Receiver<AggregationSnapshot>>,
    state: watch::Sender<DashboardState>,
    metrics: Option<Arc<DashboardMetrics>>,
}

impl IngestionLoop {
    pub fn new(
        ingestor: Ingestor,
        events: mpsc::Receiver<ChannelEvent>,
        initial: oneshot::Receiver<AggregationSnapshot>,
    ) -> (Self, DashboardHandle) {
        let (state, rx) = watch::channel(DashboardState::default());
        let ingestion = Self {
            ingestor,
            events,
            initial: Some(initial),
            state,
            metrics: None,
        };
        (ingestion, DashboardHandle { state: rx })
    }

    pub fn with_metrics(mut self, metrics: Arc<DashboardMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run until the transport closes
    pub async fn run(self) -> LoopSummary {
        let Self {
            mut ingestor,
            mut events,
            mut initial,
            state,
            metrics,
        } = self;
        let publisher = Publisher { state, metrics };
        let close_reason;

        loop {
            tokio::select! {
                biased;

                result = recv_initial(&mut initial), if initial.is_some() => {
                    initial = None;
                    publisher.install(&mut ingestor, result.ok());
                }

                event = events.recv() => match event {
                    Some(ChannelEvent::Connected) => publisher.set_connected(true),
                    Some(ChannelEvent::Message(raw)) => {
                        let outcome = ingestor.handle_message(&raw);
                        publisher.outcome(&ingestor, &outcome);
                    }
                    Some(ChannelEvent::Closed { reason }) => {
                        close_reason = reason;
                        break;
                    }
                    None => {
                        close_reason = None;
                        break;
                    }
                },
            }
        }

        publisher.set_connected(false);

        // Keep the fetched counts visible after a disconnect
        if let Some(rx) = initial.take() {
            publisher.install(&mut ingestor, rx.await.ok());
        }

        tracing::info!(
            reason = close_reason.as_deref().unwrap_or("none"),
            applied = ingestor.stats().applied,
            "Ingestion loop ended"
        );

        LoopSummary {
            stats: ingestor.stats().clone(),
            initialized: ingestor.is_initialized(),
            close_reason,
        }
    }
}

async fn recv_initial(
    rx: &mut Option<oneshot::Receiver<AggregationSnapshot>>,
) -> Result<AggregationSnapshot, oneshot::error::RecvError> {
    match rx {
        Some(rx) => rx.await,
        None => std::future::pending().await,
    }
}

struct Publisher {
    state: watch::Sender<DashboardState>,
    metrics: Option<Arc<DashboardMetrics>>,
}

impl Publisher {
    fn install(&self, ingestor: &mut Ingestor, snapshot: Option<AggregationSnapshot>) {
        let degraded = snapshot.is_none();
        if degraded {
            tracing::warn!("Initial snapshot unavailable, starting from empty counts");
        }
        let replay = ingestor.initialize(snapshot.unwrap_or_default());
        if let Some(metrics) = &self.metrics {
            metrics.record_replay(&replay);
            metrics.set_pending(ingestor.pending_len());
        }
        self.state.send_modify(|s| {
            s.degraded = degraded;
            Self::fill(s, ingestor, true);
        });
    }

    fn outcome(&self, ingestor: &Ingestor, outcome: &IngestOutcome) {
        if let Some(metrics) = &self.metrics {
            metrics.record_outcome(outcome);
            metrics.set_pending(ingestor.pending_len());
        }
        let changed = matches!(outcome, IngestOutcome::Applied { increments, .. } if *increments > 0);
        self.state.send_modify(|s| Self::fill(s, ingestor, changed));
    }

    fn set_connected(&self, connected: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.set_connected(connected);
        }
        self.state.send_if_modified(|s| {
            let modified = s.connected != connected;
            s.connected = connected;
            modified
        });
    }

    fn fill(state: &mut DashboardState, ingestor: &Ingestor, snapshot_changed: bool) {
        state.initialized = ingestor.is_initialized();
        state.pending = ingestor.pending_len();
        state.stats = ingestor.stats().clone();
        if snapshot_changed {
            state.snapshot = ingestor.snapshot();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formpulse_core::Field;
    use serde_json::json;

    fn event(field_id: &str, value: &str) -> ChannelEvent {
        ChannelEvent::Message(
            json!({
                "type": "response:created",
                "payload": {"answers": [{"fieldId": field_id, "value": value}]}
            })
            .to_string(),
        )
    }

    fn setup() -> (
        IngestionLoop,
        DashboardHandle,
        mpsc::Sender<ChannelEvent>,
        oneshot::Sender<AggregationSnapshot>,
    ) {
        let fields = vec![Field::mcq("q1", "How useful?", ["Very", "Somewhat"]).unwrap()];
        let (tx, rx) = mpsc::channel(16);
        let (init_tx, init_rx) = oneshot::channel();
        let (ingestion, handle) = IngestionLoop::new(Ingestor::new(&fields), rx, init_rx);
        (ingestion, handle, tx, init_tx)
    }

    #[tokio::test]
    async fn test_applies_events_in_order() {
        let (ingestion, handle, tx, init_tx) = setup();
        init_tx
            .send(serde_json::from_value(json!({"q1": {"Very": 3}})).unwrap())
            .unwrap();
        let task = tokio::spawn(ingestion.run());

        tx.send(ChannelEvent::Connected).await.unwrap();
        tx.send(event("q1", "Very")).await.unwrap();
        tx.send(event("q1", "Somewhat")).await.unwrap();
        tx.send(ChannelEvent::Closed { reason: None }).await.unwrap();

        let summary = task.await.unwrap();
        assert_eq!(summary.stats.applied, 2);
        assert!(summary.initialized);

        let state = handle.state();
        assert_eq!(state.snapshot.count("q1", "Very"), 4);
        assert_eq!(state.snapshot.count("q1", "Somewhat"), 1);
        assert!(!state.connected);
        assert!(!state.degraded);
    }

    #[tokio::test]
    async fn test_connected_flag_and_malformed_messages() {
        let (ingestion, mut handle, tx, init_tx) = setup();
        init_tx.send(AggregationSnapshot::new()).unwrap();
        let task = tokio::spawn(ingestion.run());

        tx.send(ChannelEvent::Connected).await.unwrap();
        while !handle.is_connected() {
            assert!(handle.changed().await);
        }

        tx.send(ChannelEvent::Message("{broken".to_string())).await.unwrap();
        tx.send(event("q1", "Very")).await.unwrap();
        while handle.state().stats.messages < 2 {
            assert!(handle.changed().await);
        }
        assert!(handle.is_connected());
        assert_eq!(handle.snapshot().count("q1", "Very"), 1);
        assert_eq!(handle.state().stats.malformed, 1);

        drop(tx);
        let summary = task.await.unwrap();
        assert_eq!(summary.close_reason, None);
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn test_events_before_snapshot_are_replayed() {
        let (ingestion, mut handle, tx, init_tx) = setup();
        let task = tokio::spawn(ingestion.run());

        tx.send(event("q1", "Very")).await.unwrap();
        tx.send(event("q1", "Very")).await.unwrap();
        while handle.state().pending < 2 {
            assert!(handle.changed().await);
        }
        assert!(handle.snapshot().is_empty());

        tx.send(ChannelEvent::closed("going away")).await.unwrap();
        init_tx
            .send(serde_json::from_value(json!({"q1": {"Very": 3}})).unwrap())
            .unwrap();

        let summary = task.await.unwrap();
        assert_eq!(summary.close_reason.as_deref(), Some("going away"));
        assert_eq!(summary.stats.replayed, 2);
        assert_eq!(handle.snapshot().count("q1", "Very"), 5);
    }

    #[tokio::test]
    async fn test_missing_snapshot_marks_degraded() {
        let (ingestion, handle, tx, init_tx) = setup();
        drop(init_tx);
        let task = tokio::spawn(ingestion.run());

        tx.send(event("q1", "Very")).await.unwrap();
        drop(tx);
        task.await.unwrap();

        let state = handle.state();
        assert!(state.degraded);
        assert!(state.initialized);
        assert_eq!(state.snapshot.count("q1", "Very"), 1);
    }
}
