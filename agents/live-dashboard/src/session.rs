//! Dashboard session orchestration
//!
//! Opening a session fetches the form definition, then starts the push
//! channel subscription and the analytics summary fetch concurrently. The
//! ingestion loop reconciles the two. Closing the session drops the event
//! receiver, which tears the transport down.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::channel::{self, ChannelEvent};
use crate::client::FormApiClient;
use crate::config::DashboardConfig;
use crate::error::{DashboardError, Result};
use crate::ingest::{DashboardHandle, DashboardState, IngestionLoop, LoopSummary};
use crate::telemetry::DashboardMetrics;
use formpulse_core::{first_unfilled_required, AggregationSnapshot, AnswerMap, Field, Form, Ingestor};

/// A live view of one form's responses
pub struct DashboardSession {
    session_id: Uuid,
    form_id: String,
    form: Form,
    started_at: DateTime<Utc>,
    handle: DashboardHandle,
    ingestion: JoinHandle<LoopSummary>,
    transport: Option<JoinHandle<()>>,
}

impl DashboardSession {
    /// Fetch the form and start following its responses
    pub async fn open(
        client: Arc<FormApiClient>,
        config: &DashboardConfig,
        form_id: &str,
        metrics: Option<Arc<DashboardMetrics>>,
    ) -> Result<Self> {
        let form = timed(metrics.as_deref(), "fetch_form", client.fetch_form(form_id)).await?;
        if !form.is_published() {
            tracing::warn!(form_id, status = %form.status, "Form is not published, no responses will arrive");
        }

        let url = config.ws_url(form_id)?;
        let (events, transport) = channel::subscribe(url, config.channel_buffer);

        let (initial_tx, initial_rx) = oneshot::channel();
        let summary_metrics = metrics.clone();
        let summary_form_id = form_id.to_string();
        tokio::spawn(async move {
            let summary = timed(
                summary_metrics.as_deref(),
                "fetch_summary",
                client.fetch_summary(&summary_form_id),
            )
            .await;
            match summary {
                Ok(summary) => {
                    let _ = initial_tx.send(summary.buckets);
                }
                Err(e) => {
                    // Dropping the sender starts the session from empty counts
                    tracing::warn!(form_id = %summary_form_id, error = %e, "Failed to fetch analytics summary");
                }
            }
        });

        let mut session = Self::attach(form, form_id, events, initial_rx, config.max_pending_events, metrics);
        session.transport = Some(transport);
        Ok(session)
    }

    /// Start a session over an existing event stream and snapshot source
    pub fn attach(
        form: Form,
        form_id: &str,
        events: mpsc::Receiver<ChannelEvent>,
        initial: oneshot::Receiver<AggregationSnapshot>,
        max_pending: usize,
        metrics: Option<Arc<DashboardMetrics>>,
    ) -> Self {
        let ingestor = Ingestor::new(&form.fields)
            .with_form_id(form_id)
            .with_max_pending(max_pending);
        let (ingestion, handle) = IngestionLoop::new(ingestor, events, initial);
        let ingestion = match metrics {
            Some(metrics) => ingestion.with_metrics(metrics),
            None => ingestion,
        };

        let session_id = Uuid::new_v4();
        tracing::info!(session_id = %session_id, form_id, fields = form.fields.len(), "Dashboard session started");

        Self {
            session_id,
            form_id: form_id.to_string(),
            form,
            started_at: Utc::now(),
            handle,
            ingestion: tokio::spawn(ingestion.run()),
            transport: None,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn form_id(&self) -> &str {
        &self.form_id
    }

    pub fn form(&self) -> &Form {
        &self.form
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Read handle that outlives the session borrow
    pub fn handle(&self) -> DashboardHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> DashboardState {
        self.handle.state()
    }

    pub fn snapshot(&self) -> AggregationSnapshot {
        self.handle.snapshot()
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_connected()
    }

    /// First required field the given answers leave unfilled
    pub fn next_unfilled_required(&self, answers: &AnswerMap) -> Option<&Field> {
        first_unfilled_required(&self.form.fields, answers)
    }

    /// Wait for the push channel to close
    pub async fn wait(mut self) -> Result<LoopSummary> {
        let summary = (&mut self.ingestion)
            .await
            .map_err(|e| DashboardError::InternalError(format!("Ingestion task failed: {}", e)))?;
        if let Some(transport) = self.transport.take() {
            transport.await.ok();
        }
        Ok(summary)
    }

    /// Stop ingesting and disconnect
    pub async fn close(mut self) {
        self.ingestion.abort();
        (&mut self.ingestion).await.ok();
        if let Some(transport) = self.transport.take() {
            transport.abort();
            transport.await.ok();
        }
        tracing::info!(session_id = %self.session_id, "Dashboard session closed");
    }
}

/// Await an API call, recording its duration and result
async fn timed<T, F>(metrics: Option<&DashboardMetrics>, operation: &str, request: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let result = request.await;
    if let Some(metrics) = metrics {
        metrics.record_api_request(operation, result.is_ok(), start.elapsed().as_secs_f64());
    }
    result
}
