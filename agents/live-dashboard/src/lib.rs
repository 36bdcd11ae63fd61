//! FormPulse live dashboard
//!
//! Follows one form's responses: fetches the form definition and its
//! analytics summary from the forms API, subscribes to the push channel,
//! and keeps a per-field frequency snapshot current as responses arrive.
//!
//! ## Components
//!
//! - `client` - forms API client (form, summary, submission, export)
//! - `channel` - push-channel transport producing [`channel::ChannelEvent`]s
//! - `ingest` - the single task that owns the aggregation store
//! - `session` - orchestration of one live view
//! - `server` - read-only HTTP surface (`/snapshot`, `/health`, `/metrics`)
//! - `cli` - the `formpulse` command line
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use live_dashboard::{ApiClientConfig, DashboardConfig, DashboardSession, FormApiClient};
//!
//! # async fn example() -> live_dashboard::Result<()> {
//! let config = DashboardConfig::from_env();
//! let client = Arc::new(FormApiClient::with_config(ApiClientConfig::from(&config))?);
//! let session = DashboardSession::open(client, &config, "65f0c0ffee", None).await?;
//!
//! let mut handle = session.handle();
//! while handle.changed().await {
//!     println!("{:?}", handle.snapshot());
//! }
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod ingest;
pub mod server;
pub mod session;
pub mod telemetry;

pub use channel::ChannelEvent;
pub use cli::{ExitCode, ExportFormat, ExportOutput, FormPulseCli, FormPulseCommands, OutputFormat};
pub use client::{parse_export, ApiClientConfig, FormApiClient, FormApiClientBuilder};
pub use config::DashboardConfig;
pub use error::{DashboardError, Result};
pub use ingest::{DashboardHandle, DashboardState, IngestionLoop, LoopSummary};
pub use server::{create_router, ServerState};
pub use session::DashboardSession;
pub use telemetry::{DashboardMetrics, DashboardMetricsRegistry};

/// Package version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run the CLI and map any failure to an exit code
pub async fn run_cli(cli: FormPulseCli) -> ExitCode {
    match cli::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            if e.is_user_error() {
                eprintln!("Error: {}", e);
            } else {
                tracing::error!(error = %e, "Command failed");
                eprintln!("Internal error: {}", e);
            }
            ExitCode::from_error(&e)
        }
    }
}
