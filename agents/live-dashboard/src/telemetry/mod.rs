//! Telemetry for the live dashboard
//!
//! - `metrics` - Prometheus metrics for ingestion and API calls
//! - [`init_tracing`] - subscriber setup shared by the binary

pub mod metrics;

pub use metrics::{DashboardMetrics, DashboardMetricsRegistry};

use tracing::Level;

/// Log level for a `-v` count; `RUST_LOG` directives still apply on top
pub fn level_for_verbosity(verbose: u8, quiet: bool) -> Level {
    if quiet {
        return Level::ERROR;
    }
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install the global fmt subscriber
pub fn init_tracing(level: Level) {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_verbosity() {
        assert_eq!(level_for_verbosity(0, false), Level::WARN);
        assert_eq!(level_for_verbosity(2, false), Level::DEBUG);
        assert_eq!(level_for_verbosity(5, false), Level::TRACE);
        assert_eq!(level_for_verbosity(3, true), Level::ERROR);
    }
}
