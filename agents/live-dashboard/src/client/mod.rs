//! HTTP clients for external services
//!
//! Forms, analytics summaries and responses are persisted by the remote
//! forms API; this package never stores anything itself.

pub mod api;

pub use api::{parse_export, ApiClientConfig, FormApiClient, FormApiClientBuilder, SubmitRequest};
