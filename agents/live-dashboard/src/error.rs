//! Error types for the live dashboard
//!
//! Wraps the core failure families and adds transport, API, file and
//! configuration errors.

use formpulse_core::{SchemaError, ValidationError};
use thiserror::Error;

/// Main error type for dashboard operations
#[derive(Error, Debug)]
pub enum DashboardError {
    /// Invalid input data or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File access or I/O error
    #[error("File error: {0}")]
    FileError(String),

    /// Configuration file or environment error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Document parsing error
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Request never produced a response
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Remote API answered with a non-success status
    #[error("API returned {status}: {body}")]
    ApiStatus { status: u16, body: String },

    /// Push-channel transport failure
    #[error("Push channel error: {0}")]
    ChannelError(String),

    /// Malformed form definition
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Submission blocked by required-field validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl DashboardError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        DashboardError::InvalidInput(msg.into())
    }

    pub fn file_error(msg: impl Into<String>) -> Self {
        DashboardError::FileError(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        DashboardError::ConfigError(msg.into())
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        DashboardError::ParseError(msg.into())
    }

    pub fn channel_error(msg: impl Into<String>) -> Self {
        DashboardError::ChannelError(msg.into())
    }

    /// Check if this is a user-facing error (vs internal)
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            DashboardError::InvalidInput(_)
                | DashboardError::FileError(_)
                | DashboardError::ConfigError(_)
                | DashboardError::ParseError(_)
                | DashboardError::Schema(_)
                | DashboardError::Validation(_)
        )
    }

    /// Whether retrying the same request cannot succeed
    pub fn is_permanent(&self) -> bool {
        match self {
            DashboardError::ApiStatus { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 429
            }
            DashboardError::HttpError(_) | DashboardError::ChannelError(_) => false,
            _ => true,
        }
    }
}

impl From<std::io::Error> for DashboardError {
    fn from(err: std::io::Error) -> Self {
        DashboardError::FileError(err.to_string())
    }
}

impl From<csv::Error> for DashboardError {
    fn from(err: csv::Error) -> Self {
        DashboardError::ParseError(format!("CSV error: {}", err))
    }
}

impl From<serde_json::Error> for DashboardError {
    fn from(err: serde_json::Error) -> Self {
        DashboardError::ParseError(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for DashboardError {
    fn from(err: serde_yaml::Error) -> Self {
        DashboardError::ParseError(format!("YAML error: {}", err))
    }
}

impl From<toml::de::Error> for DashboardError {
    fn from(err: toml::de::Error) -> Self {
        DashboardError::ConfigError(format!("TOML error: {}", err))
    }
}

impl From<reqwest::Error> for DashboardError {
    fn from(err: reqwest::Error) -> Self {
        DashboardError::HttpError(err.to_string())
    }
}

/// Result type alias for dashboard operations
pub type Result<T> = std::result::Result<T, DashboardError>;
