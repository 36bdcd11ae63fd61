//! Dashboard configuration
//!
//! Values come from, in increasing precedence: built-in defaults, an
//! optional TOML file, `FORMPULSE_*` environment variables, and CLI flags.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::error::{DashboardError, Result};
use formpulse_core::DEFAULT_MAX_PENDING;

const DEFAULT_API_BASE: &str = "http://localhost:8080";
const DEFAULT_WS_BASE: &str = "ws://localhost:8080/ws";
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:9400";

/// Dashboard configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Base URL of the forms API
    pub api_base: String,

    /// Push-channel endpoint; the form id is appended as `?formId=`
    pub ws_base: String,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,

    /// Retry attempts for idempotent reads
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    pub max_backoff_ms: u64,

    /// Backoff multiplier
    pub backoff_multiplier: f64,

    /// Events held back while the initial snapshot is being fetched
    pub max_pending_events: usize,

    /// Capacity of the transport-to-ingestion channel
    pub channel_buffer: usize,

    /// Address of the read-only HTTP surface
    pub listen_addr: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            ws_base: DEFAULT_WS_BASE.to_string(),
            timeout_ms: 5000,
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 5000,
            backoff_multiplier: 2.0,
            max_pending_events: DEFAULT_MAX_PENDING,
            channel_buffer: 256,
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
        }
    }
}

impl DashboardConfig {
    pub fn builder() -> DashboardConfigBuilder {
        DashboardConfigBuilder::new()
    }

    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self::default().merge_env()
    }

    /// Load a TOML file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DashboardError::file_error(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields with any `FORMPULSE_*` variables that are set
    pub fn merge_env(mut self) -> Self {
        if let Ok(v) = std::env::var("FORMPULSE_API_BASE") {
            self.api_base = v;
        }
        if let Ok(v) = std::env::var("FORMPULSE_WS_BASE") {
            self.ws_base = v;
        }
        self.timeout_ms = env_parse("FORMPULSE_TIMEOUT_MS", self.timeout_ms);
        self.max_retries = env_parse("FORMPULSE_MAX_RETRIES", self.max_retries);
        self.max_pending_events = env_parse("FORMPULSE_MAX_PENDING_EVENTS", self.max_pending_events);
        self.channel_buffer = env_parse("FORMPULSE_CHANNEL_BUFFER", self.channel_buffer);
        if let Ok(v) = std::env::var("FORMPULSE_LISTEN_ADDR") {
            self.listen_addr = v;
        }
        self
    }

    /// Reject values that would make the session unusable
    pub fn validate(&self) -> Result<()> {
        if self.api_base.trim().is_empty() {
            return Err(DashboardError::config_error("api_base must not be empty"));
        }
        if !(self.ws_base.starts_with("ws://") || self.ws_base.starts_with("wss://")) {
            return Err(DashboardError::config_error(format!(
                "ws_base must be a ws:// or wss:// URL, got '{}'",
                self.ws_base
            )));
        }
        if self.channel_buffer == 0 {
            return Err(DashboardError::config_error("channel_buffer must be at least 1"));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(DashboardError::config_error("backoff_multiplier must be >= 1.0"));
        }
        Ok(())
    }

    /// Push-channel URL for one form
    pub fn ws_url(&self, form_id: &str) -> Result<String> {
        let url = reqwest::Url::parse_with_params(&self.ws_base, &[("formId", form_id)])
            .map_err(|e| DashboardError::config_error(format!("Invalid ws_base '{}': {}", self.ws_base, e)))?;
        Ok(url.into())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .map_err(|e| DashboardError::config_error(format!("Invalid listen_addr '{}': {}", self.listen_addr, e)))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Builder for DashboardConfig
pub struct DashboardConfigBuilder {
    config: DashboardConfig,
}

impl DashboardConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: DashboardConfig::default(),
        }
    }

    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.config.api_base = url.into();
        self
    }

    pub fn ws_base(mut self, url: impl Into<String>) -> Self {
        self.config.ws_base = url.into();
        self
    }

    pub fn timeout_ms(mut self, timeout: u64) -> Self {
        self.config.timeout_ms = timeout;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn initial_backoff_ms(mut self, backoff: u64) -> Self {
        self.config.initial_backoff_ms = backoff;
        self
    }

    pub fn max_pending_events(mut self, max: usize) -> Self {
        self.config.max_pending_events = max;
        self
    }

    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn build(self) -> DashboardConfig {
        self.config
    }
}

impl Default for DashboardConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = DashboardConfig::default();
        assert_eq!(config.api_base, "http://localhost:8080");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_pending_events, DEFAULT_MAX_PENDING);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = DashboardConfig::builder()
            .api_base("http://api:9090")
            .ws_base("wss://push.example.com/ws")
            .timeout_ms(250)
            .max_retries(0)
            .max_pending_events(10)
            .build();
        assert_eq!(config.api_base, "http://api:9090");
        assert_eq!(config.timeout_ms, 250);
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.max_pending_events, 10);
    }

    #[test]
    fn test_ws_url_appends_form_id() {
        let config = DashboardConfig::default();
        assert_eq!(config.ws_url("65f0").unwrap(), "ws://localhost:8080/ws?formId=65f0");
        assert_eq!(config.ws_url("a b").unwrap(), "ws://localhost:8080/ws?formId=a+b");
    }

    #[test]
    fn test_validate_rejects_http_ws_base() {
        let config = DashboardConfig::builder().ws_base("http://localhost/ws").build();
        assert!(matches!(config.validate(), Err(DashboardError::ConfigError(_))));
    }

    #[test]
    fn test_from_file_partial() {
        let path = std::env::temp_dir().join(format!("formpulse-config-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "api_base = \"http://forms.internal\"\nmax_retries = 7").unwrap();

        let config = DashboardConfig::from_file(&path).unwrap();
        assert_eq!(config.api_base, "http://forms.internal");
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.ws_base, DEFAULT_WS_BASE);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_from_file_missing() {
        let err = DashboardConfig::from_file("/nonexistent/formpulse.toml").unwrap_err();
        assert!(matches!(err, DashboardError::FileError(_)));
    }

    #[test]
    fn test_listen_addr() {
        assert!(DashboardConfig::default().listen_addr().is_ok());
        let config = DashboardConfig::builder().listen_addr("nope").build();
        assert!(config.listen_addr().is_err());
    }
}
