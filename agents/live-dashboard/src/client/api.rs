//! Forms API client
//!
//! Features:
//! - Async, non-blocking requests
//! - Retry with exponential backoff for idempotent reads
//! - Submissions gated on required fields and sent exactly once
//! - Stored forms decoded leniently: a bad field is logged and skipped
//!
//! A duplicated `POST /api/responses` would be counted twice by every
//! dashboard, so [`FormApiClient::submit_response`] never retries.

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{DashboardError, Result};
use formpulse_core::{
    answer_list, require_complete, AnalyticsSummary, Answer, AnswerMap, ExportRow, Form, EXPORT_HEADER,
};

/// Configuration for the forms API client
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL of the forms API
    pub base_url: String,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,

    /// Maximum retry attempts for reads
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    pub max_backoff_ms: u64,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_ms: 5000,
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }
}

impl From<&crate::config::DashboardConfig> for ApiClientConfig {
    fn from(config: &crate::config::DashboardConfig) -> Self {
        Self {
            base_url: config.api_base.clone(),
            timeout_ms: config.timeout_ms,
            max_retries: config.max_retries,
            initial_backoff_ms: config.initial_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
            backoff_multiplier: config.backoff_multiplier,
        }
    }
}

/// Body of `POST /api/responses`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub form_id: String,
    pub answers: Vec<Answer>,
}

/// HTTP client for the forms API
pub struct FormApiClient {
    client: Client,
    config: ApiClientConfig,
}

impl FormApiClient {
    /// Create a client with default retry settings
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> Result<Self> {
        let config = ApiClientConfig {
            base_url: base_url.into(),
            timeout_ms,
            ..Default::default()
        };
        Self::with_config(config)
    }

    pub fn with_config(config: ApiClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DashboardError::InternalError(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(Self {
            client,
            config: ApiClientConfig { base_url, ..config },
        })
    }

    /// `GET /api/forms/{id}`
    ///
    /// The API stores forms without checking them, so fields that fail
    /// schema checks are dropped with a warning instead of failing the fetch.
    /// Answers for dropped fields are still counted as plain values.
    pub async fn fetch_form(&self, form_id: &str) -> Result<Form> {
        let url = format!("{}/api/forms/{}", self.config.base_url, form_id);
        let raw: serde_json::Value = self.with_retry("fetch_form", || self.get_json(&url)).await?;
        let (form, errors) = Form::from_value_lenient(raw)
            .map_err(|e| DashboardError::parse_error(format!("Failed to parse form from {}: {}", url, e)))?;
        for error in &errors {
            tracing::warn!(form_id, field_id = error.field_id().unwrap_or("-"), error = %error, "Skipping invalid field");
        }
        tracing::debug!(
            form_id,
            fields = form.fields.len(),
            skipped = errors.len(),
            status = %form.status,
            "Fetched form"
        );
        Ok(form)
    }

    /// `GET /api/forms/{id}/export`, one row per answer
    pub async fn export_responses(&self, form_id: &str) -> Result<Vec<ExportRow>> {
        let url = format!("{}/api/forms/{}/export", self.config.base_url, form_id);
        let body = self.with_retry("export_responses", || self.get_text(&url)).await?;
        let rows = parse_export(&body)?;
        tracing::debug!(form_id, rows = rows.len(), "Fetched response export");
        Ok(rows)
    }

    /// `GET /api/analytics/{id}/summary`
    pub async fn fetch_summary(&self, form_id: &str) -> Result<AnalyticsSummary> {
        let url = format!("{}/api/analytics/{}/summary", self.config.base_url, form_id);
        let summary: AnalyticsSummary = self.with_retry("fetch_summary", || self.get_json(&url)).await?;
        tracing::debug!(form_id, fields = summary.buckets.len(), "Fetched analytics summary");
        Ok(summary)
    }

    /// `POST /api/responses`, after checking every required field is filled
    ///
    /// Sent once; a transport failure is returned to the caller rather than
    /// retried.
    pub async fn submit_response(&self, form: &Form, answers: &AnswerMap) -> Result<()> {
        require_complete(&form.fields, answers)?;
        let form_id = form
            .id
            .clone()
            .ok_or_else(|| DashboardError::invalid_input("Form has no id; it was never saved"))?;

        let url = format!("{}/api/responses", self.config.base_url);
        let body = SubmitRequest {
            form_id,
            answers: answer_list(answers),
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if status.is_success() {
            tracing::info!(form_id = %body.form_id, answers = body.answers.len(), "Response submitted");
            Ok(())
        } else {
            Err(status_error(status, response).await)
        }
    }

    /// `GET /api/health`
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/health", self.config.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    let body = response.text().await.unwrap_or_default();
                    let body = body.trim().trim_matches('"');
                    Ok(body.eq_ignore_ascii_case("ok") || body.eq_ignore_ascii_case("healthy"))
                } else {
                    Ok(false)
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Health check failed");
                Ok(false)
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }
        response
            .json()
            .await
            .map_err(|e| DashboardError::parse_error(format!("Failed to parse response from {}: {}", url, e)))
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }
        Ok(response.text().await?)
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut request: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff_ms = self.config.initial_backoff_ms;
        let mut attempt = 0;

        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_permanent() || attempt >= self.config.max_retries => {
                    tracing::warn!(operation, attempt, error = %e, "Request failed");
                    return Err(e);
                }
                Err(e) => {
                    tracing::debug!(operation, attempt, backoff_ms, error = %e, "Retrying request");
                    sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = ((backoff_ms as f64 * self.config.backoff_multiplier) as u64)
                        .min(self.config.max_backoff_ms);
                    attempt += 1;
                }
            }
        }
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn timeout_ms(&self) -> u64 {
        self.config.timeout_ms
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}

async fn status_error(status: StatusCode, response: reqwest::Response) -> DashboardError {
    let body = response.text().await.unwrap_or_default();
    DashboardError::ApiStatus {
        status: status.as_u16(),
        body: body.trim().to_string(),
    }
}

/// Decode an export body; the header row must match [`EXPORT_HEADER`]
pub fn parse_export(body: &str) -> Result<Vec<ExportRow>> {
    let mut reader = csv::Reader::from_reader(body.as_bytes());
    let headers = reader.headers()?;
    if headers.iter().ne(EXPORT_HEADER.iter().copied()) {
        return Err(DashboardError::parse_error(format!(
            "Unexpected export header: {}",
            headers.iter().collect::<Vec<_>>().join(",")
        )));
    }
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<ExportRow>, _>>()
        .map_err(DashboardError::from)
}

/// Builder for FormApiClient
pub struct FormApiClientBuilder {
    config: ApiClientConfig,
}

impl FormApiClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ApiClientConfig::default(),
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
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

    pub fn max_backoff_ms(mut self, backoff: u64) -> Self {
        self.config.max_backoff_ms = backoff;
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.config.backoff_multiplier = multiplier;
        self
    }

    pub fn build(self) -> Result<FormApiClient> {
        FormApiClient::with_config(self.config)
    }
}

impl Default for FormApiClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formpulse_core::AnswerValue;

    #[test]
    fn test_client_config_default() {
        let config = ApiClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.backoff_multiplier, 2.0);
    }

    #[test]
    fn test_client_builder() {
        let client = FormApiClientBuilder::new()
            .base_url("http://forms:9090/")
            .timeout_ms(10000)
            .max_retries(5)
            .initial_backoff_ms(200)
            .max_backoff_ms(10000)
            .backoff_multiplier(1.5)
            .build()
            .unwrap();

        assert_eq!(client.base_url(), "http://forms:9090");
        assert_eq!(client.timeout_ms(), 10000);
        assert_eq!(client.max_retries(), 5);
    }

    #[test]
    fn test_parse_export() {
        let body = "submittedAt,fieldId,value\n\
                    2024-03-01T10:00:00Z,q1,Very\n\
                    2024-03-01T10:00:00Z,q2,\"Docs|API, \"\"beta\"\"\"\n";
        let rows = parse_export(body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].field_id, "q1");
        assert_eq!(rows[1].value, "Docs|API, \"beta\"");

        assert!(parse_export("submittedAt,fieldId,value\n").unwrap().is_empty());
        assert!(matches!(
            parse_export("when,field,value\nx,q1,a\n"),
            Err(DashboardError::ParseError(_))
        ));
    }

    #[test]
    fn test_submit_request_wire_shape() {
        let mut answers = AnswerMap::new();
        answers.insert("q1".to_string(), AnswerValue::from("Very"));
        let body = SubmitRequest {
            form_id: "f1".to_string(),
            answers: answer_list(&answers),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"formId": "f1", "answers": [{"fieldId": "q1", "value": "Very"}]})
        );
    }
}
