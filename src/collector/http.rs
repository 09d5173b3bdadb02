//! HTTP endpoint probe collector.
//!
//! Issues a GET request and records the response status and latency.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::collector::{Collector, CollectorError};
use crate::storage::ObservationValue;

/// Configuration for HTTP probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Target URL (http or https).
    pub url: String,
    /// Status code that counts as success. Any status is accepted when unset.
    #[serde(default)]
    pub expected_status: Option<u16>,
}

impl HttpConfig {
    /// Create a new HTTP probe configuration.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            expected_status: None,
        }
    }

    /// Require a specific status code.
    pub fn with_expected_status(mut self, status: u16) -> Self {
        self.expected_status = Some(status);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(format!("url must start with http:// or https://: '{}'", self.url));
        }
        if let Some(status) = self.expected_status
            && !(100..=599).contains(&status)
        {
            return Err(format!("expected_status out of range: {status}"));
        }
        Ok(())
    }
}

/// HTTP endpoint probe collector.
///
/// Produces `{"status": <code>, "latency_ms": <ms>}`.
#[derive(Debug)]
pub struct HttpCollector {
    config: HttpConfig,
    client: Client,
}

impl HttpCollector {
    /// Create a new HTTP collector.
    ///
    /// `timeout` bounds the request at the client level as well, so the
    /// connection is torn down even if the sampler abandons the job.
    pub fn new(config: HttpConfig, timeout: Duration) -> Result<Self, CollectorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollectorError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }
}

#[async_trait::async_trait]
impl Collector for HttpCollector {
    fn kind(&self) -> &str {
        "http"
    }

    async fn collect(&self) -> Result<ObservationValue, CollectorError> {
        let start = Instant::now();
        let response = self.client.get(&self.config.url).send().await?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        let status = response.status().as_u16();

        if let Some(expected) = self.config.expected_status
            && status != expected
        {
            return Err(CollectorError::Failed(format!(
                "unexpected status {status} (expected {expected})"
            )));
        }

        tracing::debug!(url = %self.config.url, status, latency_ms, "HTTP probe completed");
        Ok(ObservationValue::Structured(serde_json::json!({
            "status": status,
            "latency_ms": latency_ms,
        })))
    }
}
