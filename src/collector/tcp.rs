//! TCP port probe collector.
//!
//! Measures TCP connection latency to a target address.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;

use crate::collector::{Collector, CollectorError};
use crate::storage::ObservationValue;

/// Configuration for TCP port probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Target host (IP address or hostname).
    pub host: String,
    /// Target port.
    pub port: u16,
}

impl TcpConfig {
    /// Create a new TCP probe configuration.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("host cannot be empty".to_string());
        }
        if self.port == 0 {
            return Err("port must be non-zero".to_string());
        }
        Ok(())
    }

    /// `host:port` target string.
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// TCP port probe collector.
///
/// Reports connect latency in milliseconds. A refused or unreachable
/// target is a collection error.
#[derive(Debug)]
pub struct TcpCollector {
    target: String,
}

impl TcpCollector {
    /// Create a new TCP collector.
    pub fn new(config: &TcpConfig) -> Self {
        Self {
            target: config.target(),
        }
    }
}

#[async_trait::async_trait]
impl Collector for TcpCollector {
    fn kind(&self) -> &str {
        "tcp"
    }

    async fn collect(&self) -> Result<ObservationValue, CollectorError> {
        let start = Instant::now();
        let stream = TcpStream::connect(&self.target).await?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        drop(stream);

        tracing::debug!(target = %self.target, latency_ms, "TCP probe successful");
        Ok(ObservationValue::Number(latency_ms))
    }
}
