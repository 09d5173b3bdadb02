//! Core collector traits and types.

use std::time::Duration;

use thiserror::Error;

use crate::storage::ObservationValue;

/// Minimum allowed job interval.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Errors that can occur during collection.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// I/O error (socket connect, process spawn).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Timeout elapsed.
    #[error("timeout elapsed after {0:?}")]
    Timeout(Duration),

    /// The probe ran but its result is unusable (bad exit code, unexpected status, unparsable output).
    #[error("collection failed: {0}")]
    Failed(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),
}

/// Core collector trait for implementing collection functions.
///
/// A collector measures one thing and returns the value; the sampler owns
/// scheduling, timeouts, timestamps and persistence.
///
/// # Error Handling
///
/// Returning `Err` means no observation is recorded for this run. The
/// sampler records the failure and the job runs again at its next due time.
#[async_trait::async_trait]
pub trait Collector: Send + Sync + 'static {
    /// Short collector kind (e.g., "tcp", "http").
    fn kind(&self) -> &str;

    /// Perform one measurement.
    async fn collect(&self) -> Result<ObservationValue, CollectorError>;
}

/// Clamp an interval to [`MIN_INTERVAL`].
pub fn clamp_interval(interval: Duration) -> Duration {
    if interval < MIN_INTERVAL {
        tracing::warn!(min_interval = ?MIN_INTERVAL, requested = ?interval,
            "Interval duration is less than minimum allowed. Using minimum duration."
        );
        MIN_INTERVAL
    } else {
        interval
    }
}
