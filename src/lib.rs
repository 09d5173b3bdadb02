//! Cadence - periodic sampler with a durable observation store
//!
//! A single background loop samples configured collection functions on a
//! fixed cadence and appends timestamped observations to an embedded
//! SQLite store; a read-only façade serves time-range queries concurrently.
//!
//! # Architecture
//!
//! - **Storage**: single-writer actor over SQLite (WAL), pooled readers
//! - **Collectors**: TCP, HTTP and command collection functions
//! - **Sampler**: drift-free tick loop with per-job timeouts and the
//!   lifecycle controller that owns it
//! - **Query**: validated range queries over stored observations
//! - **Server**: JSON API for external readers
//!
//! # Example
//!
//! ```rust,no_run
//! use cadence::{AppConfig, Lifecycle, SourceFilter, TimeRange};
//! use futures::TryStreamExt;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load("configs/config.yaml")?;
//! let lifecycle = Lifecycle::from_config(&config)?;
//! lifecycle.init().await?;
//! lifecycle.start().await?;
//!
//! let recent: Vec<_> = lifecycle
//!     .query()?
//!     .get(&SourceFilter::Prefix("web.".into()), TimeRange::last(chrono::Duration::minutes(5)))?
//!     .try_collect()
//!     .await?;
//! println!("{} observations", recent.len());
//!
//! lifecycle.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod config;
pub mod query;
pub mod sampler;
pub mod server;
pub mod storage;

pub use collector::{Collector, CollectorError, CollectorSpec};
pub use config::{AppConfig, ConfigError};
pub use query::{QueryError, QueryFacade, SourceFilter, TimeRange};
pub use sampler::{Lifecycle, LifecycleError, SampleJob, SamplerState, StateHandle};
pub use storage::{
    Observation, ObservationReader, ObservationValue, StorageBuilder, StorageError,
    StorageHandles, StorageWriter,
};
