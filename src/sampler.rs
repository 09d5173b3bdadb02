//! Sampler
//!
//! A single background loop that wakes on a fixed tick grid, runs every due
//! [`SampleJob`] under its timeout, and appends the results to storage.
//!
//! # Architecture
//!
//! - [`Lifecycle`]: owns storage and the loop; idempotent `init`/`start`/`stop`
//! - [`SampleJob`]: a named collector with interval and timeout
//! - [`StateHandle`]: lock-guarded [`SamplerState`] shared with readers
//! - [`Ticker`] / [`JobClock`]: absolute-deadline scheduling
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use cadence::collector::{CollectorSpec, TcpConfig};
//! use cadence::sampler::{Lifecycle, SampleJob, SamplerSettings};
//! use cadence::storage::StorageBuilder;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let job = SampleJob::from_spec(
//!     "local.redis",
//!     Duration::from_secs(10),
//!     Duration::from_secs(2),
//!     &CollectorSpec::Tcp(TcpConfig::new("127.0.0.1", 6379)),
//! )?;
//! let lifecycle = Lifecycle::new(
//!     StorageBuilder::new("data/cadence.db"),
//!     vec![job],
//!     SamplerSettings::default(),
//! );
//!
//! lifecycle.init().await?;
//! lifecycle.start().await?;
//! // ...
//! lifecycle.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod clock;
mod job;
mod lifecycle;
mod runner;
mod state;

pub use clock::{DEFAULT_RESOLUTION, Due, JobClock, MIN_RESOLUTION, Ticker, base_resolution};
pub use job::SampleJob;
pub use lifecycle::{DEFAULT_STOP_TIMEOUT, Lifecycle, LifecycleError, SamplerSettings};
pub use runner::{RETENTION_SWEEP_INTERVAL, run_job};
pub use state::{FailureKind, JobStatus, SampleFailure, SamplerState, StateHandle};
