//! Collector Layer
//!
//! Collection functions invoked by the sampler. A collector only measures;
//! the sampler decides when it runs, bounds it with a timeout, stamps the
//! result and appends it to storage.
//!
//! # Architecture
//!
//! - [`Collector`]: Core trait for implementing collection functions
//! - [`CollectorSpec`]: Serializable description of a built-in collector
//! - [`TcpCollector`], [`HttpCollector`], [`CommandCollector`]: built-ins
//!
//! # Example
//!
//! ```rust
//! use cadence::collector::{CollectorSpec, TcpConfig};
//! use std::time::Duration;
//!
//! let spec = CollectorSpec::Tcp(TcpConfig::new("127.0.0.1", 6379));
//! let collector = spec.build(Duration::from_secs(1)).unwrap();
//! assert_eq!(collector.kind(), "tcp");
//! ```

mod command;
mod http;
mod tcp;
mod traits;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use command::{CommandCollector, CommandConfig};
pub use http::{HttpCollector, HttpConfig};
pub use tcp::{TcpCollector, TcpConfig};
pub use traits::{Collector, CollectorError, MIN_INTERVAL, clamp_interval};

/// Built-in collector selected by the `kind` field in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CollectorSpec {
    /// TCP connect latency.
    Tcp(TcpConfig),
    /// HTTP GET status and latency.
    Http(HttpConfig),
    /// External command output.
    Command(CommandConfig),
}

impl CollectorSpec {
    /// Collector kind name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tcp(_) => "tcp",
            Self::Http(_) => "http",
            Self::Command(_) => "command",
        }
    }

    /// Validate collector-specific settings.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Tcp(c) => c.validate(),
            Self::Http(c) => c.validate(),
            Self::Command(c) => c.validate(),
        }
    }

    /// Instantiate the collector. `timeout` is the job's collection timeout.
    pub fn build(&self, timeout: Duration) -> Result<Arc<dyn Collector>, CollectorError> {
        self.validate().map_err(CollectorError::Config)?;
        let collector: Arc<dyn Collector> = match self {
            Self::Tcp(c) => Arc::new(TcpCollector::new(c)),
            Self::Http(c) => Arc::new(HttpCollector::new(c.clone(), timeout)?),
            Self::Command(c) => Arc::new(CommandCollector::new(c.clone())),
        };
        Ok(collector)
    }
}
