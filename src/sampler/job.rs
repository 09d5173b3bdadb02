//! Sampling job definition.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::collector::{Collector, CollectorError, CollectorSpec, clamp_interval};

/// A named collection function with its cadence and timeout.
#[derive(Clone)]
pub struct SampleJob {
    name: String,
    interval: Duration,
    timeout: Duration,
    collector: Arc<dyn Collector>,
}

impl SampleJob {
    /// Create a job. The interval is clamped to the collector minimum and a
    /// zero timeout falls back to the interval.
    pub fn new(
        name: impl Into<String>,
        interval: Duration,
        timeout: Duration,
        collector: Arc<dyn Collector>,
    ) -> Self {
        let interval = clamp_interval(interval);
        let timeout = if timeout.is_zero() { interval } else { timeout };
        Self {
            name: name.into(),
            interval,
            timeout,
            collector,
        }
    }

    /// Build a job from a built-in collector description.
    pub fn from_spec(
        name: impl Into<String>,
        interval: Duration,
        timeout: Duration,
        spec: &CollectorSpec,
    ) -> Result<Self, CollectorError> {
        let collector = spec.build(timeout)?;
        Ok(Self::new(name, interval, timeout, collector))
    }

    /// Source label stamped on every observation this job produces.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn collector(&self) -> &Arc<dyn Collector> {
        &self.collector
    }
}

impl fmt::Debug for SampleJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleJob")
            .field("name", &self.name)
            .field("kind", &self.collector.kind())
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .finish()
    }
}
