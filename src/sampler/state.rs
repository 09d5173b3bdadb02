//! Shared sampler status.
//!
//! [`SamplerState`] is owned by a [`StateHandle`]; the tick loop, job tasks,
//! the lifecycle controller and HTTP handlers all hold clones of the same
//! handle and go through its lock.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use strum_macros::{AsRefStr, Display};

/// Classification of a failed job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FailureKind {
    /// The collector did not finish within the job timeout.
    Timeout,
    /// The collector returned an error.
    Collection,
    /// The observation could not be appended to storage.
    Write,
}

/// A recorded job failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleFailure {
    /// Job name.
    pub job: String,
    /// Failure classification.
    pub kind: FailureKind,
    /// Human-readable cause.
    pub message: String,
    /// When the failure was recorded.
    pub at: DateTime<Utc>,
}

impl SampleFailure {
    pub fn new(job: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            kind,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

/// Per-job counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobStatus {
    /// Runs launched.
    pub runs: u64,
    /// Runs that produced a stored observation.
    pub successes: u64,
    /// Runs that failed.
    pub failures: u64,
    /// Due slots not run because the job was still in flight or the loop fell behind.
    pub missed: u64,
    /// Whether a run is currently in flight.
    pub in_flight: bool,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<SampleFailure>,
}

/// Snapshot of sampler status.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SamplerState {
    /// Whether the tick loop is running.
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    /// Wall-clock time of the most recent tick.
    pub last_tick_at: Option<DateTime<Utc>>,
    /// Ticks processed since the last start.
    pub ticks: u64,
    /// Most recent failure across all jobs.
    pub last_error: Option<SampleFailure>,
    /// Per-job status keyed by job name.
    pub jobs: BTreeMap<String, JobStatus>,
}

/// Cloneable, lock-guarded owner of [`SamplerState`].
#[derive(Debug, Clone, Default)]
pub struct StateHandle {
    inner: Arc<Mutex<SamplerState>>,
}

impl StateHandle {
    /// Create a handle with an entry for each job name.
    pub fn new<I, S>(jobs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state = SamplerState {
            jobs: jobs
                .into_iter()
                .map(|name| (name.into(), JobStatus::default()))
                .collect(),
            ..SamplerState::default()
        };
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> SamplerState {
        self.inner.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }

    /// Status of a single job.
    pub fn job(&self, name: &str) -> Option<JobStatus> {
        self.inner.lock().jobs.get(name).cloned()
    }

    pub(crate) fn mark_started(&self) {
        let mut state = self.inner.lock();
        state.running = true;
        state.started_at = Some(Utc::now());
        state.ticks = 0;
    }

    pub(crate) fn mark_stopped(&self) {
        let mut state = self.inner.lock();
        state.running = false;
        for job in state.jobs.values_mut() {
            job.in_flight = false;
        }
    }

    pub(crate) fn record_tick(&self, at: DateTime<Utc>) {
        let mut state = self.inner.lock();
        state.ticks += 1;
        state.last_tick_at = Some(at);
    }

    pub(crate) fn record_launch(&self, job: &str) {
        let mut state = self.inner.lock();
        let status = state.jobs.entry(job.to_string()).or_default();
        status.runs += 1;
        status.in_flight = true;
    }

    pub(crate) fn record_missed(&self, job: &str, slots: u32) {
        if slots == 0 {
            return;
        }
        let mut state = self.inner.lock();
        state.jobs.entry(job.to_string()).or_default().missed += u64::from(slots);
    }

    pub(crate) fn record_success(&self, job: &str, at: DateTime<Utc>) {
        let mut state = self.inner.lock();
        let status = state.jobs.entry(job.to_string()).or_default();
        status.successes += 1;
        status.in_flight = false;
        status.last_success_at = Some(at);
    }

    pub(crate) fn record_failure(&self, failure: SampleFailure) {
        let mut state = self.inner.lock();
        let status = state.jobs.entry(failure.job.clone()).or_default();
        status.failures += 1;
        status.in_flight = false;
        status.last_error = Some(failure.clone());
        state.last_error = Some(failure);
    }
}
