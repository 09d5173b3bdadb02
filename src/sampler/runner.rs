//! The sampler tick loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::sync::CancellationToken;

use crate::collector::CollectorError;
use crate::sampler::clock::{Due, JobClock, Ticker};
use crate::sampler::job::SampleJob;
use crate::sampler::state::{FailureKind, SampleFailure, StateHandle};
use crate::storage::{Observation, StorageAdmin, StorageWriter};

/// How often observations older than the retention window are pruned.
pub const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Run one job: collect within the timeout, stamp, append.
///
/// Every outcome is recorded in `state`; nothing is returned to the caller
/// so one job's failure never reaches the loop.
pub async fn run_job(job: &SampleJob, writer: &StorageWriter, state: &StateHandle) {
    let outcome = match timeout(job.timeout(), job.collector().collect()).await {
        Err(_) => Err((
            FailureKind::Timeout,
            CollectorError::Timeout(job.timeout()).to_string(),
        )),
        Ok(Err(e)) => Err((FailureKind::Collection, e.to_string())),
        Ok(Ok(value)) => {
            let observation = Observation::now(job.name(), value);
            let collected_at = observation.collected_at;
            writer
                .append(observation)
                .await
                .map(|id| (id, collected_at))
                .map_err(|e| (FailureKind::Write, e.to_string()))
        }
    };

    match outcome {
        Ok((id, collected_at)) => {
            tracing::debug!(job = %job.name(), id, "Observation stored");
            state.record_success(job.name(), collected_at);
        }
        Err((kind, message)) => {
            tracing::warn!(job = %job.name(), kind = %kind, error = %message, "Sample failed");
            state.record_failure(SampleFailure::new(job.name(), kind, message));
        }
    }
}

/// Clears a busy flag when the owning task ends, however it ends.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Marks the sampler stopped when the loop future ends, including on panic or abort.
struct RunningGuard(StateHandle);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.mark_stopped();
    }
}

struct Slot {
    job: SampleJob,
    clock: JobClock,
    busy: Arc<AtomicBool>,
}

/// Retention sweep schedule.
struct Retention {
    window: Duration,
    next_sweep: Instant,
    busy: Arc<AtomicBool>,
}

pub(crate) struct TickLoop {
    slots: Vec<Slot>,
    ticker: Ticker,
    writer: StorageWriter,
    admin: StorageAdmin,
    retention: Option<Retention>,
    state: StateHandle,
    in_flight: JoinSet<()>,
}

impl TickLoop {
    pub(crate) fn new(
        jobs: &[SampleJob],
        resolution: Duration,
        writer: StorageWriter,
        admin: StorageAdmin,
        retention: Option<Duration>,
        state: StateHandle,
    ) -> Self {
        let origin = Instant::now();
        let slots = jobs
            .iter()
            .map(|job| Slot {
                job: job.clone(),
                clock: JobClock::new(origin, job.interval()),
                busy: Arc::new(AtomicBool::new(false)),
            })
            .collect();

        Self {
            slots,
            ticker: Ticker::new(origin, resolution),
            writer,
            admin,
            retention: retention.map(|window| Retention {
                window,
                next_sweep: origin,
                busy: Arc::new(AtomicBool::new(false)),
            }),
            state,
            in_flight: JoinSet::new(),
        }
    }

    /// Run until `token` is cancelled, then wait for in-flight jobs.
    pub(crate) async fn run(mut self, token: CancellationToken) {
        let _running = RunningGuard(self.state.clone());
        tracing::info!(
            jobs = self.slots.len(),
            resolution = ?self.ticker.resolution(),
            "Sampler started"
        );

        loop {
            self.reap();
            self.run_tick(Instant::now());

            let (deadline, skipped) = self.ticker.advance(Instant::now());
            if skipped > 0 {
                tracing::warn!(skipped, "Sampler fell behind, skipping ticks");
            }

            tokio::select! {
                biased;
                () = token.cancelled() => break,
                () = sleep_until(deadline) => {}
            }
        }

        tracing::debug!(in_flight = self.in_flight.len(), "Waiting for in-flight jobs");
        while let Some(result) = self.in_flight.join_next().await {
            log_join_error(result);
        }
        tracing::info!("Sampler stopped");
    }

    /// Launch every job due at `now` that is not still running. Returns the
    /// number of jobs launched.
    pub(crate) fn run_tick(&mut self, now: Instant) -> usize {
        self.state.record_tick(Utc::now());

        let mut launched = 0;
        for slot in &mut self.slots {
            let Due::Run { skipped, .. } = slot.clock.poll(now) else {
                continue;
            };
            let name = slot.job.name();
            if skipped > 0 {
                tracing::info!(job = %name, skipped, "Missed due times");
                self.state.record_missed(name, skipped);
            }

            if slot.busy.swap(true, Ordering::AcqRel) {
                tracing::info!(job = %name, "Previous run still in flight, skipping");
                self.state.record_missed(name, 1);
                continue;
            }

            let guard = BusyGuard(Arc::clone(&slot.busy));
            self.state.record_launch(name);

            let job = slot.job.clone();
            let writer = self.writer.clone();
            let state = self.state.clone();
            self.in_flight.spawn(async move {
                let _guard = guard;
                run_job(&job, &writer, &state).await;
            });
            launched += 1;
        }

        self.maybe_sweep(now);
        launched
    }

    fn maybe_sweep(&mut self, now: Instant) {
        let Some(retention) = self.retention.as_mut() else {
            return;
        };
        if now < retention.next_sweep || retention.busy.swap(true, Ordering::AcqRel) {
            return;
        }
        retention.next_sweep = now + RETENTION_SWEEP_INTERVAL;

        let guard = BusyGuard(Arc::clone(&retention.busy));
        let window = retention.window;
        let admin = self.admin.clone();
        self.in_flight.spawn(async move {
            let _guard = guard;
            let cutoff = chrono::Duration::from_std(window)
                .ok()
                .and_then(|window| Utc::now().checked_sub_signed(window));
            let Some(cutoff) = cutoff else {
                tracing::debug!(?window, "Retention window exceeds time range, nothing to prune");
                return;
            };
            match admin.prune_before(cutoff).await {
                Ok(removed) => tracing::info!(removed, %cutoff, "Retention sweep complete"),
                Err(e) => tracing::error!(error = %e, "Retention sweep failed"),
            }
        });
    }

    /// Collect finished tasks so the set does not grow unbounded.
    fn reap(&mut self) {
        while let Some(result) = self.in_flight.try_join_next() {
            log_join_error(result);
        }
    }
}

fn log_join_error(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "Sampler task failed");
    }
}
