//! Drift-free scheduling arithmetic.
//!
//! All deadlines are computed from a fixed origin: tick `n` fires at
//! `origin + n * resolution`, and a job's next due time is
//! `previous due + interval`. A slow tick therefore never shifts the
//! schedule; it only causes slots to be skipped.

use std::time::Duration;

use tokio::time::Instant;

/// Smallest base tick resolution.
pub const MIN_RESOLUTION: Duration = Duration::from_millis(10);

/// Resolution used when no jobs are configured.
pub const DEFAULT_RESOLUTION: Duration = Duration::from_secs(1);

/// Base resolution for a set of cadences: their greatest common divisor
/// (millisecond granularity), never below [`MIN_RESOLUTION`].
pub fn base_resolution<I>(intervals: I) -> Duration
where
    I: IntoIterator<Item = Duration>,
{
    let gcd_ms = intervals
        .into_iter()
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .filter(|ms| *ms > 0)
        .reduce(gcd);

    match gcd_ms {
        Some(ms) => Duration::from_millis(ms).max(MIN_RESOLUTION),
        None => DEFAULT_RESOLUTION,
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Jump from grid point `next` (already at or before `now`) to the first grid
/// point strictly after `now`. Also returns how many grid points were passed.
fn skip_past(next: Instant, step: Duration, now: Instant) -> (Instant, u32) {
    let behind = (now - next).as_nanos();
    let step_nanos = step.as_nanos().max(1);
    let skipped = u32::try_from(behind / step_nanos + 1).unwrap_or(u32::MAX);
    let into_slot = u64::try_from(behind % step_nanos).unwrap_or(0);
    (now + step - Duration::from_nanos(into_slot), skipped)
}

/// The single logical timer driving the tick loop.
///
/// Only the current deadline is kept; each advance moves it by whole
/// resolutions, so it stays on the `origin + n * resolution` grid however
/// long the process runs.
#[derive(Debug, Clone)]
pub struct Ticker {
    resolution: Duration,
    deadline: Instant,
}

impl Ticker {
    /// Create a ticker whose tick 0 is at `origin`.
    pub fn new(origin: Instant, resolution: Duration) -> Self {
        Self {
            resolution: resolution.max(MIN_RESOLUTION),
            deadline: origin,
        }
    }

    /// Tick resolution.
    pub fn resolution(&self) -> Duration {
        self.resolution
    }

    /// Deadline of the current tick.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Advance to the first tick strictly after `now` and return its deadline.
    ///
    /// Returns the number of grid slots that were skipped because `now` had
    /// already passed them.
    pub fn advance(&mut self, now: Instant) -> (Instant, u32) {
        let next = self.deadline + self.resolution;
        if next > now {
            self.deadline = next;
            return (next, 0);
        }

        let (deadline, skipped) = skip_past(next, self.resolution, now);
        self.deadline = deadline;
        (deadline, skipped)
    }
}

/// Result of polling a [`JobClock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Due {
    /// Not due yet.
    NotYet,
    /// Due; `scheduled` is the slot being served, `skipped` counts earlier
    /// slots that were already in the past and will not be run.
    Run { scheduled: Instant, skipped: u32 },
}

/// Per-job due-time tracking.
#[derive(Debug, Clone)]
pub struct JobClock {
    interval: Duration,
    next_due: Instant,
}

impl JobClock {
    /// First due time is `origin`.
    pub fn new(origin: Instant, interval: Duration) -> Self {
        Self {
            interval,
            next_due: origin,
        }
    }

    /// Next due time.
    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    /// Check whether the job is due at `now`, advancing the clock if so.
    pub fn poll(&mut self, now: Instant) -> Due {
        if now < self.next_due {
            return Due::NotYet;
        }

        let scheduled = self.next_due;
        self.next_due = scheduled + self.interval;

        let mut skipped = 0;
        if self.next_due <= now {
            (self.next_due, skipped) = skip_past(self.next_due, self.interval, now);
        }

        Due::Run { scheduled, skipped }
    }
}
