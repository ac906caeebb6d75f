//! Wall-clock measurement around external work.
//!
//! [`ProcessingTimer`] is a guard: once started it records its elapsed time
//! into a [`TimingSlot`] exactly once, either through [`ProcessingTimer::stop`]
//! or when it is dropped. Dropping covers early returns, `?`, unwinding and a
//! cancelled future, so a duration is always available afterwards.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::error::Elapsed;
use tokio::time::Instant;
use tracing::debug;

/// Shared cell the timer writes its final duration into.
#[derive(Debug, Clone, Default)]
pub struct TimingSlot(Arc<Mutex<Option<Duration>>>);

impl TimingSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn duration(&self) -> Option<Duration> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Recorded duration in seconds, 0.0 when nothing was recorded.
    pub fn seconds(&self) -> f64 {
        self.duration().map(|d| d.as_secs_f64()).unwrap_or(0.0)
    }

    fn set(&self, duration: Duration) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(duration);
    }
}

pub struct ProcessingTimer {
    label: &'static str,
    started: Instant,
    slot: TimingSlot,
    recorded: bool,
}

impl ProcessingTimer {
    pub fn start(label: &'static str) -> Self {
        Self::start_into(label, TimingSlot::new())
    }

    /// Start a timer that reports into a slot the caller already holds.
    pub fn start_into(label: &'static str, slot: TimingSlot) -> Self {
        Self {
            label,
            started: Instant::now(),
            slot,
            recorded: false,
        }
    }

    pub fn slot(&self) -> TimingSlot {
        self.slot.clone()
    }

    pub fn stop(mut self) -> Duration {
        self.record()
    }

    fn record(&mut self) -> Duration {
        let elapsed = self.started.elapsed();
        if !self.recorded {
            self.recorded = true;
            self.slot.set(elapsed);
            debug!("{} took {:.2}s", self.label, elapsed.as_secs_f64());
        }
        elapsed
    }
}

impl Drop for ProcessingTimer {
    fn drop(&mut self) {
        if !self.recorded {
            self.record();
        }
    }
}

/// Output of a measured unit of work together with how long it ran.
#[derive(Debug, Clone)]
pub struct Timed<T> {
    pub output: T,
    pub duration: Duration,
}

impl<T> Timed<T> {
    pub fn seconds(&self) -> f64 {
        self.duration.as_secs_f64()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Timed<U> {
        Timed {
            output: f(self.output),
            duration: self.duration,
        }
    }
}

/// Run `work` to completion and report its duration whatever it returned.
pub async fn measure<F>(work: F) -> Timed<F::Output>
where
    F: Future,
{
    let timer = ProcessingTimer::start("query processing");
    let output = work.await;
    let duration = timer.stop();
    Timed { output, duration }
}

/// Like [`measure`], but cancels `work` after `limit`.
///
/// On timeout the output is `Err(Elapsed)` and `duration` holds the time
/// spent before cancellation.
pub async fn measure_with_timeout<F>(work: F, limit: Duration) -> Timed<Result<F::Output, Elapsed>>
where
    F: Future,
{
    measure(tokio::time::timeout(limit, work)).await
}
