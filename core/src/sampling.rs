//! Two-snapshot sampling and cooperative cancellation.
//!
//! Every utilization figure in fanwhy comes from the same pattern: read a
//! cumulative counter, pause for the sampling window, read it again.
//! [`CounterPair::capture`] is the single implementation of that pattern.

use crate::SensorError;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Shared flag that asks a running session to stop.
///
/// Clones observe the same flag, so one clone can be handed to a signal
/// handler while another is polled by the sampling loop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// A way to wait between two snapshots.
pub trait Pause {
    /// Wait for `duration`.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Interrupted`] if the wait was cut short.
    fn pause(&self, duration: Duration) -> Result<(), SensorError>;
}

/// Sleeps on the current thread, waking periodically to honour a [`CancelToken`].
#[derive(Debug, Clone)]
pub struct SleepPause {
    cancel: CancelToken,
    slice: Duration,
}

impl SleepPause {
    /// Longest uninterrupted sleep; bounds the latency of cancellation.
    pub const SLICE: Duration = Duration::from_millis(50);

    /// Create a pause that stops early once `cancel` is tripped.
    #[must_use]
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            slice: Self::SLICE,
        }
    }
}

impl Pause for SleepPause {
    fn pause(&self, duration: Duration) -> Result<(), SensorError> {
        // A duration past the end of the clock never elapses; only cancellation ends it.
        let deadline = Instant::now().checked_add(duration);
        loop {
            if self.cancel.is_cancelled() {
                log::debug!("pause interrupted by cancellation");
                return Err(SensorError::Interrupted);
            }
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => self.slice,
            };
            if remaining.is_zero() {
                return Ok(());
            }
            thread::sleep(remaining.min(self.slice));
        }
    }
}

/// Returns immediately. Useful when the caller has already waited.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPause;

impl Pause for NoPause {
    fn pause(&self, _duration: Duration) -> Result<(), SensorError> {
        Ok(())
    }
}

/// Two readings of the same cumulative counters taken `interval` apart.
///
/// The interval is what the caller asked to wait; elapsed wall-clock time is
/// not re-measured.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterPair<T> {
    /// Reading taken first.
    pub before: T,
    /// Reading taken after the pause.
    pub after: T,
    /// Requested time between the two readings.
    pub interval: Duration,
}

impl<T> CounterPair<T> {
    /// Build a pair from readings obtained elsewhere.
    #[must_use]
    pub fn new(before: T, after: T, interval: Duration) -> Self {
        Self {
            before,
            after,
            interval,
        }
    }

    /// Read, pause for `interval`, read again.
    ///
    /// # Errors
    ///
    /// Propagates the first failing read, or [`SensorError::Interrupted`]
    /// when the pause is cancelled. No partial pair is ever returned.
    pub fn capture<F>(mut read: F, interval: Duration, pause: &dyn Pause) -> Result<Self, SensorError>
    where
        F: FnMut() -> Result<T, SensorError>,
    {
        let before = read()?;
        pause.pause(interval)?;
        let after = read()?;
        Ok(Self::new(before, after, interval))
    }

    /// Project both readings through `f`, keeping the interval.
    #[must_use]
    pub fn map<U, F>(&self, f: F) -> CounterPair<U>
    where
        F: Fn(&T) -> U,
    {
        CounterPair::new(f(&self.before), f(&self.after), self.interval)
    }
}
