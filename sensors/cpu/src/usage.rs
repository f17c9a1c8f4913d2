//! Usage percentages derived from two counter snapshots.
//!
//! System-wide usage is clamped to `[0, 100]`. Per-process usage is only
//! floored at zero: a process running on several cores accrues more than one
//! second of CPU time per second and legitimately reports above 100%.

use crate::cpu::CpuCounters;
use crate::process::ProcessSample;
use fanwhy_core::CounterPair;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Ticks per second assumed when the OS cannot be asked.
///
/// 100 is the value Linux has exported to userspace on every mainstream
/// architecture; it is a portability fallback, not a measurement.
pub const FALLBACK_TICKS_PER_SECOND: u64 = 100;

/// The platform's clock-tick rate (`sysconf(_SC_CLK_TCK)`).
#[must_use]
pub fn ticks_per_second() -> u64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf only reads a process-wide constant.
        let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        if let Ok(ticks) = u64::try_from(ticks) {
            if ticks > 0 {
                return ticks;
            }
        }
    }
    log::debug!("clock tick rate unavailable, assuming {FALLBACK_TICKS_PER_SECOND}");
    FALLBACK_TICKS_PER_SECOND
}

/// Percentage of `span` covered by `busy`, floored at zero and optionally capped.
///
/// A zero or non-finite span yields exactly `0.0`.
#[must_use]
pub fn delta_percent(busy: f64, span: f64, ceiling: Option<f64>) -> f64 {
    if span == 0.0 || !span.is_finite() {
        return 0.0;
    }
    let percent = (busy / span * 100.0).max(0.0);
    match ceiling {
        Some(ceiling) => percent.min(ceiling),
        None => percent,
    }
}

/// Signed difference of two cumulative counters.
fn counter_delta(before: u64, after: u64) -> f64 {
    (i128::from(after) - i128::from(before)) as f64
}

impl CpuCounters {
    /// Busy share of all CPU time elapsed since `earlier`, in `[0, 100]`.
    ///
    /// Frozen counters (no elapsed ticks) report `0.0`.
    #[must_use]
    pub fn usage_percent(&self, earlier: &Self) -> f64 {
        let total = counter_delta(earlier.total(), self.total());
        let idle = counter_delta(earlier.idle, self.idle);
        delta_percent(total - idle, total, Some(100.0))
    }
}

/// System-wide CPU usage over a captured pair.
#[must_use]
pub fn system_usage(pair: &CounterPair<CpuCounters>) -> f64 {
    pair.after.usage_percent(&pair.before)
}

/// CPU usage of one process between two tick readings.
///
/// Not capped at 100%.
#[must_use]
pub fn process_usage(before_ticks: u64, after_ticks: u64, ticks_per_second: u64, interval: Duration) -> f64 {
    let seconds = counter_delta(before_ticks, after_ticks) / ticks_per_second.max(1) as f64;
    delta_percent(seconds, interval.as_secs_f64(), None)
}

/// A process with the CPU share it used over one sampling interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessUsage {
    /// Process id.
    pub pid: u32,
    /// Command name.
    pub name: String,
    /// Owning user name, or the numeric uid.
    pub user: String,
    /// Percent of one core; may exceed 100.
    pub cpu_percent: f64,
}

impl ProcessUsage {
    /// Attach a usage figure to a sample's identity.
    #[must_use]
    pub fn from_sample(sample: ProcessSample, cpu_percent: f64) -> Self {
        Self {
            pid: sample.pid,
            name: sample.name,
            user: sample.user,
            cpu_percent,
        }
    }
}

/// Per-process usage for every process in the second snapshot.
///
/// Processes without a baseline in the first snapshot count from zero ticks,
/// so their whole lifetime is attributed to this interval. Processes that
/// exited before the second snapshot are dropped. Output keeps the second
/// snapshot's enumeration order.
#[must_use]
pub fn process_usages(pair: &CounterPair<Vec<ProcessSample>>, ticks_per_second: u64) -> Vec<ProcessUsage> {
    let baseline: HashMap<u32, u64> = pair
        .before
        .iter()
        .map(|sample| (sample.pid, sample.cpu_ticks))
        .collect();

    pair.after
        .iter()
        .map(|sample| {
            let before = baseline.get(&sample.pid).copied().unwrap_or(0);
            let percent = process_usage(before, sample.cpu_ticks, ticks_per_second, pair.interval);
            ProcessUsage::from_sample(sample.clone(), percent)
        })
        .collect()
}

/// The `n` busiest processes, highest first.
///
/// The sort is stable, so equal percentages keep their input order.
#[must_use]
pub fn top_n(mut usages: Vec<ProcessUsage>, n: usize) -> Vec<ProcessUsage> {
    usages.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent));
    usages.truncate(n);
    usages
}
