//! CPU counters and usage calculations for fanwhy.
//!
//! This crate reads whole-system counters from `/proc/stat` and per-process
//! counters from `/proc/<pid>/stat`, then turns two snapshots of either into
//! usage percentages.
//!
//! # Examples
//!
//! ```rust
//! use fanwhy_cpu::{system_usage, ProcStatReader, SystemCounterReader};
//! use fanwhy_core::{CounterPair, SleepPause, CancelToken};
//! use std::time::Duration;
//!
//! # if std::path::Path::new("/proc/stat").exists() {
//! let reader = ProcStatReader::new();
//! let pause = SleepPause::new(CancelToken::new());
//! let pair = CounterPair::capture(|| reader.read(), Duration::from_millis(100), &pause)?;
//! println!("CPU usage: {:.1}%", system_usage(&pair));
//! # }
//! # Ok::<(), fanwhy_core::SensorError>(())
//! ```

pub mod cpu;
pub mod process;
pub mod usage;

pub use cpu::{CpuCounters, ProcStatReader, SystemCounterReader};
pub use process::{
    parse_status_uid, ProcFsReader, ProcessCounterReader, ProcessSample, StatRecord, SystemUsers, UserLookup,
};
pub use usage::{
    delta_percent, process_usage, process_usages, system_usage, ticks_per_second, top_n, ProcessUsage,
    FALLBACK_TICKS_PER_SECOND,
};
