//! Whole-system CPU counters from `/proc/stat`.
//!
//! The first line of `/proc/stat` holds the cumulative time, in clock ticks,
//! that all CPUs together have spent in each accounting category since boot.

use fanwhy_core::SensorError;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Cumulative CPU time counters from the `cpu` line of `/proc/stat`.
///
/// All values are in "jiffies" (clock ticks). Kernels older than 2.6.24 do
/// not report `guest` and `guest_nice`; those default to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CpuCounters {
    /// Time spent in user mode (normal processes)
    pub user: u64,
    /// Time spent in user mode with low priority (nice)
    pub nice: u64,
    /// Time spent in system mode (kernel)
    pub system: u64,
    /// Time spent idle
    pub idle: u64,
    /// Time waiting for I/O to complete
    pub iowait: u64,
    /// Time servicing hardware interrupts
    pub irq: u64,
    /// Time servicing software interrupts
    pub softirq: u64,
    /// Time stolen by virtualization
    pub steal: u64,
    /// Time running a guest virtual CPU
    pub guest: u64,
    /// Time running a niced guest virtual CPU
    pub guest_nice: u64,
}

impl CpuCounters {
    /// Label token of the aggregate line.
    pub const LABEL: &'static str = "cpu";

    /// Counters every supported kernel reports.
    pub const REQUIRED_FIELDS: usize = 8;

    /// Counters read when present.
    pub const MAX_FIELDS: usize = 10;

    /// Sum of all ten categories.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.user
            .saturating_add(self.nice)
            .saturating_add(self.system)
            .saturating_add(self.idle)
            .saturating_add(self.iowait)
            .saturating_add(self.irq)
            .saturating_add(self.softirq)
            .saturating_add(self.steal)
            .saturating_add(self.guest)
            .saturating_add(self.guest_nice)
    }

    /// Everything except `idle`. Note that `iowait` counts as active.
    #[must_use]
    pub const fn active(&self) -> u64 {
        self.total().saturating_sub(self.idle)
    }

    /// Parse the aggregate `cpu` line of `/proc/stat`.
    ///
    /// # Errors
    ///
    /// Returns a [`SensorError::Parse`] if the label is not `cpu`, fewer than
    /// eight counters are present, or a counter is not an unsigned integer.
    pub fn parse_from_proc_stat_line(line: &str) -> Result<Self, SensorError> {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some(Self::LABEL) => {}
            Some(other) => {
                return Err(SensorError::parse(format!(
                    "Expected '{}' label, found '{other}'",
                    Self::LABEL
                )))
            }
            None => return Err(SensorError::parse("Empty CPU statistics line")),
        }

        let values = tokens
            .take(Self::MAX_FIELDS)
            .map(str::parse::<u64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SensorError::parse_with_source("Failed to parse CPU statistics", e))?;

        if values.len() < Self::REQUIRED_FIELDS {
            return Err(SensorError::parse(format!(
                "Insufficient CPU statistics: expected at least {}, got {}",
                Self::REQUIRED_FIELDS,
                values.len()
            )));
        }

        Ok(Self {
            user: values[0],
            nice: values[1],
            system: values[2],
            idle: values[3],
            iowait: values[4],
            irq: values[5],
            softirq: values[6],
            steal: values[7],
            guest: values.get(8).copied().unwrap_or(0),
            guest_nice: values.get(9).copied().unwrap_or(0),
        })
    }
}

/// Source of whole-system CPU counters.
pub trait SystemCounterReader: Send {
    /// Read the current cumulative counters.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::CounterUnavailable`] when the source is missing,
    /// malformed or unparsable.
    fn read(&self) -> Result<CpuCounters, SensorError>;
}

/// Reads [`CpuCounters`] from a `/proc/stat`-formatted file.
#[derive(Debug, Clone)]
pub struct ProcStatReader {
    path: PathBuf,
}

impl ProcStatReader {
    /// Path to the proc stat file.
    pub const PROC_STAT_PATH: &'static str = "/proc/stat";

    /// Reader for the real `/proc/stat`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_path(Self::PROC_STAT_PATH)
    }

    /// Reader for a specific file (useful for testing).
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file this reader consults.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_first_line(&self) -> Result<CpuCounters, SensorError> {
        let content = fs::read_to_string(&self.path)?;
        let first_line = content
            .lines()
            .next()
            .ok_or_else(|| SensorError::parse("Empty /proc/stat file"))?;
        CpuCounters::parse_from_proc_stat_line(first_line)
    }
}

impl Default for ProcStatReader {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCounterReader for ProcStatReader {
    fn read(&self) -> Result<CpuCounters, SensorError> {
        self.read_first_line().map_err(|e| match e {
            SensorError::Io(io_err) if io_err.kind() == std::io::ErrorKind::PermissionDenied => {
                SensorError::counter_unavailable(self.path.display().to_string(), "permission denied")
            }
            SensorError::Io(io_err) => {
                SensorError::counter_unavailable(self.path.display().to_string(), io_err.to_string())
            }
            other => SensorError::counter_unavailable(self.path.display().to_string(), other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cpu_counters_parsing() {
        let line = "cpu  1234 5678 9012 3456 7890 1234 5678 9012 11 22";
        let counters = CpuCounters::parse_from_proc_stat_line(line).unwrap();

        assert_eq!(counters.user, 1234);
        assert_eq!(counters.nice, 5678);
        assert_eq!(counters.system, 9012);
        assert_eq!(counters.idle, 3456);
        assert_eq!(counters.iowait, 7890);
        assert_eq!(counters.irq, 1234);
        assert_eq!(counters.softirq, 5678);
        assert_eq!(counters.steal, 9012);
        assert_eq!(counters.guest, 11);
        assert_eq!(counters.guest_nice, 22);
    }

    #[test]
    fn test_guest_fields_default_to_zero() {
        let counters = CpuCounters::parse_from_proc_stat_line("cpu  1 2 3 4 5 6 7 8").unwrap();
        assert_eq!(counters.steal, 8);
        assert_eq!(counters.guest, 0);
        assert_eq!(counters.guest_nice, 0);

        let nine = CpuCounters::parse_from_proc_stat_line("cpu 1 2 3 4 5 6 7 8 9").unwrap();
        assert_eq!(nine.guest, 9);
        assert_eq!(nine.guest_nice, 0);
    }

    #[test]
    fn test_rejects_malformed_lines() {
        assert!(CpuCounters::parse_from_proc_stat_line("").is_err());
        assert!(CpuCounters::parse_from_proc_stat_line("invalid format").is_err());
        assert!(CpuCounters::parse_from_proc_stat_line("cpu0 1 2 3 4 5 6 7 8").is_err());
        assert!(CpuCounters::parse_from_proc_stat_line("cpu  1 2 3 4 5 6 7").is_err());
        assert!(CpuCounters::parse_from_proc_stat_line("cpu  1 2 3 x 5 6 7 8").is_err());
        assert!(CpuCounters::parse_from_proc_stat_line("cpu  1 2 3 -4 5 6 7 8").is_err());
    }

    #[test]
    fn test_total_and_active() {
        let counters = CpuCounters {
            user: 100,
            nice: 10,
            system: 50,
            idle: 500,
            iowait: 20,
            irq: 5,
            softirq: 10,
            steal: 0,
            guest: 3,
            guest_nice: 2,
        };
        assert_eq!(counters.total(), 700);
        assert_eq!(counters.active(), 200);
        assert_eq!(counters.active(), counters.total() - counters.idle);
    }

    #[test]
    fn test_reader_uses_first_line_only() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cpu  100 10 50 500 20 5 10 0 0 0").unwrap();
        writeln!(file, "cpu0 50 5 25 250 10 2 5 0 0 0").unwrap();
        writeln!(file, "intr 12345").unwrap();

        let counters = ProcStatReader::with_path(file.path()).read().unwrap();
        assert_eq!(counters.user, 100);
        assert_eq!(counters.idle, 500);
        assert_eq!(counters.total(), 695);
    }

    #[test]
    fn test_reader_missing_file_is_counter_unavailable() {
        let reader = ProcStatReader::with_path("/nonexistent/proc/stat");
        let err = reader.read().unwrap_err();
        assert!(matches!(err, SensorError::CounterUnavailable { .. }));
    }

    #[test]
    fn test_reader_malformed_file_is_counter_unavailable() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "invalid format").unwrap();
        let err = ProcStatReader::with_path(file.path()).read().unwrap_err();
        assert!(matches!(err, SensorError::CounterUnavailable { .. }));

        let empty = tempfile::NamedTempFile::new().unwrap();
        let err = ProcStatReader::with_path(empty.path()).read().unwrap_err();
        assert!(matches!(err, SensorError::CounterUnavailable { .. }));
    }

    #[test]
    fn test_read_real_proc_stat() {
        // Runs against the host; only meaningful on Linux.
        if Path::new(ProcStatReader::PROC_STAT_PATH).exists() {
            let counters = ProcStatReader::new().read().unwrap();
            assert!(counters.total() > 0);
        }
    }
}
