//! # fanwhy-core
//!
//! Shared building blocks for the fanwhy workspace: the common error type,
//! typed sampling configuration, cancellation-aware pauses and the generic
//! two-snapshot [`CounterPair`] used by every usage calculation.
//!
//! ## Features
//!
//! - **Error handling** - One [`SensorError`] type shared by every reader
//! - **Configuration** - Validated [`SnapshotRequest`] and [`MonitorConfig`]
//! - **Sampling** - [`CounterPair::capture`] implements read, pause, read
//! - **Cancellation** - [`CancelToken`] checked at every pause
//!
//! ## Quick Start
//!
//! ```rust
//! use fanwhy_core::{CounterPair, NoPause, SensorError};
//! use std::time::Duration;
//!
//! let mut ticks = [100_u64, 250].into_iter();
//! let pair = CounterPair::capture(
//!     || ticks.next().ok_or_else(|| SensorError::parse("exhausted")),
//!     Duration::from_secs(1),
//!     &NoPause,
//! )?;
//! assert_eq!(pair.after - pair.before, 150);
//! # Ok::<(), SensorError>(())
//! ```

pub mod config;
pub mod sampling;

pub use config::{MonitorConfig, OutputFormat, OutputFormatParseError, SnapshotRequest};
pub use sampling::{CancelToken, CounterPair, NoPause, Pause, SleepPause};

/// Formatting helpers shared by the report renderers.
pub mod format {
    /// Suffix appended to names cut down by [`truncate_name`].
    pub const ELLIPSIS: &str = "...";

    /// Cut `name` to at most `width` characters, marking the cut with `...`.
    ///
    /// Names that already fit are returned unchanged. Widths too small to hold
    /// the ellipsis fall back to a plain cut.
    #[must_use]
    pub fn truncate_name(name: &str, width: usize) -> String {
        if name.chars().count() <= width {
            return name.to_owned();
        }
        if width <= ELLIPSIS.len() {
            return name.chars().take(width).collect();
        }
        let mut cut: String = name.chars().take(width - ELLIPSIS.len()).collect();
        cut.push_str(ELLIPSIS);
        cut
    }

    /// Format a percentage with one decimal, e.g. `"42.5%"`.
    #[must_use]
    pub fn percent(value: f64) -> String {
        format!("{value:.1}%")
    }

    /// Format a temperature with one decimal, e.g. `"61.2°C"`.
    #[must_use]
    pub fn celsius(value: f64) -> String {
        format!("{value:.1}°C")
    }
}

/// Common error type for every reader and calculation in the workspace.
///
/// Only failures that make a whole requested value impossible surface as a
/// `SensorError`; per-process and per-sensor failures are absorbed by the
/// readers and never reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    /// I/O error occurred while reading counter data.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing counter data from text format.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of what failed to parse
        message: String,
        /// Optional source error for chaining
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The whole-system CPU counters could not be read or parsed.
    #[error("CPU counters unavailable from {path}: {reason}")]
    CounterUnavailable {
        /// The counter source that was consulted
        path: String,
        /// Why the counters could not be produced
        reason: String,
    },

    /// Configuration error (non-positive interval, zero top count, etc.).
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration issue
        message: String,
        /// The invalid configuration value if applicable
        value: Option<String>,
    },

    /// An external command did not finish in time.
    #[error("Timeout after {duration:?} while {operation}")]
    Timeout {
        /// How long the operation was allowed to run
        duration: std::time::Duration,
        /// Description of what operation timed out
        operation: String,
    },

    /// A pause was cut short because the session was cancelled.
    #[error("Sampling interrupted")]
    Interrupted,
}

impl SensorError {
    /// Create a new parse error with a simple message.
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new parse error with a source error.
    pub fn parse_with_source<S: Into<String>, E>(message: S, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Parse {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new counter-unavailable error.
    pub fn counter_unavailable<P: Into<String>, S: Into<String>>(path: P, reason: S) -> Self {
        Self::CounterUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
            value: None,
        }
    }

    /// Create a new configuration error with the invalid value.
    pub fn config_with_value<S: Into<String>, V: Into<String>>(message: S, value: V) -> Self {
        Self::Config {
            message: message.into(),
            value: Some(value.into()),
        }
    }

    /// Create a new timeout error.
    pub fn timeout<S: Into<String>>(duration: std::time::Duration, operation: S) -> Self {
        Self::Timeout {
            duration,
            operation: operation.into(),
        }
    }

    /// Whether this error was caused by cancellation rather than a failure.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_truncate_name() {
        assert_eq!(format::truncate_name("firefox", 20), "firefox");
        assert_eq!(format::truncate_name("abcdefghij", 10), "abcdefghij");
        assert_eq!(format::truncate_name("abcdefghijk", 10), "abcdefg...");
        assert_eq!(format::truncate_name("abcdef", 2), "ab");
    }

    #[test]
    fn test_truncate_name_counts_chars() {
        // Multi-byte names must not be cut inside a character.
        assert_eq!(format::truncate_name("überprozess", 8), "überp...");
    }

    #[test]
    fn test_percent_and_celsius() {
        assert_eq!(format::percent(67.213), "67.2%");
        assert_eq!(format::celsius(61.24), "61.2°C");
    }

    #[test]
    fn test_sensor_error_constructors() {
        let err = SensorError::parse("Invalid format");
        assert!(matches!(err, SensorError::Parse { .. }));

        let err = SensorError::config_with_value("Invalid setting", "bad_value");
        assert!(matches!(err, SensorError::Config { value: Some(_), .. }));

        let err = SensorError::counter_unavailable("/proc/stat", "missing");
        assert_eq!(
            err.to_string(),
            "CPU counters unavailable from /proc/stat: missing"
        );

        let err = SensorError::timeout(Duration::from_secs(5), "running sensors");
        assert!(!err.is_interrupted());
        assert!(SensorError::Interrupted.is_interrupted());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: SensorError = io_err.into();
        assert!(matches!(err, SensorError::Io(_)));
    }
}
