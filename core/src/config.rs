//! Typed sampling configuration.
//!
//! fanwhy has no configuration file; everything is built from command-line
//! arguments into these types and validated before any counter is read.

use crate::SensorError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// What a single snapshot should measure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SnapshotRequest {
    /// How many processes to report, highest CPU first.
    pub top_n: usize,
    /// Time between the two counter snapshots.
    pub interval: Duration,
    /// Whether thermal sensors are read at all.
    pub include_temperature: bool,
}

impl SnapshotRequest {
    /// Default number of reported processes.
    pub const DEFAULT_TOP_N: usize = 5;

    /// Default sampling window between the two snapshots.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

    /// Create a request with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of reported processes.
    #[must_use]
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    /// Set the sampling window.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Enable or disable temperature readings.
    #[must_use]
    pub fn with_temperature(mut self, include: bool) -> Self {
        self.include_temperature = include;
        self
    }

    /// Check that the request can be sampled.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Config`] if `top_n` is zero or the interval is zero.
    pub fn validate(&self) -> Result<(), SensorError> {
        if self.top_n == 0 {
            return Err(SensorError::config_with_value(
                "Top process count must be positive",
                self.top_n.to_string(),
            ));
        }
        if self.interval.is_zero() {
            return Err(SensorError::config("Sampling interval must be positive"));
        }
        Ok(())
    }
}

impl Default for SnapshotRequest {
    fn default() -> Self {
        Self {
            top_n: Self::DEFAULT_TOP_N,
            interval: Self::DEFAULT_INTERVAL,
            include_temperature: true,
        }
    }
}

/// Settings for a repeated monitoring session.
///
/// The session stops when either limit is reached. With neither limit set it
/// runs for [`MonitorConfig::DEFAULT_DURATION`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonitorConfig {
    /// Request used for every sample.
    pub snapshot: SnapshotRequest,
    /// Pause between the end of one sample and the start of the next.
    pub every: Duration,
    /// Wall-clock limit for the whole session.
    pub duration: Option<Duration>,
    /// Maximum number of sampling attempts, failed ones included.
    pub samples: Option<usize>,
}

impl MonitorConfig {
    /// Default pause between samples.
    pub const DEFAULT_EVERY: Duration = Duration::from_secs(5);

    /// Session length used when neither a duration nor a sample count is given.
    pub const DEFAULT_DURATION: Duration = Duration::from_secs(60);

    /// Create a monitor configuration around a snapshot request.
    #[must_use]
    pub fn new(snapshot: SnapshotRequest) -> Self {
        Self {
            snapshot,
            every: Self::DEFAULT_EVERY,
            duration: None,
            samples: None,
        }
    }

    /// Set the pause between samples.
    #[must_use]
    pub fn with_every(mut self, every: Duration) -> Self {
        self.every = every;
        self
    }

    /// Limit the session by wall-clock time.
    #[must_use]
    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    /// Limit the session by number of samples.
    #[must_use]
    pub fn with_samples(mut self, samples: Option<usize>) -> Self {
        self.samples = samples;
        self
    }

    /// The duration limit actually applied to the session.
    #[must_use]
    pub fn effective_duration(&self) -> Option<Duration> {
        match (self.duration, self.samples) {
            (None, None) => Some(Self::DEFAULT_DURATION),
            (duration, _) => duration,
        }
    }

    /// Check that the session can run.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Config`] for an invalid snapshot request, a zero
    /// pause, a zero duration or a zero sample count.
    pub fn validate(&self) -> Result<(), SensorError> {
        self.snapshot.validate()?;
        if self.every.is_zero() {
            return Err(SensorError::config("Monitor interval must be positive"));
        }
        if self.duration.is_some_and(|d| d.is_zero()) {
            return Err(SensorError::config("Monitor duration must be positive"));
        }
        if self.samples == Some(0) {
            return Err(SensorError::config_with_value(
                "Sample count must be positive",
                "0",
            ));
        }
        Ok(())
    }
}

/// Parse a positive, finite number of seconds into a [`Duration`].
///
/// Used as a `clap` value parser for every seconds-valued argument.
///
/// # Errors
///
/// Returns [`SensorError::Config`] if the value is not a number, not
/// positive, or too large to represent as a [`Duration`].
pub fn positive_seconds(s: &str) -> Result<Duration, SensorError> {
    let seconds: f64 = s
        .trim()
        .parse()
        .map_err(|_| SensorError::config_with_value("Expected a number of seconds", s))?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(SensorError::config_with_value(
            "Seconds must be a positive number",
            s,
        ));
    }
    Duration::try_from_secs_f64(seconds)
        .map_err(|_| SensorError::config_with_value("Seconds value is too large", s))
}

/// How reports are written to standard output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Formatted report with a process table and a summary sentence
    #[default]
    Text,
    /// Tab-separated lines for scripts and debugging
    Raw,
    /// One JSON document per snapshot or session
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Raw => "raw",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = OutputFormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "" => Ok(Self::Text),
            "raw" | "tsv" => Ok(Self::Raw),
            "json" => Ok(Self::Json),
            _ => Err(OutputFormatParseError {
                input: s.to_owned(),
                valid_options: &["text", "raw", "json"],
            }),
        }
    }
}

/// Error type for parsing [`OutputFormat`] from string.
#[derive(Debug, thiserror::Error)]
#[error("Invalid output format '{input}'. Valid options: {}", valid_options.join(", "))]
pub struct OutputFormatParseError {
    input: String,
    valid_options: &'static [&'static str],
}
