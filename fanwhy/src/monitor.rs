//! Repeated snapshots with running statistics.

use crate::sampler::{Sampler, SnapshotResult};
use chrono::{DateTime, Utc};
use fanwhy_core::{CancelToken, MonitorConfig, Pause, SensorError, SleepPause};
use fanwhy_cpu::{top_n, ProcessUsage};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;

/// Aggregate statistics of a finished (or cancelled) session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    /// Completed samples.
    pub samples: usize,
    /// Samples that failed and were skipped.
    pub failed_samples: usize,
    /// Whether the session was stopped by cancellation.
    pub cancelled: bool,
    /// When the session began.
    pub started_at: DateTime<Utc>,
    /// Wall-clock length of the session.
    pub elapsed_seconds: f64,
    /// Mean overall CPU usage, `None` without completed samples.
    pub cpu_mean: Option<f64>,
    /// Highest overall CPU usage seen.
    pub cpu_max: Option<f64>,
    /// Mean of the samples that had a temperature.
    pub temperature_mean: Option<f64>,
    /// Highest temperature seen.
    pub temperature_max: Option<f64>,
    /// Processes ranked by their mean CPU over the samples they appeared in.
    pub top_processes: Vec<ProcessUsage>,
}

#[derive(Debug)]
struct ProcessTally {
    name: String,
    user: String,
    sum: f64,
    count: usize,
}

/// Running totals; one per session.
#[derive(Debug, Default)]
struct SessionStats {
    cpu: Vec<f64>,
    temperatures: Vec<f64>,
    processes: HashMap<u32, ProcessTally>,
    first_seen: Vec<u32>,
    failed: usize,
}

impl SessionStats {
    fn record(&mut self, result: &SnapshotResult) {
        self.cpu.push(result.cpu_percent);
        self.temperatures.extend(result.temperature);
        for process in &result.top_processes {
            let tally = self.processes.entry(process.pid).or_insert_with(|| {
                self.first_seen.push(process.pid);
                ProcessTally {
                    name: String::new(),
                    user: String::new(),
                    sum: 0.0,
                    count: 0,
                }
            });
            // A pid can be reused; the latest identity wins.
            tally.name.clone_from(&process.name);
            tally.user.clone_from(&process.user);
            tally.sum += process.cpu_percent;
            tally.count += 1;
        }
    }

    fn samples(&self) -> usize {
        self.cpu.len()
    }

    fn attempts(&self) -> usize {
        self.samples() + self.failed
    }

    fn finish(self, top: usize, cancelled: bool, started_at: DateTime<Utc>, started: Instant) -> SessionSummary {
        let averages = self
            .first_seen
            .iter()
            .filter_map(|pid| {
                let tally = self.processes.get(pid)?;
                Some(ProcessUsage {
                    pid: *pid,
                    name: tally.name.clone(),
                    user: tally.user.clone(),
                    cpu_percent: tally.sum / tally.count as f64,
                })
            })
            .collect();

        SessionSummary {
            samples: self.samples(),
            failed_samples: self.failed,
            cancelled,
            started_at,
            elapsed_seconds: started.elapsed().as_secs_f64(),
            cpu_mean: mean(&self.cpu),
            cpu_max: self.cpu.iter().copied().reduce(f64::max),
            temperature_mean: mean(&self.temperatures),
            temperature_max: self.temperatures.iter().copied().reduce(f64::max),
            top_processes: top_n(averages, top),
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// A monitoring run: sample, wait, repeat until a limit or cancellation.
pub struct MonitorSession {
    config: MonitorConfig,
    cancel: CancelToken,
    pause: Box<dyn Pause + Send>,
}

impl MonitorSession {
    /// Session that waits between samples with a cancellable sleep.
    #[must_use]
    pub fn new(config: MonitorConfig, cancel: CancelToken) -> Self {
        let pause = SleepPause::new(cancel.clone());
        Self {
            config,
            cancel,
            pause: Box::new(pause),
        }
    }

    /// Replace the wait between samples.
    #[must_use]
    pub fn with_pause(mut self, pause: impl Pause + Send + 'static) -> Self {
        self.pause = Box::new(pause);
        self
    }

    #[must_use]
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Whether another sample fits in the session.
    fn has_room(&self, stats: &SessionStats, started: Instant) -> bool {
        // Failed attempts count too, so a dead counter source cannot loop forever.
        if self.config.samples.is_some_and(|limit| stats.attempts() >= limit) {
            return false;
        }
        match self.config.effective_duration() {
            Some(limit) if stats.attempts() == 0 => started.elapsed() < limit,
            Some(limit) => started.elapsed().saturating_add(self.config.every) < limit,
            None => true,
        }
    }

    /// Run the session, calling `on_sample` with the 1-based index of every
    /// completed sample.
    ///
    /// Cancellation is not an error: the summary of the completed samples is
    /// returned with `cancelled` set, and a sample interrupted mid-window is
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Config`] if the configuration is invalid.
    pub fn run<F>(&self, sampler: &Sampler, mut on_sample: F) -> Result<SessionSummary, SensorError>
    where
        F: FnMut(usize, &SnapshotResult),
    {
        self.config.validate()?;

        let started_at = Utc::now();
        let started = Instant::now();
        let mut stats = SessionStats::default();
        let mut cancelled = false;

        while self.has_room(&stats, started) {
            if stats.attempts() > 0 {
                if let Err(e) = self.pause.pause(self.config.every) {
                    cancelled = e.is_interrupted();
                    break;
                }
            }
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            match sampler.snapshot(&self.config.snapshot) {
                Ok(result) => {
                    stats.record(&result);
                    on_sample(stats.samples(), &result);
                }
                Err(e) if e.is_interrupted() => {
                    cancelled = true;
                    break;
                }
                Err(e) => {
                    log::warn!("sample {} failed: {e}", stats.attempts() + 1);
                    stats.failed += 1;
                }
            }
        }

        let summary = stats.finish(self.config.snapshot.top_n, cancelled, started_at, started);
        log::debug!(
            "session ended after {} samples ({} failed, cancelled: {})",
            summary.samples,
            summary.failed_samples,
            summary.cancelled
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for MonitorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorSession")
            .field("config", &self.config)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}
