//! One snapshot: CPU usage, the busiest processes and the hottest sensor.

use chrono::{DateTime, Utc};
use fanwhy_core::{CancelToken, CounterPair, Pause, SensorError, SleepPause, SnapshotRequest};
use fanwhy_cpu::{
    process_usages, system_usage, ticks_per_second, top_n, CpuCounters, ProcFsReader, ProcStatReader,
    ProcessCounterReader, ProcessSample, ProcessUsage, SystemCounterReader,
};
use fanwhy_thermal::{aggregate, SystemThermal, ThermalReader};
use serde::Serialize;

/// What the machine was doing over one sampling window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotResult {
    /// System-wide CPU usage in `[0, 100]`.
    pub cpu_percent: f64,
    /// Busiest processes, highest first.
    pub top_processes: Vec<ProcessUsage>,
    /// Hottest sensor in Celsius; `None` when disabled or nothing answered.
    pub temperature: Option<f64>,
    /// When the second counter snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

/// Takes snapshots from a fixed set of readers.
pub struct Sampler {
    system: Box<dyn SystemCounterReader>,
    processes: Box<dyn ProcessCounterReader>,
    thermal: Box<dyn ThermalReader>,
    ticks_per_second: u64,
    pause: Box<dyn Pause + Send>,
}

impl Sampler {
    /// Sampler over arbitrary readers, using the OS tick rate and an
    /// uncancellable sleep.
    #[must_use]
    pub fn new(
        system: impl SystemCounterReader + 'static,
        processes: impl ProcessCounterReader + 'static,
        thermal: impl ThermalReader + 'static,
    ) -> Self {
        Self {
            system: Box::new(system),
            processes: Box::new(processes),
            thermal: Box::new(thermal),
            ticks_per_second: ticks_per_second(),
            pause: Box::new(SleepPause::new(CancelToken::new())),
        }
    }

    /// Sampler over `/proc` and `/sys` whose sampling window stops early
    /// once `cancel` is tripped.
    #[must_use]
    pub fn system(cancel: CancelToken) -> Self {
        Self::new(ProcStatReader::new(), ProcFsReader::new(), SystemThermal::default())
            .with_pause(SleepPause::new(cancel))
    }

    /// Replace the wait between the two counter snapshots.
    #[must_use]
    pub fn with_pause(mut self, pause: impl Pause + Send + 'static) -> Self {
        self.pause = Box::new(pause);
        self
    }

    #[must_use]
    pub fn with_ticks_per_second(mut self, ticks_per_second: u64) -> Self {
        self.ticks_per_second = ticks_per_second;
        self
    }

    /// Clock ticks per second used for per-process usage.
    #[must_use]
    pub fn ticks_per_second(&self) -> u64 {
        self.ticks_per_second
    }

    fn read_counters(&self) -> Result<(CpuCounters, Vec<ProcessSample>), SensorError> {
        Ok((self.system.read()?, self.processes.enumerate()))
    }

    /// Measure the machine over `request.interval`.
    ///
    /// System and process counters are captured together on both sides of a
    /// single window. Temperatures are read afterwards, once.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Config`] for an invalid request,
    /// [`SensorError::CounterUnavailable`] when the system counters cannot be
    /// read, and [`SensorError::Interrupted`] when the window is cancelled.
    pub fn snapshot(&self, request: &SnapshotRequest) -> Result<SnapshotResult, SensorError> {
        request.validate()?;

        let CounterPair {
            before: (cpu_before, procs_before),
            after: (cpu_after, procs_after),
            interval,
        } = CounterPair::capture(|| self.read_counters(), request.interval, self.pause.as_ref())?;
        let taken_at = Utc::now();

        let cpu_percent = system_usage(&CounterPair::new(cpu_before, cpu_after, interval));
        let usages = process_usages(
            &CounterPair::new(procs_before, procs_after, interval),
            self.ticks_per_second,
        );
        log::debug!("cpu {cpu_percent:.1}% across {} processes", usages.len());

        let temperature = if request.include_temperature {
            aggregate(&self.thermal.read_all())
        } else {
            None
        };

        Ok(SnapshotResult {
            cpu_percent,
            top_processes: top_n(usages, request.top_n),
            temperature,
            taken_at,
        })
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("ticks_per_second", &self.ticks_per_second)
            .finish_non_exhaustive()
    }
}
