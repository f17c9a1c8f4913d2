//! fanwhy: explain why your Linux system fans are spinning up.
//!
//! Takes a single snapshot by default; any of `--interval`, `--duration` or
//! `--samples` switches to monitor mode.

use anyhow::Context;
use clap::Parser;
use fanwhy::{render, MonitorSession, Sampler, SessionSummary, SnapshotResult};
use fanwhy_core::config::positive_seconds;
use fanwhy_core::format::celsius;
use fanwhy_core::{CancelToken, MonitorConfig, OutputFormat, SnapshotRequest};
use fanwhy_cpu::{ticks_per_second, ProcFsReader, ProcStatReader, ProcessCounterReader, SystemCounterReader};
use fanwhy_thermal::{SensorsTool, SysfsThermal};
use std::io::{self, Write};
use std::process;
use std::time::Duration;
use tokio::task;

const EXIT_FAILURE: i32 = 1;
const EXIT_INTERRUPTED: i32 = 130;

const EXAMPLES: &str = "\
Examples:
  fanwhy                               Take a single snapshot
  fanwhy --interval 5 --duration 60    Monitor for 60 seconds, sampling every 5 seconds
  fanwhy --interval 2 --samples 10     Take 10 samples, 2 seconds apart
  fanwhy --top 10 --show-temps         Show the top 10 processes with temperatures
  fanwhy --no-temps --format json      Machine-readable snapshot without temperatures";

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "fanwhy")]
#[command(about = "Understand why your Linux system fans are spinning up")]
#[command(version)]
#[command(after_help = EXAMPLES)]
struct Args {
    /// Take a single snapshot (default behaviour)
    #[arg(long, conflicts_with_all = ["interval", "duration", "samples"])]
    once: bool,

    /// Seconds between samples in monitor mode (default: 5)
    #[arg(long, value_name = "SECONDS", value_parser = positive_seconds)]
    interval: Option<Duration>,

    /// Total length of the monitor session (default: 60 unless --samples is given)
    #[arg(long, value_name = "SECONDS", value_parser = positive_seconds)]
    duration: Option<Duration>,

    /// Number of samples to take in monitor mode
    #[arg(long, value_name = "N", value_parser = positive_count)]
    samples: Option<usize>,

    /// Number of top processes to show
    #[arg(short, long, value_name = "N", default_value = "5", value_parser = positive_count)]
    top: usize,

    /// Sampling window of each snapshot
    #[arg(long, value_name = "SECONDS", default_value = "1", value_parser = positive_seconds)]
    window: Duration,

    /// Show temperatures (the default)
    #[arg(long, conflicts_with = "no_temps")]
    show_temps: bool,

    /// Suppress temperature readings
    #[arg(long)]
    no_temps: bool,

    /// Output format (text, raw, json)
    #[arg(short, long, value_name = "FORMAT", default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Shorthand for --format raw
    #[arg(long, conflicts_with = "format")]
    raw: bool,

    /// Verify that counters and sensors are readable and exit
    #[arg(long)]
    check: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn output_format(&self) -> OutputFormat {
        if self.raw {
            OutputFormat::Raw
        } else {
            self.format
        }
    }

    fn snapshot_request(&self) -> SnapshotRequest {
        SnapshotRequest::new()
            .with_top_n(self.top)
            .with_interval(self.window)
            .with_temperature(self.show_temps || !self.no_temps)
    }

    /// Monitor settings, or `None` for a single snapshot.
    fn monitor_config(&self) -> Option<MonitorConfig> {
        if self.once || (self.interval.is_none() && self.duration.is_none() && self.samples.is_none()) {
            return None;
        }
        Some(
            MonitorConfig::new(self.snapshot_request())
                .with_every(self.interval.unwrap_or(MonitorConfig::DEFAULT_EVERY))
                .with_duration(self.duration)
                .with_samples(self.samples),
        )
    }
}

/// Validate a positive count.
fn positive_count(s: &str) -> Result<usize, String> {
    let count = s
        .parse::<usize>()
        .map_err(|_| "Value must be a positive integer".to_owned())?;

    if count == 0 {
        return Err("Value must be at least 1".to_owned());
    }

    Ok(count)
}

fn print_snapshot(result: &SnapshotResult, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => println!("{}", render::snapshot_text(result)),
        OutputFormat::Raw => println!("{}", render::snapshot_raw(result)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
    }
    Ok(())
}

fn print_sample(index: usize, result: &SnapshotResult, format: OutputFormat) {
    let line = match format {
        OutputFormat::Text => render::sample_line(index, result),
        OutputFormat::Raw => render::sample_raw(result),
        OutputFormat::Json => match serde_json::to_string(result) {
            Ok(json) => json,
            Err(e) => {
                log::warn!("cannot serialize sample {index}: {e}");
                return;
            }
        },
    };
    println!("{line}");
    let _ = io::stdout().flush();
}

fn print_summary(summary: &SessionSummary, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => {
            if summary.cancelled {
                println!("\nMonitoring interrupted by user.");
            }
            println!("\n{}", render::session_text(summary));
        }
        OutputFormat::Raw => {}
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(summary)?),
    }
    Ok(())
}

/// Report which data sources are usable.
fn check() -> anyhow::Result<()> {
    let counters = ProcStatReader::new();
    if let Err(e) = counters.read() {
        eprintln!("CPU counters are not available: {e}");
        process::exit(EXIT_FAILURE);
    }
    println!("CPU counters: {}", counters.path().display());
    println!("Clock ticks per second: {}", ticks_per_second());
    println!("Visible processes: {}", ProcFsReader::new().enumerate().len());
    println!("Thermal zones: {}", SysfsThermal::new().read_zones().len());
    match SensorsTool::new().read_max() {
        Some(t) => println!("sensors tool: {}", celsius(t)),
        None => println!("sensors tool: unavailable"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    fanwhy::init_logging(args.verbose);

    if args.check {
        return check();
    }

    let format = args.output_format();
    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::debug!("interrupt received, stopping");
            on_signal.cancel();
        }
    });
    let sampler = Sampler::system(cancel.clone());

    match args.monitor_config() {
        Some(config) => {
            config.validate().context("invalid monitor settings")?;
            let session = MonitorSession::new(config, cancel);
            let summary = task::spawn_blocking(move || {
                session.run(&sampler, |index, result| print_sample(index, result, format))
            })
            .await
            .context("monitor task failed")??;

            print_summary(&summary, format)?;
            if summary.cancelled {
                process::exit(EXIT_INTERRUPTED);
            }
        }
        None => {
            let request = args.snapshot_request();
            request.validate().context("invalid snapshot settings")?;
            let outcome = task::spawn_blocking(move || sampler.snapshot(&request))
                .await
                .context("snapshot task failed")?;

            match outcome {
                Ok(result) => print_snapshot(&result, format)?,
                Err(e) if e.is_interrupted() => {
                    eprintln!("\nInterrupted by user.");
                    process::exit(EXIT_INTERRUPTED);
                }
                Err(e) => {
                    eprintln!("Error: Failed to read system information: {e}");
                    process::exit(EXIT_FAILURE);
                }
            }
        }
    }

    Ok(())
}
