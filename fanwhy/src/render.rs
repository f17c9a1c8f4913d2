//! Human-readable and raw renderings of snapshots and sessions.

use crate::monitor::SessionSummary;
use crate::sampler::SnapshotResult;
use fanwhy_core::format::{celsius, percent, truncate_name};
use fanwhy_cpu::ProcessUsage;
use std::fmt::Write;

/// Processes above this share are named in the summary sentence.
pub const BLAME_PERCENT: f64 = 5.0;

/// Overall usage above this blames the system as a whole.
pub const HIGH_CPU_PERCENT: f64 = 50.0;

/// Temperatures above this blame heat.
pub const HIGH_TEMPERATURE: f64 = 70.0;

const PID_MIN_WIDTH: usize = 6;
const NAME_MIN_WIDTH: usize = 20;
const NAME_MAX_WIDTH: usize = 40;
const USER_MIN_WIDTH: usize = 8;
const CPU_WIDTH: usize = 8;

fn widest(processes: &[ProcessUsage], len: impl Fn(&ProcessUsage) -> usize) -> usize {
    processes.iter().map(len).max().unwrap_or(0)
}

/// A PID/Process/User/CPU % table, indented by two spaces.
#[must_use]
pub fn process_table(processes: &[ProcessUsage]) -> String {
    if processes.is_empty() {
        return "  (no processes found)".to_owned();
    }

    let pid_width = widest(processes, |p| p.pid.to_string().len()).max(PID_MIN_WIDTH);
    let name_width = widest(processes, |p| p.name.chars().count()).clamp(NAME_MIN_WIDTH, NAME_MAX_WIDTH);
    let user_width = widest(processes, |p| p.user.chars().count()).max(USER_MIN_WIDTH);

    let mut lines = vec![
        format!(
            "  {:<pid_width$} {:<name_width$} {:<user_width$} {:>CPU_WIDTH$}",
            "PID", "Process", "User", "CPU %"
        ),
        format!(
            "  {} {} {} {}",
            "-".repeat(pid_width),
            "-".repeat(name_width),
            "-".repeat(user_width),
            "-".repeat(CPU_WIDTH)
        ),
    ];
    lines.extend(processes.iter().map(|p| {
        format!(
            "  {:<pid_width$} {:<name_width$} {:<user_width$} {:>7.1}%",
            p.pid,
            truncate_name(&p.name, name_width),
            p.user,
            p.cpu_percent
        )
    }));
    lines.join("\n")
}

/// One sentence naming the most likely reason the fans are running.
#[must_use]
pub fn summary_sentence(cpu_percent: f64, processes: &[ProcessUsage], temperature: Option<f64>) -> String {
    let busy: Vec<&str> = processes
        .iter()
        .filter(|p| p.cpu_percent > BLAME_PERCENT)
        .take(3)
        .map(|p| p.name.as_str())
        .collect();

    match busy.as_slice() {
        [one] => format!("High CPU usage from process '{one}' is likely causing the fan to ramp up."),
        [first, second] => format!(
            "High CPU usage from processes '{first}' and '{second}' is likely causing the fan to ramp up."
        ),
        [first, second, ..] => format!(
            "High CPU usage from processes '{first}', '{second}', and others is likely causing the fan to ramp up."
        ),
        [] if cpu_percent > HIGH_CPU_PERCENT => {
            "High overall CPU usage is likely causing the fan to ramp up.".to_owned()
        }
        [] => match temperature {
            Some(t) if t > HIGH_TEMPERATURE => {
                format!("High temperature ({}) is likely causing the fan to ramp up.", celsius(t))
            }
            Some(_) => "CPU usage and temperature appear normal.".to_owned(),
            None => "CPU usage appears normal. Temperature data unavailable.".to_owned(),
        },
    }
}

/// The full snapshot report.
#[must_use]
pub fn snapshot_text(result: &SnapshotResult) -> String {
    let mut out = String::from("=== System Load Snapshot ===\n\n");
    let _ = writeln!(out, "Overall CPU Usage: {}", percent(result.cpu_percent));
    if let Some(t) = result.temperature {
        let _ = writeln!(out, "Highest Temperature: {}", celsius(t));
    }
    let _ = writeln!(out, "\nTop {} CPU Processes:", result.top_processes.len());
    let _ = writeln!(out, "{}", process_table(&result.top_processes));
    let _ = writeln!(out, "\n--- Summary ---");
    let _ = write!(
        out,
        "{}",
        summary_sentence(result.cpu_percent, &result.top_processes, result.temperature)
    );
    out
}

/// Tab-separated snapshot for scripts: a CPU line, an optional temperature
/// line, then `pid name user cpu` per process.
#[must_use]
pub fn snapshot_raw(result: &SnapshotResult) -> String {
    let mut lines = vec![format!("CPU: {}", percent(result.cpu_percent))];
    if let Some(t) = result.temperature {
        lines.push(format!("Temperature: {}", celsius(t)));
    }
    lines.extend(
        result
            .top_processes
            .iter()
            .map(|p| format!("{}\t{}\t{}\t{:.1}", p.pid, p.name, p.user, p.cpu_percent)),
    );
    lines.join("\n")
}

/// Progress line for one monitor sample, e.g. `[3] CPU: 12.5% | Temp: 61.0°C`.
#[must_use]
pub fn sample_line(index: usize, result: &SnapshotResult) -> String {
    let mut line = format!("[{index}] CPU: {}", percent(result.cpu_percent));
    if let Some(t) = result.temperature {
        let _ = write!(line, " | Temp: {}", celsius(t));
    }
    line
}

/// Raw monitor line: unix timestamp and CPU usage.
#[must_use]
pub fn sample_raw(result: &SnapshotResult) -> String {
    format!("{}\t{:.1}", result.taken_at.timestamp(), result.cpu_percent)
}

/// End-of-session report.
#[must_use]
pub fn session_text(summary: &SessionSummary) -> String {
    let mut out = String::from("=== Monitoring Summary ===\n\n");
    let _ = write!(out, "Samples: {}", summary.samples);
    if summary.failed_samples > 0 {
        let _ = write!(out, " ({} failed)", summary.failed_samples);
    }
    out.push('\n');
    if let (Some(mean), Some(max)) = (summary.cpu_mean, summary.cpu_max) {
        let _ = writeln!(out, "Average CPU Usage: {}", percent(mean));
        let _ = writeln!(out, "Maximum CPU Usage: {}", percent(max));
    }
    if let (Some(mean), Some(max)) = (summary.temperature_mean, summary.temperature_max) {
        let _ = writeln!(out, "Average Temperature: {}", celsius(mean));
        let _ = writeln!(out, "Maximum Temperature: {}", celsius(max));
    }
    if !summary.top_processes.is_empty() {
        let _ = writeln!(out, "\nMost Frequently High-CPU Processes (Average):");
        let _ = writeln!(out, "{}", process_table(&summary.top_processes));
    }
    out.trim_end().to_owned()
}
