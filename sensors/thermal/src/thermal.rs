//! Temperature readers: kernel thermal zones and the lm-sensors `sensors` tool.

use fanwhy_core::SensorError;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{mpsc, LazyLock};
use std::thread;
use std::time::{Duration, Instant};

/// Where a temperature came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemperatureSource {
    /// A `thermal_zone*/temp` file.
    Sysfs {
        /// The zone file that was read.
        path: String,
    },
    /// The highest CPU reading printed by the `sensors` tool.
    SensorTool,
}

impl fmt::Display for TemperatureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sysfs { path } => write!(f, "sysfs:{path}"),
            Self::SensorTool => f.write_str("sensors"),
        }
    }
}

/// One temperature value in degrees Celsius.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureReading {
    /// Where the value was read.
    pub source: TemperatureSource,
    /// Degrees Celsius.
    pub celsius: f64,
}

/// Source of temperature readings.
pub trait ThermalReader: Send {
    /// Every reading currently available. Never fails; an absent source
    /// simply contributes nothing.
    fn read_all(&self) -> Vec<TemperatureReading>;
}

/// Reads `thermal_zone*/temp` files under a thermal class directory.
#[derive(Debug, Clone)]
pub struct SysfsThermal {
    root: PathBuf,
}

impl SysfsThermal {
    /// Kernel thermal class directory.
    pub const THERMAL_ROOT: &'static str = "/sys/class/thermal";

    /// Zone files, relative to the root.
    pub const ZONE_PATTERN: &'static str = "thermal_zone*/temp";

    #[must_use]
    pub fn new() -> Self {
        Self::with_root(Self::THERMAL_ROOT)
    }

    /// Reader for a sysfs-shaped directory (useful for testing).
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Every zone temperature in Celsius, in path order. Unreadable or
    /// non-numeric zone files are skipped.
    #[must_use]
    pub fn read_zones(&self) -> Vec<TemperatureReading> {
        let root = glob::Pattern::escape(&self.root.to_string_lossy());
        let pattern = format!("{root}/{}", Self::ZONE_PATTERN);
        let paths = match glob::glob(&pattern) {
            Ok(paths) => paths,
            Err(e) => {
                log::debug!("invalid thermal zone pattern {pattern}: {e}");
                return Vec::new();
            }
        };

        paths
            .flatten()
            .filter_map(|path| match read_millidegrees(&path) {
                Ok(celsius) => Some(TemperatureReading {
                    source: TemperatureSource::Sysfs {
                        path: path.display().to_string(),
                    },
                    celsius,
                }),
                Err(e) => {
                    log::trace!("skipping thermal zone {}: {e}", path.display());
                    None
                }
            })
            .collect()
    }
}

impl Default for SysfsThermal {
    fn default() -> Self {
        Self::new()
    }
}

impl ThermalReader for SysfsThermal {
    fn read_all(&self) -> Vec<TemperatureReading> {
        self.read_zones()
    }
}

/// Read a millidegree value and convert it to degrees Celsius.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not hold an integer.
pub fn read_millidegrees(path: &Path) -> Result<f64, SensorError> {
    let content = fs::read_to_string(path)?;
    let raw: i64 = content
        .trim()
        .parse()
        .map_err(|e| SensorError::parse_with_source(format!("Invalid temperature '{}'", content.trim()), e))?;
    Ok(raw as f64 / 1000.0)
}

/// Lines of `sensors` output that carry a CPU temperature.
static CPU_TEMPERATURE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)Core\s+\d+:\s+\+?(-?\d+\.?\d*)°?C",
        r"(?i)CPU\s+Temperature[:\s]+\+?(-?\d+\.?\d*)°?C",
        r"(?i)Tdie[:\s]+\+?(-?\d+\.?\d*)°?C",
        r"(?i)Package\s+id\s+\d+:\s+\+?(-?\d+\.?\d*)°?C",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// The highest CPU temperature in `sensors` output, if any line matches.
///
/// Recognises per-core (`Core 0:`), `CPU Temperature:`, AMD `Tdie:` and
/// Intel `Package id 0:` lines.
#[must_use]
pub fn parse_sensors_output(output: &str) -> Option<f64> {
    CPU_TEMPERATURE_PATTERNS
        .iter()
        .flat_map(|pattern| pattern.captures_iter(output))
        .filter_map(|captures| captures.get(1)?.as_str().parse::<f64>().ok())
        .reduce(f64::max)
}

/// Runs the lm-sensors `sensors` command with a deadline.
#[derive(Debug, Clone)]
pub struct SensorsTool {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl SensorsTool {
    /// Name of the lm-sensors binary.
    pub const PROGRAM: &'static str = "sensors";

    /// How long the tool may run before it is killed.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    const POLL: Duration = Duration::from_millis(10);

    #[must_use]
    pub fn new() -> Self {
        Self {
            program: Self::PROGRAM.to_owned(),
            args: Vec::new(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Run a different command instead (useful for testing).
    #[must_use]
    pub fn with_command<S: Into<String>>(mut self, program: S, args: &[&str]) -> Self {
        self.program = program.into();
        self.args = args.iter().map(|&arg| arg.to_owned()).collect();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the tool and return its standard output.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Io`] if the command cannot be started,
    /// [`SensorError::Timeout`] if it outlives the deadline (it is killed),
    /// or a parse error if it exits unsuccessfully or prints invalid UTF-8.
    pub fn run(&self) -> Result<String, SensorError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        // Drain stdout on its own thread so a chatty child never blocks on a full pipe.
        let (tx, rx) = mpsc::channel();
        if let Some(mut stdout) = child.stdout.take() {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let result = stdout.read_to_end(&mut buf).map(|_| buf);
                let _ = tx.send(result);
            });
        }

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(e.into());
                }
            }
            if started.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SensorError::timeout(
                    self.timeout,
                    format!("running {}", self.program),
                ));
            }
            thread::sleep(Self::POLL);
        };

        if !status.success() {
            return Err(SensorError::parse(format!("{} exited with {status}", self.program)));
        }

        let stdout = rx
            .recv_timeout(self.timeout.saturating_sub(started.elapsed()))
            .map_err(|_| SensorError::timeout(self.timeout, format!("reading {} output", self.program)))??;
        String::from_utf8(stdout)
            .map_err(|e| SensorError::parse_with_source(format!("Invalid UTF-8 in {} output", self.program), e))
    }

    /// The highest CPU temperature the tool reports, or `None` if the tool is
    /// missing, fails, times out or prints nothing recognisable.
    #[must_use]
    pub fn read_max(&self) -> Option<f64> {
        match self.run() {
            Ok(output) => parse_sensors_output(&output),
            Err(e) => {
                log::debug!("{} unavailable: {e}", self.program);
                None
            }
        }
    }
}

impl Default for SensorsTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ThermalReader for SensorsTool {
    fn read_all(&self) -> Vec<TemperatureReading> {
        self.read_max()
            .map(|celsius| TemperatureReading {
                source: TemperatureSource::SensorTool,
                celsius,
            })
            .into_iter()
            .collect()
    }
}

/// Both sources together: sysfs zones first, then the `sensors` tool.
#[derive(Debug, Clone, Default)]
pub struct SystemThermal {
    sysfs: SysfsThermal,
    tool: SensorsTool,
}

impl SystemThermal {
    #[must_use]
    pub fn new(sysfs: SysfsThermal, tool: SensorsTool) -> Self {
        Self { sysfs, tool }
    }
}

impl ThermalReader for SystemThermal {
    fn read_all(&self) -> Vec<TemperatureReading> {
        let mut readings = self.sysfs.read_all();
        readings.extend(self.tool.read_all());
        readings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SENSORS_OUTPUT: &str = "\
coretemp-isa-0000
Adapter: ISA adapter
Package id 0:  +42.0°C  (high = +80.0°C, crit = +100.0°C)
Core 0:        +45.0°C  (high = +80.0°C, crit = +100.0°C)
Core 1:        +43.0°C  (high = +80.0°C, crit = +100.0°C)

nvme-pci-0100
Composite:    +38.9°C  (low  = -273.1°C, high = +84.8°C)
";

    fn write_zone(root: &Path, zone: &str, content: &str) {
        let dir = root.join(zone);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("temp"), content).unwrap();
    }

    #[test]
    fn test_parse_sensors_output_takes_cpu_maximum() {
        assert_eq!(parse_sensors_output(SENSORS_OUTPUT), Some(45.0));
    }

    #[test]
    fn test_parse_sensors_output_formats() {
        assert_eq!(parse_sensors_output("Tdie:         +61.5°C  (high = +70.0°C)"), Some(61.5));
        assert_eq!(parse_sensors_output("CPU Temperature:    +52.0°C"), Some(52.0));
        assert_eq!(parse_sensors_output("core 3:  +47.0C"), Some(47.0));
        assert_eq!(parse_sensors_output("Core 0:  -5.0°C"), Some(-5.0));
    }

    #[test]
    fn test_parse_sensors_output_without_cpu_lines() {
        assert_eq!(parse_sensors_output(""), None);
        assert_eq!(parse_sensors_output("Composite:    +38.9°C\nfan1: 1200 RPM"), None);
    }

    #[test]
    fn test_sysfs_zones() {
        let root = TempDir::new().unwrap();
        write_zone(root.path(), "thermal_zone0", "45000\n");
        write_zone(root.path(), "thermal_zone1", "61250\n");
        write_zone(root.path(), "thermal_zone2", "not a number\n");
        write_zone(root.path(), "cooling_device0", "99000\n");
        fs::create_dir_all(root.path().join("thermal_zone3")).unwrap();
        write_zone(root.path(), "thermal_zone4", "nan\n");
        write_zone(root.path(), "thermal_zone5", "inf\n");
        write_zone(root.path(), "thermal_zone6", "45000.5\n");

        let readings = SysfsThermal::with_root(root.path()).read_all();
        let celsius: Vec<f64> = readings.iter().map(|r| r.celsius).collect();
        assert_eq!(celsius, vec![45.0, 61.25]);
        assert!(matches!(readings[0].source, TemperatureSource::Sysfs { .. }));
    }

    #[test]
    fn test_sysfs_missing_root_is_empty() {
        assert!(SysfsThermal::with_root("/nonexistent/thermal").read_all().is_empty());
    }

    #[test]
    fn test_missing_tool_is_none() {
        let tool = SensorsTool::new().with_command("fanwhy-no-such-sensors-binary", &[]);
        assert!(matches!(tool.run(), Err(SensorError::Io(_))));
        assert_eq!(tool.read_max(), None);
        assert!(tool.read_all().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_tool_output_is_parsed() {
        let tool = SensorsTool::new().with_command("echo", &["Core 0:  +55.0°C"]);
        assert_eq!(tool.read_max(), Some(55.0));
        let readings = tool.read_all();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].source, TemperatureSource::SensorTool);
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_tool_is_none() {
        let tool = SensorsTool::new().with_command("false", &[]);
        assert!(tool.run().is_err());
        assert_eq!(tool.read_max(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_tool_is_killed() {
        let tool = SensorsTool::new()
            .with_command("sleep", &["5"])
            .with_timeout(Duration::from_millis(100));

        let started = Instant::now();
        let result = tool.run();
        assert!(matches!(result, Err(SensorError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(tool.read_max(), None);
    }

    #[test]
    fn test_read_millidegrees_requires_integer() {
        let root = TempDir::new().unwrap();
        write_zone(root.path(), "thermal_zone0", "-2500\n");
        write_zone(root.path(), "thermal_zone1", "NaN\n");
        let zone = |n: u32| root.path().join(format!("thermal_zone{n}")).join("temp");
        assert_eq!(read_millidegrees(&zone(0)).unwrap(), -2.5);
        assert!(matches!(read_millidegrees(&zone(1)), Err(SensorError::Parse { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_output_wait_shares_the_deadline() {
        // The shell exits near the deadline while a background child keeps stdout open.
        let tool = SensorsTool::new()
            .with_command("sh", &["-c", "sleep 5 & sleep 0.8; echo 'Core 0:  +50.0°C'"])
            .with_timeout(Duration::from_secs(1));

        let started = Instant::now();
        let result = tool.run();
        assert!(matches!(result, Err(SensorError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_millis(1500));
    }

    #[test]
    fn test_system_thermal_combines_sources() {
        let root = TempDir::new().unwrap();
        write_zone(root.path(), "thermal_zone0", "50000");
        let thermal = SystemThermal::new(
            SysfsThermal::with_root(root.path()),
            SensorsTool::new().with_command("fanwhy-no-such-sensors-binary", &[]),
        );
        let readings = thermal.read_all();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].celsius, 50.0);
    }
}
