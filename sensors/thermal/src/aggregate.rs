//! Reduce readings from several sources to one "hottest sensor" value.
//!
//! Sources are not correlated: a zone and a `sensors` line may describe the
//! same die, and the maximum is taken regardless.

use crate::thermal::{TemperatureReading, TemperatureSource};

/// The maximum of the hottest sysfs reading and the tool reading.
///
/// `None` only when neither source produced anything.
#[must_use]
pub fn max_of(sysfs: &[f64], tool: Option<f64>) -> Option<f64> {
    sysfs.iter().copied().chain(tool).reduce(f64::max)
}

/// [`max_of`] over a mixed list of readings.
#[must_use]
pub fn aggregate(readings: &[TemperatureReading]) -> Option<f64> {
    let (sysfs, tool): (Vec<&TemperatureReading>, Vec<&TemperatureReading>) = readings
        .iter()
        .partition(|reading| matches!(reading.source, TemperatureSource::Sysfs { .. }));
    let sysfs: Vec<f64> = sysfs.iter().map(|r| r.celsius).collect();
    max_of(&sysfs, tool.iter().map(|r| r.celsius).reduce(f64::max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_of() {
        assert_eq!(max_of(&[45.0, 52.5, 55.0], None), Some(55.0));
        assert_eq!(max_of(&[50.0, 55.0, 48.0], None), Some(55.0));
        assert_eq!(max_of(&[45.0, 52.5], Some(61.2)), Some(61.2));
        assert_eq!(max_of(&[70.0], Some(61.2)), Some(70.0));
        assert_eq!(max_of(&[], Some(61.2)), Some(61.2));
        assert_eq!(max_of(&[], None), None);
    }

    #[test]
    fn test_aggregate_mixed_sources() {
        let readings = vec![
            TemperatureReading {
                source: TemperatureSource::Sysfs {
                    path: "/sys/class/thermal/thermal_zone0/temp".to_owned(),
                },
                celsius: 48.0,
            },
            TemperatureReading {
                source: TemperatureSource::SensorTool,
                celsius: 52.0,
            },
        ];
        assert_eq!(aggregate(&readings), Some(52.0));
        assert_eq!(aggregate(&readings[..1]), Some(48.0));
        assert_eq!(aggregate(&[]), None);
    }
}
