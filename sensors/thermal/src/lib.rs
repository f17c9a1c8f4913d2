//! Temperature readings for fanwhy.
//!
//! Two independent sources are consulted: kernel thermal zones under
//! `/sys/class/thermal` and the lm-sensors `sensors` tool. Either may be
//! missing; [`aggregate`] reports the hottest value from whatever answered.

pub mod aggregate;
pub mod thermal;

pub use aggregate::{aggregate, max_of};
pub use thermal::{
    parse_sensors_output, read_millidegrees, SensorsTool, SysfsThermal, SystemThermal, TemperatureReading,
    TemperatureSource, ThermalReader,
};
