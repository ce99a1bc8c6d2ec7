use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Preset;

/// A door must stay open this long before the guard forces idle.
pub const DOOR_OPEN_GRACE_MS: u64 = 70_000;

pub const HEATING_PRESET_RANGE_C: (f32, f32) = (16.0, 25.0);
pub const COOLING_PRESET_RANGE_C: (f32, f32) = (18.0, 28.0);
pub const DEADBAND_RANGE_C: (f32, f32) = (0.1, 2.0);
pub const MAX_HOUSE_TEMP_RANGE_C: (f32, f32) = (20.0, 30.0);
pub const COMP_FACTOR_RANGE: (f32, f32) = (0.0, 1.0);
pub const MIN_COMP_TEMP_RANGE_C: (f32, f32) = (14.0, 20.0);
pub const MAX_COMP_TEMP_RANGE_C: (f32, f32) = (20.0, 30.0);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} = {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("min_comp_temp_c ({min}) must be below max_comp_temp_c ({max})")]
    CompensationBounds { min: f32, max: f32 },
    #[error("sensor_valid_min_c ({min}) must be below sensor_valid_max_c ({max})")]
    SensorBounds { min: f32, max: f32 },
    #[error("{field} must be greater than zero")]
    ZeroInterval { field: &'static str },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateConfig {
    pub comfort_temp_c: f32,
    pub eco_temp_c: f32,
    pub boost_temp_c: f32,
    pub cooling_temp_c: f32,
    pub deadband_below_c: f32,
    pub deadband_above_c: f32,
    pub max_house_temp_c: f32,
    pub weather_comp_factor: f32,
    pub min_comp_temp_c: f32,
    pub max_comp_temp_c: f32,
    pub max_compensation_c: f32,
    pub house_limit_recovery_c: f32,
    pub sleep_confirm_ms: u64,
    pub outside_fallback_c: f32,
    pub sensor_valid_min_c: f32,
    pub sensor_valid_max_c: f32,
}

impl Default for ClimateConfig {
    fn default() -> Self {
        Self {
            comfort_temp_c: 20.0,
            eco_temp_c: 18.0,
            boost_temp_c: 23.0,
            cooling_temp_c: 24.0,
            deadband_below_c: 0.5,
            deadband_above_c: 0.5,
            max_house_temp_c: 25.0,
            weather_comp_factor: 0.5,
            min_comp_temp_c: 16.0,
            max_comp_temp_c: 25.0,
            max_compensation_c: 5.0,
            house_limit_recovery_c: 0.5,
            sleep_confirm_ms: 0,
            outside_fallback_c: 5.0,
            sensor_valid_min_c: -50.0,
            sensor_valid_max_c: 50.0,
        }
    }
}

impl ClimateConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check("comfort_temp_c", self.comfort_temp_c, HEATING_PRESET_RANGE_C)?;
        check("eco_temp_c", self.eco_temp_c, HEATING_PRESET_RANGE_C)?;
        check("boost_temp_c", self.boost_temp_c, HEATING_PRESET_RANGE_C)?;
        check("cooling_temp_c", self.cooling_temp_c, COOLING_PRESET_RANGE_C)?;
        check("deadband_below_c", self.deadband_below_c, DEADBAND_RANGE_C)?;
        check("deadband_above_c", self.deadband_above_c, DEADBAND_RANGE_C)?;
        check("max_house_temp_c", self.max_house_temp_c, MAX_HOUSE_TEMP_RANGE_C)?;
        check("weather_comp_factor", self.weather_comp_factor, COMP_FACTOR_RANGE)?;
        check("min_comp_temp_c", self.min_comp_temp_c, MIN_COMP_TEMP_RANGE_C)?;
        check("max_comp_temp_c", self.max_comp_temp_c, MAX_COMP_TEMP_RANGE_C)?;
        check("max_compensation_c", self.max_compensation_c, (0.0, 10.0))?;
        check(
            "house_limit_recovery_c",
            self.house_limit_recovery_c,
            (0.0, 5.0),
        )?;
        check("outside_fallback_c", self.outside_fallback_c, (0.0, 30.0))?;

        if self.min_comp_temp_c >= self.max_comp_temp_c {
            return Err(ConfigError::CompensationBounds {
                min: self.min_comp_temp_c,
                max: self.max_comp_temp_c,
            });
        }
        if !(self.sensor_valid_min_c < self.sensor_valid_max_c) {
            return Err(ConfigError::SensorBounds {
                min: self.sensor_valid_min_c,
                max: self.sensor_valid_max_c,
            });
        }
        Ok(())
    }

    /// Configured temperature for `preset`, clamped to that preset's valid range.
    pub fn preset_target_c(&self, preset: Preset) -> f32 {
        let (raw, (min, max)) = match preset {
            Preset::Comfort => (self.comfort_temp_c, HEATING_PRESET_RANGE_C),
            Preset::Eco => (self.eco_temp_c, HEATING_PRESET_RANGE_C),
            Preset::Boost => (self.boost_temp_c, HEATING_PRESET_RANGE_C),
            Preset::Cooling => (self.cooling_temp_c, COOLING_PRESET_RANGE_C),
        };
        raw.clamp(min, max)
    }

    pub fn is_valid_reading(&self, value: f32) -> bool {
        value.is_finite() && (self.sensor_valid_min_c..=self.sensor_valid_max_c).contains(&value)
    }
}

fn check(field: &'static str, value: f32, (min, max): (f32, f32)) -> Result<(), ConfigError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub cycle_interval_ms: u64,
    pub sensor_stale_timeout_ms: u64,
    pub state_publish_interval_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cycle_interval_ms: 60_000,
            sensor_stale_timeout_ms: 300_000,
            state_publish_interval_ms: 10_000,
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycle_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "cycle_interval_ms",
            });
        }
        if self.state_publish_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "state_publish_interval_ms",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub heat_pump_topic: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "192.168.1.100".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            heat_pump_topic: crate::topics::TOPIC_HEAT_PUMP_SET.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub climate: ClimateConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub network: NetworkConfig,
}

fn default_timezone() -> String {
    "Europe/Helsinki".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            climate: ClimateConfig::default(),
            controller: ControllerConfig::default(),
            timezone: default_timezone(),
            network: NetworkConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.climate.validate()?;
        self.controller.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(RuntimeConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_out_of_range_deadband() {
        let config = ClimateConfig {
            deadband_above_c: 2.5,
            ..ClimateConfig::default()
        };

        assert_eq!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "deadband_above_c",
                value: 2.5,
                min: 0.1,
                max: 2.0,
            })
        );
    }

    #[test]
    fn rejects_non_finite_values() {
        let config = ClimateConfig {
            weather_comp_factor: f32::NAN,
            ..ClimateConfig::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "weather_comp_factor",
                ..
            })
        ));
    }

    #[test]
    fn rejects_inverted_compensation_bounds() {
        let config = ClimateConfig {
            min_comp_temp_c: 20.0,
            max_comp_temp_c: 20.0,
            ..ClimateConfig::default()
        };

        assert_eq!(
            config.validate(),
            Err(ConfigError::CompensationBounds {
                min: 20.0,
                max: 20.0
            })
        );
    }

    #[test]
    fn preset_target_is_clamped_to_range() {
        let config = ClimateConfig {
            boost_temp_c: 40.0,
            cooling_temp_c: 10.0,
            ..ClimateConfig::default()
        };

        assert_eq!(config.preset_target_c(Preset::Boost), 25.0);
        assert_eq!(config.preset_target_c(Preset::Cooling), 18.0);
        assert_eq!(config.preset_target_c(Preset::Eco), 18.0);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let runtime: RuntimeConfig =
            serde_json::from_str(r#"{"climate":{"comfort_temp_c":21.5}}"#).unwrap();

        assert_eq!(runtime.climate.comfort_temp_c, 21.5);
        assert_eq!(runtime.climate.eco_temp_c, 18.0);
        assert_eq!(runtime.controller.cycle_interval_ms, 60_000);
        assert_eq!(runtime.timezone, "Europe/Helsinki");
    }

    #[test]
    fn reading_validity_uses_sensor_window() {
        let config = ClimateConfig::default();

        assert!(config.is_valid_reading(-50.0));
        assert!(config.is_valid_reading(21.3));
        assert!(!config.is_valid_reading(50.1));
        assert!(!config.is_valid_reading(f32::INFINITY));
    }
}
