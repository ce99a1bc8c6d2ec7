use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::ClimateConfig,
    types::{HvacMode, Reason, ScheduleMode, SensorFlags},
};

/// Raw values as read from the input collaborator. Every sensor may be absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReadings {
    pub now_ms: u64,
    pub room_temp_c: Option<f32>,
    pub outside_temp_c: Option<f32>,
    pub house_avg_temp_c: Option<f32>,
    pub door_open: Option<bool>,
    pub someone_home: Option<bool>,
    pub bed_occupied: Vec<bool>,
    pub schedule: Option<String>,
    pub enabled: bool,
    pub force_comfort: bool,
    pub force_eco: bool,
    pub force_cooling: bool,
    pub mode: HvacMode,
}

impl SensorReadings {
    /// Readings with only a room temperature and the controller's power-on commands.
    pub fn with_room(now_ms: u64, room_temp_c: f32) -> Self {
        Self {
            now_ms,
            room_temp_c: Some(room_temp_c),
            outside_temp_c: None,
            house_avg_temp_c: None,
            door_open: None,
            someone_home: None,
            bed_occupied: Vec::new(),
            schedule: None,
            enabled: true,
            force_comfort: false,
            force_eco: false,
            force_cooling: false,
            mode: HvacMode::Auto,
        }
    }
}

/// An optional input, either measured or substituted with its documented default.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sensed<T> {
    Measured(T),
    Default(T),
}

impl<T: Copy> Sensed<T> {
    pub fn from_option(value: Option<T>, default: T) -> Self {
        match value {
            Some(value) => Self::Measured(value),
            None => Self::Default(default),
        }
    }

    pub fn value(self) -> T {
        match self {
            Self::Measured(value) | Self::Default(value) => value,
        }
    }

    pub fn is_measured(self) -> bool {
        matches!(self, Self::Measured(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CycleError {
    #[error("room temperature sensor unavailable")]
    RoomSensorUnavailable,
    #[error("room temperature reading {0} is invalid")]
    RoomSensorInvalid(f32),
}

impl From<CycleError> for Reason {
    fn from(err: CycleError) -> Self {
        match err {
            CycleError::RoomSensorUnavailable => Reason::RoomSensorUnavailable,
            CycleError::RoomSensorInvalid(_) => Reason::RoomSensorInvalid,
        }
    }
}

/// Validated, immutable view of one cycle's inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSnapshot {
    pub now_ms: u64,
    pub room_temp_c: f32,
    pub outside_temp_c: Sensed<f32>,
    pub house_avg_temp_c: Option<f32>,
    pub door_open: Sensed<bool>,
    pub someone_home: Sensed<bool>,
    pub bed_occupied: Vec<bool>,
    pub schedule: Option<ScheduleMode>,
    pub enabled: bool,
    pub force_comfort: bool,
    pub force_eco: bool,
    pub force_cooling: bool,
    pub mode: HvacMode,
    pub flags: SensorFlags,
}

impl InputSnapshot {
    /// Validates raw readings. Fails only when the room temperature is unusable;
    /// every other input falls back to its default and is flagged.
    pub fn build(readings: SensorReadings, config: &ClimateConfig) -> Result<Self, CycleError> {
        let room_temp_c = match readings.room_temp_c {
            None => return Err(CycleError::RoomSensorUnavailable),
            Some(value) if !config.is_valid_reading(value) => {
                return Err(CycleError::RoomSensorInvalid(value))
            }
            Some(value) => value,
        };

        let mut flags = SensorFlags::default();

        let outside = validated(readings.outside_temp_c, config, &mut flags);
        flags.outside_fallback = outside.is_none();
        let outside_temp_c = Sensed::from_option(outside, config.outside_fallback_c);

        let house_avg_temp_c = validated(readings.house_avg_temp_c, config, &mut flags);
        flags.house_average_missing = house_avg_temp_c.is_none();

        flags.door_missing = readings.door_open.is_none();
        flags.presence_missing = readings.someone_home.is_none();

        let schedule = readings.schedule.as_deref().and_then(|label| {
            let parsed = ScheduleMode::parse(label);
            flags.schedule_unrecognized = parsed.is_none();
            parsed
        });

        Ok(Self {
            now_ms: readings.now_ms,
            room_temp_c,
            outside_temp_c,
            house_avg_temp_c,
            door_open: Sensed::from_option(readings.door_open, false),
            someone_home: Sensed::from_option(readings.someone_home, true),
            bed_occupied: readings.bed_occupied,
            schedule,
            enabled: readings.enabled,
            force_comfort: readings.force_comfort,
            force_eco: readings.force_eco,
            force_cooling: readings.force_cooling,
            mode: readings.mode,
            flags,
        })
    }

    /// At least one bed sensor reports and all of them are occupied.
    pub fn beds_occupied(&self) -> bool {
        !self.bed_occupied.is_empty() && self.bed_occupied.iter().all(|occupied| *occupied)
    }
}

fn validated(value: Option<f32>, config: &ClimateConfig, flags: &mut SensorFlags) -> Option<f32> {
    match value {
        Some(value) if config.is_valid_reading(value) => Some(value),
        Some(_) => {
            flags.invalid_readings = flags.invalid_readings.saturating_add(1);
            None
        }
        None => None,
    }
}
