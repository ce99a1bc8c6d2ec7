use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use smart_climate_common::{
    HvacMode, InputSource, ScheduleMode, SensorReadings, TOPIC_CMD_ENABLE, TOPIC_CMD_FORCE_COMFORT,
    TOPIC_CMD_FORCE_COOLING, TOPIC_CMD_FORCE_ECO, TOPIC_CMD_MODE, TOPIC_SCHEDULE_STATE,
    TOPIC_SENSOR_BED_PREFIX, TOPIC_SENSOR_DOOR, TOPIC_SENSOR_HOUSE_AVG_TEMP,
    TOPIC_SENSOR_OUTSIDE_TEMP, TOPIC_SENSOR_PRESENCE, TOPIC_SENSOR_ROOM_TEMP,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("unrecognized value {payload:?} on {topic}")]
    Unparsable { topic: String, payload: String },
    #[error("no input is bound to topic {0}")]
    UnknownTopic(String),
}

/// What a message changed, so the caller knows whether to re-run a cycle early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputUpdate {
    Sensor,
    Command,
}

#[derive(Debug, Clone, Copy)]
struct Timed<T> {
    value: Option<T>,
    at_ms: u64,
}

/// Commands do not go stale; they hold until changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Commands {
    pub enabled: bool,
    pub mode: HvacMode,
    #[serde(rename = "forceComfort")]
    pub force_comfort: bool,
    #[serde(rename = "forceEco")]
    pub force_eco: bool,
    #[serde(rename = "forceCooling")]
    pub force_cooling: bool,
}

impl Default for Commands {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: HvacMode::Auto,
            force_comfort: false,
            force_eco: false,
            force_cooling: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceSwitch {
    Comfort,
    Eco,
    Cooling,
}

impl ForceSwitch {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "comfort" => Some(Self::Comfort),
            "eco" => Some(Self::Eco),
            "cooling" => Some(Self::Cooling),
            _ => None,
        }
    }
}

impl Commands {
    pub fn set_force(&mut self, switch: ForceSwitch, on: bool) -> bool {
        let slot = match switch {
            ForceSwitch::Comfort => &mut self.force_comfort,
            ForceSwitch::Eco => &mut self.force_eco,
            ForceSwitch::Cooling => &mut self.force_cooling,
        };
        let changed = *slot != on;
        *slot = on;
        changed
    }
}

/// Latest value seen on every input topic.
#[derive(Debug, Clone)]
pub struct InputCache {
    stale_after_ms: u64,
    room: Option<Timed<f32>>,
    outside: Option<Timed<f32>>,
    house_avg: Option<Timed<f32>>,
    door: Option<Timed<bool>>,
    presence: Option<Timed<bool>>,
    beds: BTreeMap<String, Timed<bool>>,
    schedule: Option<Timed<String>>,
    pub commands: Commands,
}

impl InputCache {
    pub fn new(stale_after_ms: u64) -> Self {
        Self {
            stale_after_ms,
            room: None,
            outside: None,
            house_avg: None,
            door: None,
            presence: None,
            beds: BTreeMap::new(),
            schedule: None,
            commands: Commands::default(),
        }
    }

    pub fn apply(
        &mut self,
        topic: &str,
        payload: &str,
        now_ms: u64,
    ) -> Result<InputUpdate, InputError> {
        let payload = payload.trim();
        let unparsable = || InputError::Unparsable {
            topic: topic.to_string(),
            payload: payload.to_string(),
        };

        match topic {
            TOPIC_SENSOR_ROOM_TEMP => {
                self.room = Some(timed(parse_temperature(payload).ok_or_else(unparsable)?, now_ms))
            }
            TOPIC_SENSOR_OUTSIDE_TEMP => {
                self.outside =
                    Some(timed(parse_temperature(payload).ok_or_else(unparsable)?, now_ms))
            }
            TOPIC_SENSOR_HOUSE_AVG_TEMP => {
                self.house_avg =
                    Some(timed(parse_temperature(payload).ok_or_else(unparsable)?, now_ms))
            }
            TOPIC_SENSOR_DOOR => {
                self.door = Some(timed(parse_state(payload).ok_or_else(unparsable)?, now_ms))
            }
            TOPIC_SENSOR_PRESENCE => {
                self.presence = Some(timed(parse_state(payload).ok_or_else(unparsable)?, now_ms))
            }
            TOPIC_SCHEDULE_STATE => {
                let label = (!is_unavailable(payload)).then(|| payload.to_ascii_lowercase());
                self.schedule = Some(timed(label, now_ms));
            }
            TOPIC_CMD_ENABLE => {
                self.commands.enabled = parse_switch(payload).ok_or_else(unparsable)?;
                return Ok(InputUpdate::Command);
            }
            TOPIC_CMD_MODE => {
                self.commands.mode = HvacMode::parse(payload).ok_or_else(unparsable)?;
                return Ok(InputUpdate::Command);
            }
            TOPIC_CMD_FORCE_COMFORT | TOPIC_CMD_FORCE_ECO | TOPIC_CMD_FORCE_COOLING => {
                let switch = match topic {
                    TOPIC_CMD_FORCE_COMFORT => ForceSwitch::Comfort,
                    TOPIC_CMD_FORCE_ECO => ForceSwitch::Eco,
                    _ => ForceSwitch::Cooling,
                };
                let on = parse_switch(payload).ok_or_else(unparsable)?;
                self.commands.set_force(switch, on);
                return Ok(InputUpdate::Command);
            }
            _ => {
                let Some(name) = topic.strip_prefix(TOPIC_SENSOR_BED_PREFIX) else {
                    return Err(InputError::UnknownTopic(topic.to_string()));
                };
                let occupied = parse_state(payload).ok_or_else(unparsable)?;
                self.beds.insert(name.to_string(), timed(occupied, now_ms));
            }
        }

        Ok(InputUpdate::Sensor)
    }

    /// `schedule` overrides the schedule topic when the built-in schedule is active.
    pub fn readings(&self, now_ms: u64, schedule: Option<ScheduleMode>) -> SensorReadings {
        let fresh = |at_ms: u64| now_ms.saturating_sub(at_ms) < self.stale_after_ms;
        let current = |entry: Option<Timed<f32>>| {
            entry
                .filter(|entry| fresh(entry.at_ms))
                .and_then(|entry| entry.value)
        };
        let current_state = |entry: Option<Timed<bool>>| {
            entry
                .filter(|entry| fresh(entry.at_ms))
                .and_then(|entry| entry.value)
        };

        let schedule = match schedule {
            Some(mode) => Some(mode.as_str().to_string()),
            None => self
                .schedule
                .as_ref()
                .filter(|entry| fresh(entry.at_ms))
                .and_then(|entry| entry.value.clone()),
        };

        SensorReadings {
            now_ms,
            room_temp_c: current(self.room),
            outside_temp_c: current(self.outside),
            house_avg_temp_c: current(self.house_avg),
            door_open: current_state(self.door),
            someone_home: current_state(self.presence),
            // A known bed that went quiet counts as empty, not as missing.
            bed_occupied: self
                .beds
                .values()
                .map(|entry| fresh(entry.at_ms) && entry.value == Some(true))
                .collect(),
            schedule,
            enabled: self.commands.enabled,
            force_comfort: self.commands.force_comfort,
            force_eco: self.commands.force_eco,
            force_cooling: self.commands.force_cooling,
            mode: self.commands.mode,
        }
    }
}

/// One cycle's view of the cache, taken at a fixed instant.
pub struct CacheReader<'a> {
    cache: &'a InputCache,
    now_ms: u64,
    schedule: Option<ScheduleMode>,
}

impl<'a> CacheReader<'a> {
    pub fn new(cache: &'a InputCache, now_ms: u64, schedule: Option<ScheduleMode>) -> Self {
        Self {
            cache,
            now_ms,
            schedule,
        }
    }
}

impl InputSource for CacheReader<'_> {
    fn read(&mut self) -> SensorReadings {
        self.cache.readings(self.now_ms, self.schedule)
    }
}

fn timed<T>(value: Option<T>, at_ms: u64) -> Timed<T> {
    Timed { value, at_ms }
}

fn is_unavailable(payload: &str) -> bool {
    payload.is_empty()
        || payload.eq_ignore_ascii_case("unknown")
        || payload.eq_ignore_ascii_case("unavailable")
}

/// `Some(None)` when the sensor reports itself unavailable, `None` when the
/// payload makes no sense.
fn parse_temperature(payload: &str) -> Option<Option<f32>> {
    if is_unavailable(payload) {
        return Some(None);
    }
    payload.parse::<f32>().ok().map(Some)
}

fn parse_state(payload: &str) -> Option<Option<bool>> {
    if is_unavailable(payload) {
        return Some(None);
    }
    parse_switch(payload).map(Some)
}

pub fn parse_switch(payload: &str) -> Option<bool> {
    match payload.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "open" | "home" | "occupied" => Some(true),
        "off" | "false" | "0" | "closed" | "not_home" | "away" | "clear" => Some(false),
        _ => None,
    }
}
