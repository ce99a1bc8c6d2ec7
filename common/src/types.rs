use serde::{Deserialize, Serialize, Serializer};

/// Operating mode commanded from outside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HvacMode {
    Off,
    Heat,
    Cool,
    Auto,
}

impl HvacMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Heat => "HEAT",
            Self::Cool => "COOL",
            Self::Auto => "AUTO",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "OFF" => Some(Self::Off),
            "HEAT" => Some(Self::Heat),
            "COOL" => Some(Self::Cool),
            "AUTO" => Some(Self::Auto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    #[default]
    Idle,
    Active,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Active => "ACTIVE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    Heating,
    Cooling,
}

impl Branch {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heating => "heating",
            Self::Cooling => "cooling",
        }
    }
}

/// Named target-temperature profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Comfort,
    Eco,
    Boost,
    Cooling,
}

impl Preset {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Comfort => "comfort",
            Self::Eco => "eco",
            Self::Boost => "boost",
            Self::Cooling => "cooling",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Comfort => "Comfort",
            Self::Eco => "Eco",
            Self::Boost => "Boost",
            Self::Cooling => "Cooling",
        }
    }
}

/// Mode reported by a schedule entity or the built-in weekly schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    Comfort,
    Eco,
    Boost,
    Off,
}

impl ScheduleMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Comfort => "comfort",
            Self::Eco => "eco",
            Self::Boost => "boost",
            Self::Off => "off",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "comfort" => Some(Self::Comfort),
            "eco" => Some(Self::Eco),
            "boost" => Some(Self::Boost),
            "off" => Some(Self::Off),
            _ => None,
        }
    }
}

/// Condition that mandates an idle action regardless of hysteresis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcedIdleReason {
    HouseTooHot,
    DoorOpen,
    Unoccupied,
    ScheduledOff,
}

impl ForcedIdleReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HouseTooHot => "house-too-hot",
            Self::DoorOpen => "door-open",
            Self::Unoccupied => "unoccupied",
            Self::ScheduledOff => "scheduled-off",
        }
    }
}

/// Why a cycle produced the action it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Disabled,
    ModeOff,
    Forced(ForcedIdleReason),
    Demand(Branch),
    TargetReached,
    InDeadband,
    RoomSensorUnavailable,
    RoomSensorInvalid,
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::ModeOff => "mode-off",
            Self::Forced(reason) => reason.as_str(),
            Self::Demand(Branch::Heating) => "heating-needed",
            Self::Demand(Branch::Cooling) => "cooling-needed",
            Self::TargetReached => "target-reached",
            Self::InDeadband => "in-deadband",
            Self::RoomSensorUnavailable => "room-sensor-unavailable",
            Self::RoomSensorInvalid => "room-sensor-invalid",
        }
    }
}

impl Serialize for Reason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Rule in the preset cascade that picked the active preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetSource {
    ForceComfort,
    ForceEco,
    Sleep,
    Schedule(ScheduleMode),
    Default,
    Cooling,
}

impl PresetSource {
    pub fn label(self) -> &'static str {
        match self {
            Self::ForceComfort => "force_comfort",
            Self::ForceEco => "force_eco",
            Self::Sleep => "sleep_eco",
            Self::Schedule(mode) => mode.as_str(),
            Self::Default => "default_comfort",
            Self::Cooling => "cooling",
        }
    }
}

impl Serialize for PresetSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Which optional inputs were missing or invalid this cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SensorFlags {
    #[serde(rename = "outsideFallback")]
    pub outside_fallback: bool,
    #[serde(rename = "houseAverageMissing")]
    pub house_average_missing: bool,
    #[serde(rename = "doorMissing")]
    pub door_missing: bool,
    #[serde(rename = "presenceMissing")]
    pub presence_missing: bool,
    #[serde(rename = "scheduleUnrecognized")]
    pub schedule_unrecognized: bool,
    #[serde(rename = "invalidReadings")]
    pub invalid_readings: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionDiagnostics {
    #[serde(rename = "rawTarget")]
    pub raw_target_c: Option<f32>,
    #[serde(rename = "compensation")]
    pub compensation_c: f32,
    #[serde(rename = "lowerBound")]
    pub lower_bound_c: Option<f32>,
    #[serde(rename = "upperBound")]
    pub upper_bound_c: Option<f32>,
    pub reason: Reason,
    #[serde(rename = "roomTemp")]
    pub room_temp_c: f32,
    #[serde(rename = "outsideTemp")]
    pub outside_temp_c: f32,
    #[serde(rename = "houseAverageTemp")]
    pub house_avg_temp_c: Option<f32>,
    pub sensors: SensorFlags,
}

/// Output of one evaluation cycle, handed to the actuator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub action: Action,
    pub branch: Option<Branch>,
    #[serde(rename = "targetTemp")]
    pub target_temp_c: Option<f32>,
    pub preset: Option<Preset>,
    #[serde(rename = "activeMode")]
    pub active_mode: Option<PresetSource>,
    #[serde(rename = "decidedAtMs")]
    pub decided_at_ms: u64,
    pub diagnostics: DecisionDiagnostics,
}

impl Decision {
    /// One-line status, e.g. `ON | Comfort 22.0°C | R: 21.0°C | H: N/A | O: -4.0°C | heating-needed`.
    pub fn summary(&self) -> String {
        let diag = &self.diagnostics;
        let house = diag
            .house_avg_temp_c
            .map(|temp| format!("{temp:.1}°C"))
            .unwrap_or_else(|| "N/A".to_string());
        let readings = format!(
            "R: {:.1}°C | H: {house} | O: {:.1}°C",
            diag.room_temp_c, diag.outside_temp_c
        );

        match (self.action, self.preset, self.target_temp_c) {
            (Action::Active, Some(preset), Some(target)) => format!(
                "ON | {} {target:.1}°C | {readings} | {}",
                preset.display_name(),
                diag.reason.as_str()
            ),
            _ => format!("OFF | {readings} | {}", diag.reason.as_str()),
        }
    }
}

/// Read-only diagnostic surface published by the controller.
#[derive(Debug, Clone, Serialize)]
pub struct ClimateStatus {
    pub action: &'static str,
    pub branch: Option<&'static str>,
    #[serde(rename = "targetTemp")]
    pub target_temp: Option<f32>,
    pub preset: Option<&'static str>,
    #[serde(rename = "activeMode")]
    pub active_mode: Option<&'static str>,
    pub reason: &'static str,
    pub summary: String,
    #[serde(rename = "rawTarget")]
    pub raw_target: Option<f32>,
    pub compensation: f32,
    #[serde(rename = "deadbandLower")]
    pub deadband_lower: Option<f32>,
    #[serde(rename = "deadbandUpper")]
    pub deadband_upper: Option<f32>,
    #[serde(rename = "hysteresisAction")]
    pub hysteresis_action: &'static str,
    #[serde(rename = "doorOpenForMs")]
    pub door_open_for_ms: Option<u64>,
    #[serde(rename = "sleepActive")]
    pub sleep_active: bool,
    #[serde(rename = "houseLimitLatched")]
    pub house_limit_latched: bool,
    pub sensors: SensorFlags,
    #[serde(rename = "lastDecision")]
    pub last_decision: Option<Decision>,
    #[serde(rename = "lastError")]
    pub last_error: Option<String>,
    #[serde(rename = "lastActuationError")]
    pub last_actuation_error: Option<String>,
    pub cycles: u64,
    #[serde(rename = "abortedCycles")]
    pub aborted_cycles: u64,
}
