pub mod command;
pub mod compensation;
pub mod config;
pub mod engine;
pub mod hysteresis;
pub mod preset;
pub mod safety;
pub mod schedule;
pub mod scheduler;
pub mod snapshot;
pub mod topics;
pub mod types;

pub use command::{CommandTracker, HeatPumpCommand, HeatPumpMode};
pub use config::{ClimateConfig, ConfigError, ControllerConfig, NetworkConfig, RuntimeConfig};
pub use engine::{route, BranchStrategy, CycleOutcome, EngineState};
pub use schedule::{DayOfWeek, Schedule, ScheduleEntry};
pub use scheduler::{Actuator, ActuatorError, CycleScheduler, InputSource};
pub use snapshot::{CycleError, InputSnapshot, Sensed, SensorReadings};
pub use topics::*;
pub use types::{
    Action, Branch, ClimateStatus, Decision, ForcedIdleReason, HvacMode, Preset, PresetSource,
    Reason, ScheduleMode,
};
