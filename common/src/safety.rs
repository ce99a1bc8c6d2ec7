//! Conditions that force the action to idle before any preset or hysteresis
//! logic runs. Guards are evaluated in table order and the first match wins.

use crate::{
    config::{ClimateConfig, DOOR_OPEN_GRACE_MS},
    engine::EngineState,
    snapshot::InputSnapshot,
    types::{Branch, ForcedIdleReason},
};

type Guard = fn(&InputSnapshot, &ClimateConfig, &EngineState) -> Option<ForcedIdleReason>;

const HEATING_GUARDS: [Guard; 3] = [house_too_hot, door_open, unoccupied];
// Cooling has no house-wide temperature ceiling.
const COOLING_GUARDS: [Guard; 2] = [door_open, unoccupied];

pub fn check(
    snapshot: &InputSnapshot,
    config: &ClimateConfig,
    state: &EngineState,
    branch: Branch,
) -> Option<ForcedIdleReason> {
    let guards: &[Guard] = match branch {
        Branch::Heating => &HEATING_GUARDS,
        Branch::Cooling => &COOLING_GUARDS,
    };
    guards
        .iter()
        .find_map(|guard| guard(snapshot, config, state))
}

/// Trips at `average >= max`; once latched, holds until the average drops to
/// `max - recovery` or the sensor goes away.
pub fn house_limit_tripped(
    house_avg_temp_c: Option<f32>,
    config: &ClimateConfig,
    latched: bool,
) -> bool {
    let Some(average) = house_avg_temp_c else {
        return false;
    };
    average >= config.max_house_temp_c
        || (latched && average > config.max_house_temp_c - config.house_limit_recovery_c)
}

/// How long the door has been open, if it is open and the timer is running.
pub fn door_open_for_ms(snapshot: &InputSnapshot, state: &EngineState) -> Option<u64> {
    if !snapshot.door_open.value() {
        return None;
    }
    let since = state.door_open_since_ms.unwrap_or(snapshot.now_ms);
    Some(snapshot.now_ms.saturating_sub(since))
}

fn house_too_hot(
    snapshot: &InputSnapshot,
    config: &ClimateConfig,
    state: &EngineState,
) -> Option<ForcedIdleReason> {
    house_limit_tripped(snapshot.house_avg_temp_c, config, state.house_limit_latched)
        .then_some(ForcedIdleReason::HouseTooHot)
}

fn door_open(
    snapshot: &InputSnapshot,
    _config: &ClimateConfig,
    state: &EngineState,
) -> Option<ForcedIdleReason> {
    door_open_for_ms(snapshot, state)
        .filter(|open_ms| *open_ms >= DOOR_OPEN_GRACE_MS)
        .map(|_| ForcedIdleReason::DoorOpen)
}

fn unoccupied(
    snapshot: &InputSnapshot,
    _config: &ClimateConfig,
    _state: &EngineState,
) -> Option<ForcedIdleReason> {
    (!snapshot.someone_home.value()).then_some(ForcedIdleReason::Unoccupied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SensorReadings;

    fn snapshot(readings: SensorReadings) -> InputSnapshot {
        InputSnapshot::build(readings, &ClimateConfig::default()).unwrap()
    }

    #[test]
    fn house_ceiling_wins_over_door_and_presence() {
        let mut readings = SensorReadings::with_room(100_000, 20.0);
        readings.house_avg_temp_c = Some(25.0);
        readings.door_open = Some(true);
        readings.someone_home = Some(false);
        let state = EngineState {
            door_open_since_ms: Some(0),
            ..EngineState::default()
        };
        let config = ClimateConfig::default();

        assert_eq!(
            check(&snapshot(readings.clone()), &config, &state, Branch::Heating),
            Some(ForcedIdleReason::HouseTooHot)
        );
        assert_eq!(
            check(&snapshot(readings), &config, &state, Branch::Cooling),
            Some(ForcedIdleReason::DoorOpen)
        );
    }

    #[test]
    fn door_needs_full_grace_period() {
        let config = ClimateConfig::default();
        let state = EngineState {
            door_open_since_ms: Some(10_000),
            ..EngineState::default()
        };

        let mut readings = SensorReadings::with_room(79_999, 20.0);
        readings.door_open = Some(true);
        assert_eq!(
            check(&snapshot(readings.clone()), &config, &state, Branch::Heating),
            None
        );

        readings.now_ms = 80_000;
        assert_eq!(
            check(&snapshot(readings), &config, &state, Branch::Heating),
            Some(ForcedIdleReason::DoorOpen)
        );
    }

    #[test]
    fn door_opened_this_cycle_is_not_forced() {
        let mut readings = SensorReadings::with_room(500_000, 20.0);
        readings.door_open = Some(true);

        assert_eq!(
            check(
                &snapshot(readings),
                &ClimateConfig::default(),
                &EngineState::default(),
                Branch::Heating
            ),
            None
        );
    }

    #[test]
    fn missing_presence_tracker_counts_as_home() {
        let readings = SensorReadings::with_room(0, 20.0);
        let config = ClimateConfig::default();
        let state = EngineState::default();

        assert_eq!(
            check(&snapshot(readings.clone()), &config, &state, Branch::Heating),
            None
        );

        let mut away = readings;
        away.someone_home = Some(false);
        assert_eq!(
            check(&snapshot(away), &config, &state, Branch::Cooling),
            Some(ForcedIdleReason::Unoccupied)
        );
    }

    #[test]
    fn house_limit_latch_releases_below_recovery_band() {
        let config = ClimateConfig::default();

        assert!(!house_limit_tripped(Some(24.9), &config, false));
        assert!(house_limit_tripped(Some(25.0), &config, false));
        assert!(house_limit_tripped(Some(24.7), &config, true));
        assert!(!house_limit_tripped(Some(24.5), &config, true));
        assert!(!house_limit_tripped(None, &config, true));
    }
}
