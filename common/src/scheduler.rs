//! Cycle driver: owns `EngineState`, wall-clock bookkeeping and the last
//! published decision.
//!
//! A cycle that cannot build a snapshot leaves state and the last decision
//! untouched (fail-static) and is reported through the status surface.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    config::ClimateConfig,
    engine::{route, EngineState},
    preset::sleep_detected,
    safety::{door_open_for_ms, house_limit_tripped},
    snapshot::{CycleError, InputSnapshot, SensorReadings},
    types::{ClimateStatus, Decision, Reason},
};

/// Input collaborator: current readings plus the timestamp they were taken at.
pub trait InputSource {
    fn read(&mut self) -> SensorReadings;
}

/// Actuator collaborator: issues the real heat/cool/off command.
pub trait Actuator {
    fn apply(&mut self, decision: &Decision) -> Result<(), ActuatorError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActuatorError {
    #[error("actuator rejected command: {0}")]
    Rejected(String),
    #[error("actuator transport failed: {0}")]
    Transport(String),
}

/// Timestamps are set on the first cycle a condition is observed and cleared on
/// the first cycle it is not, so durations follow the wall clock rather than
/// the number of cycles.
pub fn advance_timers(state: &mut EngineState, snapshot: &InputSnapshot, config: &ClimateConfig) {
    if snapshot.door_open.value() {
        if state.door_open_since_ms.is_none() {
            debug!(now_ms = snapshot.now_ms, "door opened");
            state.door_open_since_ms = Some(snapshot.now_ms);
        }
    } else if state.door_open_since_ms.take().is_some() {
        debug!(now_ms = snapshot.now_ms, "door closed");
    }

    if snapshot.beds_occupied() {
        state.sleep_confirmed_since_ms.get_or_insert(snapshot.now_ms);
    } else {
        state.sleep_confirmed_since_ms = None;
    }

    let tripped = house_limit_tripped(snapshot.house_avg_temp_c, config, state.house_limit_latched);
    if tripped != state.house_limit_latched {
        info!(
            average = ?snapshot.house_avg_temp_c,
            latched = tripped,
            "house temperature limit changed"
        );
    }
    state.house_limit_latched = tripped;
}

#[derive(Debug, Clone)]
pub struct CycleScheduler {
    config: ClimateConfig,
    interval_ms: u64,
    state: EngineState,
    last_snapshot: Option<InputSnapshot>,
    last_decision: Option<Decision>,
    last_error: Option<CycleError>,
    last_actuation_error: Option<ActuatorError>,
    cycles: u64,
    aborted_cycles: u64,
}

impl CycleScheduler {
    pub fn new(config: ClimateConfig, interval_ms: u64) -> Self {
        Self {
            config,
            interval_ms,
            state: EngineState::default(),
            last_snapshot: None,
            last_decision: None,
            last_error: None,
            last_actuation_error: None,
            cycles: 0,
            aborted_cycles: 0,
        }
    }

    pub fn config(&self) -> &ClimateConfig {
        &self.config
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn last_decision(&self) -> Option<&Decision> {
        self.last_decision.as_ref()
    }

    pub fn last_error(&self) -> Option<CycleError> {
        self.last_error
    }

    /// Runs one evaluation. Only the most recent readings matter; missed
    /// cycles are never replayed.
    pub fn run_cycle(&mut self, readings: SensorReadings) -> Result<Decision, CycleError> {
        self.cycles = self.cycles.saturating_add(1);

        let snapshot = match InputSnapshot::build(readings, &self.config) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("cycle aborted, holding previous decision: {err}");
                self.aborted_cycles = self.aborted_cycles.saturating_add(1);
                self.last_error = Some(err);
                return Err(err);
            }
        };

        let mut state = self.state.clone();
        advance_timers(&mut state, &snapshot, &self.config);
        let outcome = route(&snapshot, &self.config, &state);

        self.state = outcome.state;
        self.last_decision = Some(outcome.decision.clone());
        self.last_snapshot = Some(snapshot);
        self.last_error = None;
        Ok(outcome.decision)
    }

    /// Failures are reported, not retried; the next cycle re-issues the
    /// desired action anyway.
    pub fn record_actuation(&mut self, result: Result<(), ActuatorError>) {
        match result {
            Ok(()) => self.last_actuation_error = None,
            Err(err) => {
                warn!("actuator command failed: {err}");
                self.last_actuation_error = Some(err);
            }
        }
    }

    /// One full cycle against synchronous collaborators.
    pub fn tick<I, A>(&mut self, input: &mut I, actuator: &mut A) -> Result<Decision, CycleError>
    where
        I: InputSource + ?Sized,
        A: Actuator + ?Sized,
    {
        let decision = self.run_cycle(input.read())?;
        let result = actuator.apply(&decision);
        self.record_actuation(result);
        Ok(decision)
    }

    pub fn status(&self) -> ClimateStatus {
        let decision = self.last_decision.as_ref();
        let reason = match (self.last_error, decision) {
            (Some(err), _) => Reason::from(err),
            (None, Some(decision)) => decision.diagnostics.reason,
            (None, None) => Reason::Disabled,
        };

        let door_open_for_ms = self
            .last_snapshot
            .as_ref()
            .and_then(|snapshot| door_open_for_ms(snapshot, &self.state));
        let sleep_active = self
            .last_snapshot
            .as_ref()
            .map(|snapshot| sleep_detected(snapshot, &self.config, &self.state))
            .unwrap_or(false);

        ClimateStatus {
            action: decision
                .map(|decision| decision.action.as_str())
                .unwrap_or("IDLE"),
            branch: decision.and_then(|d| d.branch).map(|branch| branch.as_str()),
            target_temp: decision.and_then(|d| d.target_temp_c),
            preset: decision.and_then(|d| d.preset).map(|preset| preset.as_str()),
            active_mode: decision.and_then(|d| match d.diagnostics.reason {
                Reason::Disabled | Reason::ModeOff => Some("disabled"),
                _ => d.active_mode.map(|source| source.label()),
            }),
            reason: reason.as_str(),
            summary: match (self.last_error, decision) {
                (Some(err), _) => format!("HOLD | {err}"),
                (None, Some(decision)) => decision.summary(),
                (None, None) => "System initializing...".to_string(),
            },
            raw_target: decision.and_then(|d| d.diagnostics.raw_target_c),
            compensation: decision
                .map(|d| d.diagnostics.compensation_c)
                .unwrap_or(0.0),
            deadband_lower: decision.and_then(|d| d.diagnostics.lower_bound_c),
            deadband_upper: decision.and_then(|d| d.diagnostics.upper_bound_c),
            hysteresis_action: self.state.last_action.as_str(),
            door_open_for_ms,
            sleep_active,
            house_limit_latched: self.state.house_limit_latched,
            sensors: decision
                .map(|d| d.diagnostics.sensors)
                .unwrap_or_default(),
            last_decision: decision.cloned(),
            last_error: self.last_error.map(|err| err.to_string()),
            last_actuation_error: self.last_actuation_error.as_ref().map(ToString::to_string),
            cycles: self.cycles,
            aborted_cycles: self.aborted_cycles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, ForcedIdleReason};
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;

    struct Replay(VecDeque<SensorReadings>);

    impl InputSource for Replay {
        fn read(&mut self) -> SensorReadings {
            self.0.pop_front().unwrap()
        }
    }

    #[derive(Default)]
    struct Recorder {
        applied: Vec<Action>,
        fail: bool,
    }

    impl Actuator for Recorder {
        fn apply(&mut self, decision: &Decision) -> Result<(), ActuatorError> {
            self.applied.push(decision.action);
            if self.fail {
                Err(ActuatorError::Transport("queue full".into()))
            } else {
                Ok(())
            }
        }
    }

    fn door(now_ms: u64, open: bool) -> SensorReadings {
        let mut readings = SensorReadings::with_room(now_ms, 18.0);
        readings.door_open = Some(open);
        readings
    }

    fn scheduler() -> CycleScheduler {
        CycleScheduler::new(ClimateConfig::default(), 60_000)
    }

    #[test]
    fn door_grace_period_restarts_after_closing() {
        let mut scheduler = scheduler();
        let reasons: Vec<_> = [
            door(0, true),
            door(50_000, false),
            door(51_000, true),
            door(110_000, true),
            door(121_000, true),
        ]
        .into_iter()
        .map(|readings| scheduler.run_cycle(readings).unwrap().diagnostics.reason)
        .collect();

        assert_eq!(
            reasons,
            vec![
                Reason::Demand(crate::types::Branch::Heating),
                Reason::Demand(crate::types::Branch::Heating),
                Reason::Demand(crate::types::Branch::Heating),
                Reason::Demand(crate::types::Branch::Heating),
                Reason::Forced(ForcedIdleReason::DoorOpen),
            ]
        );
        assert_eq!(scheduler.state().door_open_since_ms, Some(51_000));
    }

    #[test]
    fn door_forces_idle_at_exactly_seventy_seconds() {
        let mut scheduler = scheduler();
        scheduler.run_cycle(door(1_000, true)).unwrap();
        let decision = scheduler.run_cycle(door(71_000, true)).unwrap();

        assert_eq!(decision.action, Action::Idle);
        assert_eq!(
            decision.diagnostics.reason,
            Reason::Forced(ForcedIdleReason::DoorOpen)
        );
        // Hysteresis memory from the first cycle survives the forced idle.
        assert_eq!(scheduler.state().last_action, Action::Active);

        let resumed = scheduler.run_cycle(door(72_000, false)).unwrap();
        assert_eq!(resumed.action, Action::Active);
        assert_eq!(scheduler.state().door_open_since_ms, None);
    }

    #[test]
    fn room_sensor_failure_is_fail_static() {
        let mut scheduler = scheduler();
        let first = scheduler
            .run_cycle(SensorReadings::with_room(0, 18.0))
            .unwrap();
        let state_before = scheduler.state().clone();

        let mut broken = door(60_000, true);
        broken.room_temp_c = None;
        assert_eq!(
            scheduler.run_cycle(broken),
            Err(CycleError::RoomSensorUnavailable)
        );

        assert_eq!(scheduler.state(), &state_before);
        assert_eq!(scheduler.last_decision(), Some(&first));

        let status = scheduler.status();
        assert_eq!(status.reason, "room-sensor-unavailable");
        assert_eq!(status.aborted_cycles, 1);
        assert_eq!(status.cycles, 2);
        assert!(status.last_error.is_some());
    }

    #[test]
    fn invalid_room_reading_has_its_own_reason() {
        let mut scheduler = scheduler();
        scheduler
            .run_cycle(SensorReadings::with_room(0, 18.0))
            .unwrap();

        assert_eq!(
            scheduler.run_cycle(SensorReadings::with_room(60_000, 85.0)),
            Err(CycleError::RoomSensorInvalid(85.0))
        );
        assert_eq!(scheduler.status().reason, "room-sensor-invalid");
    }

    #[test]
    fn tick_reports_actuator_failures_without_touching_state() {
        let mut scheduler = scheduler();
        let mut input = Replay(VecDeque::from(vec![
            SensorReadings::with_room(0, 18.0),
            SensorReadings::with_room(60_000, 20.2),
        ]));
        let mut actuator = Recorder {
            fail: true,
            ..Recorder::default()
        };

        scheduler.tick(&mut input, &mut actuator).unwrap();
        assert_eq!(scheduler.state().last_action, Action::Active);
        assert!(scheduler.status().last_actuation_error.is_some());

        actuator.fail = false;
        scheduler.tick(&mut input, &mut actuator).unwrap();
        assert_eq!(actuator.applied, vec![Action::Active, Action::Active]);
        assert_eq!(scheduler.status().last_actuation_error, None);
    }

    #[test]
    fn replayed_sequence_holds_inside_deadband() {
        let mut scheduler = scheduler();
        let actions: Vec<_> = [19.4, 19.8, 20.3, 20.49, 20.5, 20.1, 19.6, 19.5]
            .into_iter()
            .enumerate()
            .map(|(i, room)| {
                let readings = SensorReadings::with_room(i as u64 * 60_000, room);
                scheduler.run_cycle(readings).unwrap().action
            })
            .collect();

        assert_eq!(
            actions,
            vec![
                Action::Active,
                Action::Active,
                Action::Active,
                Action::Active,
                Action::Idle,
                Action::Idle,
                Action::Idle,
                Action::Active,
            ]
        );
    }

    #[test]
    fn sleep_timer_follows_bed_sensors() {
        let mut scheduler = CycleScheduler::new(
            ClimateConfig {
                sleep_confirm_ms: 120_000,
                ..ClimateConfig::default()
            },
            60_000,
        );
        let mut readings = SensorReadings::with_room(0, 19.0);
        readings.bed_occupied = vec![true, true];

        let early = scheduler.run_cycle(readings.clone()).unwrap();
        assert_eq!(early.preset, Some(crate::types::Preset::Comfort));
        assert_eq!(scheduler.state().sleep_confirmed_since_ms, Some(0));

        readings.now_ms = 120_000;
        let asleep = scheduler.run_cycle(readings.clone()).unwrap();
        assert_eq!(asleep.preset, Some(crate::types::Preset::Eco));
        assert!(scheduler.status().sleep_active);

        readings.now_ms = 180_000;
        readings.bed_occupied = vec![true, false];
        scheduler.run_cycle(readings).unwrap();
        assert_eq!(scheduler.state().sleep_confirmed_since_ms, None);
    }

    #[test]
    fn house_limit_latch_holds_until_recovery() {
        let mut scheduler = scheduler();
        let mut readings = SensorReadings::with_room(0, 18.0);

        let averages = [25.1, 24.8, 24.5, 24.6];
        let reasons: Vec<_> = averages
            .into_iter()
            .enumerate()
            .map(|(i, average)| {
                readings.now_ms = i as u64 * 60_000;
                readings.house_avg_temp_c = Some(average);
                scheduler
                    .run_cycle(readings.clone())
                    .unwrap()
                    .diagnostics
                    .reason
            })
            .collect();

        let too_hot = Reason::Forced(ForcedIdleReason::HouseTooHot);
        let heat = Reason::Demand(crate::types::Branch::Heating);
        assert_eq!(reasons, vec![too_hot, too_hot, heat, heat]);
    }

    #[test]
    fn status_before_first_cycle() {
        let status = scheduler().status();

        assert_eq!(status.action, "IDLE");
        assert_eq!(status.summary, "System initializing...");
        assert!(status.last_decision.is_none());
    }

    #[test]
    fn disabled_cycle_reports_disabled_mode() {
        let mut scheduler = scheduler();
        let mut readings = SensorReadings::with_room(0, 18.0);
        readings.enabled = false;

        scheduler.run_cycle(readings).unwrap();
        let status = scheduler.status();

        assert_eq!(status.active_mode, Some("disabled"));
        assert_eq!(status.reason, "disabled");
        assert_eq!(status.target_temp, None);
    }
}
