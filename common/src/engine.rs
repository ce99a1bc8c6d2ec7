use serde::Serialize;
use tracing::{debug, info};

use crate::{
    compensation::{compensate, Compensation},
    config::ClimateConfig,
    hysteresis::{self, Deadband, Zone},
    preset::{self, Resolution},
    safety,
    snapshot::InputSnapshot,
    types::{
        Action, Branch, Decision, DecisionDiagnostics, ForcedIdleReason, HvacMode, Preset, Reason,
    },
};

/// Memory carried from one cycle to the next. Re-initialized with safe
/// defaults on restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineState {
    pub last_action: Action,
    /// Branch that produced `last_action`; memory from the other branch is not reused.
    pub last_branch: Option<Branch>,
    pub door_open_since_ms: Option<u64>,
    pub sleep_confirmed_since_ms: Option<u64>,
    pub house_limit_latched: bool,
    pub last_preset: Option<Preset>,
    pub last_target_c: Option<f32>,
    pub last_compensation_c: f32,
    pub last_cycle_ms: Option<u64>,
}

impl EngineState {
    /// Hysteresis memory as seen from `branch`.
    pub fn previous_action(&self, branch: Branch) -> Action {
        if self.last_branch == Some(branch) {
            self.last_action
        } else {
            Action::Idle
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub decision: Decision,
    pub state: EngineState,
}

/// Branch-specific decision logic. The router picks one implementation per
/// cycle and runs the same evaluation sequence against it.
pub trait BranchStrategy {
    fn branch(&self) -> Branch;

    fn check_safety(
        &self,
        snapshot: &InputSnapshot,
        config: &ClimateConfig,
        state: &EngineState,
    ) -> Option<ForcedIdleReason>;

    fn resolve_preset(
        &self,
        snapshot: &InputSnapshot,
        config: &ClimateConfig,
        state: &EngineState,
    ) -> Resolution;

    fn adjust_target(
        &self,
        raw_target_c: f32,
        snapshot: &InputSnapshot,
        config: &ClimateConfig,
    ) -> Compensation;

    fn apply_hysteresis(
        &self,
        previous: Action,
        room_temp_c: f32,
        target_c: f32,
        deadband: Deadband,
    ) -> Action {
        hysteresis::decide(previous, room_temp_c, target_c, deadband, self.branch())
    }
}

pub struct HeatingStrategy;

impl BranchStrategy for HeatingStrategy {
    fn branch(&self) -> Branch {
        Branch::Heating
    }

    fn check_safety(
        &self,
        snapshot: &InputSnapshot,
        config: &ClimateConfig,
        state: &EngineState,
    ) -> Option<ForcedIdleReason> {
        safety::check(snapshot, config, state, Branch::Heating)
    }

    fn resolve_preset(
        &self,
        snapshot: &InputSnapshot,
        config: &ClimateConfig,
        state: &EngineState,
    ) -> Resolution {
        preset::resolve_heating(snapshot, config, state)
    }

    fn adjust_target(
        &self,
        raw_target_c: f32,
        snapshot: &InputSnapshot,
        config: &ClimateConfig,
    ) -> Compensation {
        compensate(raw_target_c, snapshot.outside_temp_c.value(), config)
    }
}

pub struct CoolingStrategy;

impl BranchStrategy for CoolingStrategy {
    fn branch(&self) -> Branch {
        Branch::Cooling
    }

    fn check_safety(
        &self,
        snapshot: &InputSnapshot,
        config: &ClimateConfig,
        state: &EngineState,
    ) -> Option<ForcedIdleReason> {
        safety::check(snapshot, config, state, Branch::Cooling)
    }

    fn resolve_preset(
        &self,
        _snapshot: &InputSnapshot,
        config: &ClimateConfig,
        _state: &EngineState,
    ) -> Resolution {
        preset::resolve_cooling(config)
    }

    fn adjust_target(
        &self,
        raw_target_c: f32,
        _snapshot: &InputSnapshot,
        _config: &ClimateConfig,
    ) -> Compensation {
        Compensation::none(raw_target_c)
    }
}

/// The only place operating-mode selection happens.
pub fn select_branch(snapshot: &InputSnapshot) -> Option<Branch> {
    if !snapshot.enabled {
        return None;
    }
    match snapshot.mode {
        HvacMode::Off => None,
        HvacMode::Cool => Some(Branch::Cooling),
        HvacMode::Auto if snapshot.force_cooling => Some(Branch::Cooling),
        HvacMode::Heat | HvacMode::Auto => Some(Branch::Heating),
    }
}

/// Evaluates one snapshot. Timer bookkeeping in `state` must already reflect
/// `snapshot` (see [`crate::scheduler::advance_timers`]).
pub fn route(snapshot: &InputSnapshot, config: &ClimateConfig, state: &EngineState) -> CycleOutcome {
    let mut next = state.clone();
    next.last_cycle_ms = Some(snapshot.now_ms);

    let decision = match select_branch(snapshot) {
        None => {
            let reason = if snapshot.enabled {
                Reason::ModeOff
            } else {
                Reason::Disabled
            };
            idle_decision(snapshot, None, reason)
        }
        Some(Branch::Heating) => evaluate(&HeatingStrategy, snapshot, config, state, &mut next),
        Some(Branch::Cooling) => evaluate(&CoolingStrategy, snapshot, config, state, &mut next),
    };

    debug!(
        action = decision.action.as_str(),
        reason = decision.diagnostics.reason.as_str(),
        target = ?decision.target_temp_c,
        "cycle evaluated"
    );

    CycleOutcome {
        decision,
        state: next,
    }
}

fn evaluate(
    strategy: &dyn BranchStrategy,
    snapshot: &InputSnapshot,
    config: &ClimateConfig,
    state: &EngineState,
    next: &mut EngineState,
) -> Decision {
    let branch = strategy.branch();

    // Forced idle leaves hysteresis memory untouched so the trend resumes
    // once the guard clears.
    if let Some(reason) = strategy.check_safety(snapshot, config, state) {
        return idle_decision(snapshot, Some(branch), Reason::Forced(reason));
    }

    let (preset, source, raw_target_c) = match strategy.resolve_preset(snapshot, config, state) {
        Resolution::ForcedIdle(reason) => {
            return idle_decision(snapshot, Some(branch), Reason::Forced(reason));
        }
        Resolution::Target {
            preset,
            source,
            raw_target_c,
        } => (preset, source, raw_target_c),
    };

    let compensation = strategy.adjust_target(raw_target_c, snapshot, config);
    let target_c = compensation.adjusted_target_c;
    let deadband = Deadband::from_config(config);
    let (lower_bound_c, upper_bound_c) = deadband.bounds(target_c);

    let previous = state.previous_action(branch);
    let action = strategy.apply_hysteresis(previous, snapshot.room_temp_c, target_c, deadband);
    if action != previous {
        info!(
            branch = branch.as_str(),
            from = previous.as_str(),
            to = action.as_str(),
            room = snapshot.room_temp_c,
            target = target_c,
            "hysteresis transition"
        );
    }

    next.last_action = action;
    next.last_branch = Some(branch);
    next.last_preset = Some(preset);
    next.last_target_c = Some(target_c);
    next.last_compensation_c = compensation.offset_c;

    let reason = match (hysteresis::zone(snapshot.room_temp_c, target_c, deadband), branch) {
        (Zone::Within, _) => Reason::InDeadband,
        (Zone::Below, Branch::Heating) | (Zone::Above, Branch::Cooling) => Reason::Demand(branch),
        (Zone::Above, Branch::Heating) | (Zone::Below, Branch::Cooling) => Reason::TargetReached,
    };

    Decision {
        action,
        branch: Some(branch),
        target_temp_c: Some(target_c),
        preset: Some(preset),
        active_mode: Some(source),
        decided_at_ms: snapshot.now_ms,
        diagnostics: DecisionDiagnostics {
            raw_target_c: Some(raw_target_c),
            compensation_c: compensation.offset_c,
            lower_bound_c: Some(lower_bound_c),
            upper_bound_c: Some(upper_bound_c),
            ..base_diagnostics(snapshot, reason)
        },
    }
}

fn idle_decision(snapshot: &InputSnapshot, branch: Option<Branch>, reason: Reason) -> Decision {
    Decision {
        action: Action::Idle,
        branch,
        target_temp_c: None,
        preset: None,
        active_mode: None,
        decided_at_ms: snapshot.now_ms,
        diagnostics: base_diagnostics(snapshot, reason),
    }
}

fn base_diagnostics(snapshot: &InputSnapshot, reason: Reason) -> DecisionDiagnostics {
    DecisionDiagnostics {
        raw_target_c: None,
        compensation_c: 0.0,
        lower_bound_c: None,
        upper_bound_c: None,
        reason,
        room_temp_c: snapshot.room_temp_c,
        outside_temp_c: snapshot.outside_temp_c.value(),
        house_avg_temp_c: snapshot.house_avg_temp_c,
        sensors: snapshot.flags,
    }
}
