//! Preset resolution: force switches, sleep, schedule and defaults collapse
//! into one preset and raw target temperature.
//!
//! The heating cascade is an ordered rule table evaluated first-match-wins,
//! so the priority of each override is visible in one place.

use crate::{
    config::ClimateConfig,
    engine::EngineState,
    snapshot::InputSnapshot,
    types::{ForcedIdleReason, HvacMode, Preset, PresetSource, ScheduleMode},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    Target {
        preset: Preset,
        source: PresetSource,
        raw_target_c: f32,
    },
    ForcedIdle(ForcedIdleReason),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Choice {
    Preset(Preset, PresetSource),
    Idle(ForcedIdleReason),
}

struct RuleInputs<'a> {
    snapshot: &'a InputSnapshot,
    sleeping: bool,
}

type Rule = fn(&RuleInputs) -> Option<Choice>;

const HEATING_RULES: [(&str, Rule); 5] = [
    ("force-comfort", force_comfort),
    ("force-eco", force_eco),
    ("sleep", sleep),
    ("schedule", schedule),
    ("default", fallback),
];

/// Sleep is detected once every bed sensor has been occupied for the
/// configured confirmation window.
pub fn sleep_detected(snapshot: &InputSnapshot, config: &ClimateConfig, state: &EngineState) -> bool {
    if !snapshot.beds_occupied() {
        return false;
    }
    let since = state.sleep_confirmed_since_ms.unwrap_or(snapshot.now_ms);
    snapshot.now_ms.saturating_sub(since) >= config.sleep_confirm_ms
}

pub fn resolve_heating(
    snapshot: &InputSnapshot,
    config: &ClimateConfig,
    state: &EngineState,
) -> Resolution {
    let inputs = RuleInputs {
        snapshot,
        sleeping: sleep_detected(snapshot, config, state),
    };

    let choice = HEATING_RULES
        .iter()
        .find_map(|(name, rule)| {
            rule(&inputs).inspect(|choice| {
                tracing::trace!(rule = *name, ?choice, "preset rule matched");
            })
        })
        .unwrap_or(Choice::Preset(Preset::Comfort, PresetSource::Default));

    match choice {
        Choice::Preset(preset, source) => Resolution::Target {
            preset,
            source,
            raw_target_c: config.preset_target_c(preset),
        },
        Choice::Idle(reason) => Resolution::ForcedIdle(reason),
    }
}

/// Cooling has a single preset; the router already decided cooling is wanted.
pub fn resolve_cooling(config: &ClimateConfig) -> Resolution {
    Resolution::Target {
        preset: Preset::Cooling,
        source: PresetSource::Cooling,
        raw_target_c: config.preset_target_c(Preset::Cooling),
    }
}

/// An explicit `Heat` command pins comfort, like the force-comfort switch.
fn force_comfort(inputs: &RuleInputs) -> Option<Choice> {
    let snapshot = inputs.snapshot;
    (snapshot.force_comfort || snapshot.mode == HvacMode::Heat)
        .then_some(Choice::Preset(Preset::Comfort, PresetSource::ForceComfort))
}

fn force_eco(inputs: &RuleInputs) -> Option<Choice> {
    inputs
        .snapshot
        .force_eco
        .then_some(Choice::Preset(Preset::Eco, PresetSource::ForceEco))
}

fn sleep(inputs: &RuleInputs) -> Option<Choice> {
    inputs
        .sleeping
        .then_some(Choice::Preset(Preset::Eco, PresetSource::Sleep))
}

fn schedule(inputs: &RuleInputs) -> Option<Choice> {
    let mode = inputs.snapshot.schedule?;
    let source = PresetSource::Schedule(mode);
    Some(match mode {
        ScheduleMode::Comfort => Choice::Preset(Preset::Comfort, source),
        ScheduleMode::Eco => Choice::Preset(Preset::Eco, source),
        ScheduleMode::Boost => Choice::Preset(Preset::Boost, source),
        ScheduleMode::Off => Choice::Idle(ForcedIdleReason::ScheduledOff),
    })
}

fn fallback(_inputs: &RuleInputs) -> Option<Choice> {
    Some(Choice::Preset(Preset::Comfort, PresetSource::Default))
}
