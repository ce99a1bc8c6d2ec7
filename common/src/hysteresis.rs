//! Two-state deadband controller.
//!
//! The open interval `(target - below, target + above)` is a no-transition
//! zone: while the room stays strictly inside it the previous action is held.

use crate::{
    config::ClimateConfig,
    types::{Action, Branch},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deadband {
    pub below_c: f32,
    pub above_c: f32,
}

impl Deadband {
    pub fn from_config(config: &ClimateConfig) -> Self {
        Self {
            below_c: config.deadband_below_c,
            above_c: config.deadband_above_c,
        }
    }

    pub fn bounds(self, target_c: f32) -> (f32, f32) {
        (target_c - self.below_c, target_c + self.above_c)
    }
}

/// Where the room temperature sits relative to the deadband.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    /// At or below the lower bound.
    Below,
    Within,
    /// At or above the upper bound.
    Above,
}

pub fn zone(room_temp_c: f32, target_c: f32, deadband: Deadband) -> Zone {
    let (lower, upper) = deadband.bounds(target_c);
    if room_temp_c <= lower {
        Zone::Below
    } else if room_temp_c >= upper {
        Zone::Above
    } else {
        Zone::Within
    }
}

pub fn decide(
    previous: Action,
    room_temp_c: f32,
    target_c: f32,
    deadband: Deadband,
    branch: Branch,
) -> Action {
    let zone = zone(room_temp_c, target_c, deadband);
    let (start, stop) = match branch {
        Branch::Heating => (Zone::Below, Zone::Above),
        Branch::Cooling => (Zone::Above, Zone::Below),
    };

    match previous {
        Action::Idle if zone == start => Action::Active,
        Action::Active if zone == stop => Action::Idle,
        held => held,
    }
}
