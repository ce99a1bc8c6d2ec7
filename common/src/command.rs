use serde::{Deserialize, Serialize};

use crate::types::{Action, Branch, Decision};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeatPumpMode {
    Off,
    Heat,
    Cool,
}

/// Payload for the heat-pump command topic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatPumpCommand {
    #[serde(rename = "hvac_mode")]
    pub mode: HeatPumpMode,
    #[serde(rename = "temperature", skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f32>,
}

impl HeatPumpCommand {
    pub fn off() -> Self {
        Self {
            mode: HeatPumpMode::Off,
            temperature_c: None,
        }
    }

    pub fn from_decision(decision: &Decision) -> Self {
        let (Action::Active, Some(branch), Some(target)) =
            (decision.action, decision.branch, decision.target_temp_c)
        else {
            return Self::off();
        };

        let mode = match branch {
            Branch::Heating => HeatPumpMode::Heat,
            Branch::Cooling => HeatPumpMode::Cool,
        };
        // Whole degrees, so compensation drift does not re-send the same setpoint.
        Self {
            mode,
            temperature_c: Some(target.round()),
        }
    }
}

/// Suppresses re-sending the command the heat pump already received.
#[derive(Debug, Clone, Default)]
pub struct CommandTracker {
    last_sent: Option<HeatPumpCommand>,
}

impl CommandTracker {
    pub fn should_send(&self, command: &HeatPumpCommand) -> bool {
        self.last_sent.as_ref() != Some(command)
    }

    pub fn mark_sent(&mut self, command: HeatPumpCommand) {
        self.last_sent = Some(command);
    }

    /// After a failure the next cycle must send again, whatever it decides.
    pub fn mark_failed(&mut self) {
        self.last_sent = None;
    }

    pub fn last_sent(&self) -> Option<&HeatPumpCommand> {
        self.last_sent.as_ref()
    }
}
