use rumqttc::{AsyncClient, QoS};
use tracing::info;

use smart_climate_common::{Actuator, ActuatorError, CommandTracker, Decision, HeatPumpCommand};

/// Publishes heat-pump commands without waiting on the broker. The enqueue
/// either succeeds at once or fails with a full or closed request channel.
pub struct MqttActuator<'a> {
    client: &'a AsyncClient,
    topic: &'a str,
    tracker: &'a mut CommandTracker,
}

impl<'a> MqttActuator<'a> {
    pub fn new(client: &'a AsyncClient, topic: &'a str, tracker: &'a mut CommandTracker) -> Self {
        Self {
            client,
            topic,
            tracker,
        }
    }
}

impl Actuator for MqttActuator<'_> {
    fn apply(&mut self, decision: &Decision) -> Result<(), ActuatorError> {
        let command = HeatPumpCommand::from_decision(decision);
        if !self.tracker.should_send(&command) {
            return Ok(());
        }

        let payload =
            serde_json::to_vec(&command).map_err(|err| ActuatorError::Rejected(err.to_string()))?;
        match self
            .client
            .try_publish(self.topic, QoS::AtLeastOnce, false, payload)
        {
            Ok(()) => {
                info!(
                    mode = ?command.mode,
                    temperature = ?command.temperature_c,
                    "heat pump command sent"
                );
                self.tracker.mark_sent(command);
                Ok(())
            }
            Err(err) => {
                self.tracker.mark_failed();
                Err(ActuatorError::Transport(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rumqttc::MqttOptions;
    use smart_climate_common::{
        route, ClimateConfig, EngineState, HeatPumpMode, HvacMode, InputSnapshot, SensorReadings,
    };

    fn decide(readings: SensorReadings) -> Decision {
        let config = ClimateConfig::default();
        let snapshot = InputSnapshot::build(readings, &config).unwrap();
        route(&snapshot, &config, &EngineState::default()).decision
    }

    #[test]
    fn repeated_command_is_published_once() {
        // Capacity 1: a second enqueue would fail, so a skipped duplicate shows as Ok.
        let (client, _eventloop) = AsyncClient::new(MqttOptions::new("test", "localhost", 1883), 1);
        let mut tracker = CommandTracker::default();
        let heating = decide(SensorReadings::with_room(0, 18.0));

        let mut actuator = MqttActuator::new(&client, "heat-pump/set", &mut tracker);
        assert_eq!(actuator.apply(&heating), Ok(()));
        assert_eq!(actuator.apply(&heating), Ok(()));

        assert_eq!(
            tracker.last_sent().map(|command| command.mode),
            Some(HeatPumpMode::Heat)
        );
    }

    #[test]
    fn full_queue_fails_and_forces_a_resend() {
        let (client, _eventloop) = AsyncClient::new(MqttOptions::new("test", "localhost", 1883), 1);
        let mut tracker = CommandTracker::default();
        let heating = decide(SensorReadings::with_room(0, 18.0));
        let mut cool_readings = SensorReadings::with_room(0, 26.0);
        cool_readings.mode = HvacMode::Cool;
        let cooling = decide(cool_readings);

        let mut actuator = MqttActuator::new(&client, "heat-pump/set", &mut tracker);
        assert_eq!(actuator.apply(&heating), Ok(()));
        assert!(matches!(
            actuator.apply(&cooling),
            Err(ActuatorError::Transport(_))
        ));

        assert_eq!(tracker.last_sent(), None);
    }
}
