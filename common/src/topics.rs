pub const TOPIC_SENSOR_ROOM_TEMP: &str = "climate/sensor/room/temperature";
pub const TOPIC_SENSOR_OUTSIDE_TEMP: &str = "climate/sensor/outside/temperature";
pub const TOPIC_SENSOR_HOUSE_AVG_TEMP: &str = "climate/sensor/house/average";
pub const TOPIC_SENSOR_DOOR: &str = "climate/sensor/door";
pub const TOPIC_SENSOR_PRESENCE: &str = "climate/sensor/presence";
/// Bed sensors publish on `climate/sensor/bed/<name>`.
pub const TOPIC_SENSOR_BED_PREFIX: &str = "climate/sensor/bed/";
pub const TOPIC_SENSOR_BED_WILDCARD: &str = "climate/sensor/bed/+";
pub const TOPIC_SCHEDULE_STATE: &str = "climate/schedule/state";

pub const TOPIC_CONTROLLER_STATE: &str = "climate/controller/state";
pub const TOPIC_HEAT_PUMP_SET: &str = "climate/heatpump/set";

pub const TOPIC_CMD_ENABLE: &str = "climate/cmnd/enable";
pub const TOPIC_CMD_MODE: &str = "climate/cmnd/mode";
pub const TOPIC_CMD_FORCE_COMFORT: &str = "climate/cmnd/force/comfort";
pub const TOPIC_CMD_FORCE_ECO: &str = "climate/cmnd/force/eco";
pub const TOPIC_CMD_FORCE_COOLING: &str = "climate/cmnd/force/cooling";
pub const TOPIC_CMD_SCHEDULE: &str = "climate/cmnd/schedule";
