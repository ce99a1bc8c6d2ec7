use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{Offset, Utc};
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use tokio::{
    net::TcpListener,
    sync::{Mutex, Notify},
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

use smart_climate_common::{
    ClimateStatus, CommandTracker, ControllerConfig, CycleScheduler,
    HeatPumpCommand, HvacMode, RuntimeConfig, Schedule, ScheduleMode, TOPIC_CMD_ENABLE,
    TOPIC_CMD_FORCE_COMFORT, TOPIC_CMD_FORCE_COOLING, TOPIC_CMD_FORCE_ECO, TOPIC_CMD_MODE,
    TOPIC_CMD_SCHEDULE, TOPIC_CONTROLLER_STATE, TOPIC_SCHEDULE_STATE, TOPIC_SENSOR_BED_WILDCARD,
    TOPIC_SENSOR_DOOR, TOPIC_SENSOR_HOUSE_AVG_TEMP, TOPIC_SENSOR_OUTSIDE_TEMP,
    TOPIC_SENSOR_PRESENCE, TOPIC_SENSOR_ROOM_TEMP,
};

use crate::{
    actuator::MqttActuator,
    inputs::{parse_switch, CacheReader, Commands, ForceSwitch, InputCache, InputUpdate},
};

#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<CycleScheduler>>,
    inputs: Arc<Mutex<InputCache>>,
    schedule: Arc<Mutex<Schedule>>,
    commands: Arc<Mutex<CommandTracker>>,
    timezone: Arc<String>,
    time_synced: Arc<AtomicBool>,
    wake: Arc<Notify>,
    controller: ControllerConfig,
    heat_pump_topic: Arc<String>,
    mqtt: AsyncClient,
    store: AppStore,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    schedule_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    climate: ClimateStatus,
    commands: Commands,
    #[serde(rename = "heatPump")]
    heat_pump: Option<HeatPumpCommand>,
    #[serde(rename = "scheduleEnabled")]
    schedule_enabled: bool,
    #[serde(rename = "scheduleMode")]
    schedule_mode: Option<&'static str>,
    #[serde(rename = "nextScheduleEvent")]
    next_schedule_event: Option<i64>,
    #[serde(rename = "timeSynced")]
    time_synced: bool,
    timezone: String,
}

const MAX_MQTT_PAYLOAD_BYTES: usize = 4096;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let runtime = store
        .load_runtime_config()
        .await
        .context("failed to load runtime config")?;
    runtime
        .validate()
        .context("runtime config failed validation")?;

    let mut schedule = store.load_schedule().await.unwrap_or_else(|err| {
        warn!("failed to load schedule from store: {err:#}");
        Schedule::default()
    });
    schedule.normalize();

    if runtime.timezone.parse::<Tz>().is_err() {
        warn!(
            "unknown timezone {:?}, built-in schedule is inactive",
            runtime.timezone
        );
    }

    let engine = CycleScheduler::new(
        runtime.climate.clone(),
        runtime.controller.cycle_interval_ms,
    );

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options = MqttOptions::new("smart-climate-controller", mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let app_state = AppState {
        engine: Arc::new(Mutex::new(engine)),
        inputs: Arc::new(Mutex::new(InputCache::new(
            runtime.controller.sensor_stale_timeout_ms,
        ))),
        schedule: Arc::new(Mutex::new(schedule)),
        commands: Arc::new(Mutex::new(CommandTracker::default())),
        timezone: Arc::new(runtime.timezone.clone()),
        time_synced: Arc::new(AtomicBool::new(false)),
        wake: Arc::new(Notify::new()),
        controller: runtime.controller.clone(),
        heat_pump_topic: Arc::new(runtime.network.heat_pump_topic.clone()),
        mqtt,
        store,
    };

    subscribe_topics(&app_state.mqtt).await?;
    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_control_loop(app_state.clone());
    spawn_state_publish_loop(app_state.clone());

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/mode", post(handle_set_mode))
        .route("/api/enable", post(handle_set_enable))
        .route("/api/force/{kind}", post(handle_set_force))
        .route(
            "/api/schedule",
            get(handle_get_schedule).put(handle_put_schedule),
        )
        .with_state(app_state);

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    let topics = [
        TOPIC_SENSOR_ROOM_TEMP,
        TOPIC_SENSOR_OUTSIDE_TEMP,
        TOPIC_SENSOR_HOUSE_AVG_TEMP,
        TOPIC_SENSOR_DOOR,
        TOPIC_SENSOR_PRESENCE,
        TOPIC_SENSOR_BED_WILDCARD,
        TOPIC_SCHEDULE_STATE,
        TOPIC_CMD_ENABLE,
        TOPIC_CMD_MODE,
        TOPIC_CMD_FORCE_COMFORT,
        TOPIC_CMD_FORCE_ECO,
        TOPIC_CMD_FORCE_COOLING,
        TOPIC_CMD_SCHEDULE,
    ];

    for topic in topics {
        mqtt.subscribe(topic, QoS::AtMostOnce)
            .await
            .with_context(|| format!("failed to subscribe to {topic}"))?;
    }
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, &message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

/// The only task that runs cycles, so a cycle never starts before the
/// previous command has been queued or rejected.
fn spawn_control_loop(app_state: AppState) {
    tokio::spawn(async move {
        let interval_ms = app_state.engine.lock().await.interval_ms();
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = app_state.wake.notified() => {
                    debug!("control cycle requested early");
                }
            }
            run_control_cycle(&app_state).await;
        }
    });
}

async fn run_control_cycle(app_state: &AppState) {
    let now_ms = monotonic_ms();
    let schedule_mode = scheduled_mode(app_state).await;

    let inputs = app_state.inputs.lock().await;
    let mut tracker = app_state.commands.lock().await;
    let mut engine = app_state.engine.lock().await;

    let mut reader = CacheReader::new(&inputs, now_ms, schedule_mode);
    let mut actuator = MqttActuator::new(
        &app_state.mqtt,
        app_state.heat_pump_topic.as_str(),
        &mut tracker,
    );
    if let Ok(decision) = engine.tick(&mut reader, &mut actuator) {
        debug!("cycle decision: {}", decision.summary());
    }
}

async fn scheduled_mode(app_state: &AppState) -> Option<ScheduleMode> {
    let now_in_tz = now_in_timezone(&app_state.timezone);
    app_state
        .time_synced
        .store(now_in_tz.is_some(), Ordering::Relaxed);

    let now = now_in_tz?;
    app_state.schedule.lock().await.current_mode(now)
}

fn spawn_state_publish_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(
            app_state.controller.state_publish_interval_ms,
        ));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            let status = build_status(&app_state).await;
            match serde_json::to_vec(&status) {
                Ok(body) => {
                    if let Err(err) = app_state
                        .mqtt
                        .publish(TOPIC_CONTROLLER_STATE, QoS::AtLeastOnce, true, body)
                        .await
                    {
                        warn!("controller state publish failed: {err}");
                    }
                }
                Err(err) => warn!("controller state serialization failed: {err}"),
            }
        }
    });
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: &str,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;

    if topic == TOPIC_CMD_SCHEDULE {
        let mut schedule = serde_json::from_str::<Schedule>(&message)
            .context("invalid schedule payload")?;
        replace_schedule(app_state, &mut schedule).await?;
        return Ok(());
    }

    let update = {
        let mut inputs = app_state.inputs.lock().await;
        inputs.apply(topic, &message, monotonic_ms())?
    };
    if update == InputUpdate::Command {
        info!(topic, value = %message.trim(), "command received");
        app_state.wake.notify_one();
    }

    Ok(())
}

async fn replace_schedule(app_state: &AppState, schedule: &mut Schedule) -> anyhow::Result<()> {
    schedule.normalize();
    {
        let mut active = app_state.schedule.lock().await;
        *active = schedule.clone();
    }
    app_state.wake.notify_one();
    app_state.store.save_schedule(schedule).await
}

async fn build_status(app_state: &AppState) -> StatusResponse {
    let climate = app_state.engine.lock().await.status();
    let commands = app_state.inputs.lock().await.commands;
    let heat_pump = app_state.commands.lock().await.last_sent().copied();

    let now = now_in_timezone(&app_state.timezone);
    let (schedule_enabled, schedule_mode, next_schedule_event) = {
        let schedule = app_state.schedule.lock().await;
        (
            schedule.enabled,
            now.and_then(|now| schedule.current_mode(now))
                .map(ScheduleMode::as_str),
            now.and_then(|now| schedule.next_event_epoch(now)),
        )
    };

    StatusResponse {
        climate,
        commands,
        heat_pump,
        schedule_enabled,
        schedule_mode,
        next_schedule_event,
        time_synced: app_state.time_synced.load(Ordering::Relaxed),
        timezone: app_state.timezone.as_ref().clone(),
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(build_status(&state).await)
}

async fn handle_set_mode(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(mode) = HvacMode::parse(value) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Invalid mode. Use 'OFF', 'HEAT', 'COOL' or 'AUTO'",
        );
    };

    {
        let mut inputs = state.inputs.lock().await;
        inputs.commands.mode = mode;
    }
    info!(mode = mode.as_str(), "mode set over http");
    state.wake.notify_one();

    handle_get_status(State(state)).await.into_response()
}

async fn handle_set_enable(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(enabled) = parse_switch(value) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid value. Use 'on' or 'off'");
    };

    {
        let mut inputs = state.inputs.lock().await;
        inputs.commands.enabled = enabled;
    }
    info!(enabled, "enable switch set over http");
    state.wake.notify_one();

    handle_get_status(State(state)).await.into_response()
}

async fn handle_set_force(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(switch) = ForceSwitch::parse(&kind) else {
        return error_response(
            StatusCode::NOT_FOUND,
            "Unknown force switch. Use 'comfort', 'eco' or 'cooling'",
        );
    };
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(on) = parse_switch(value) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid value. Use 'on' or 'off'");
    };

    let changed = {
        let mut inputs = state.inputs.lock().await;
        inputs.commands.set_force(switch, on)
    };
    if changed {
        info!(switch = ?switch, on, "force switch set over http");
        state.wake.notify_one();
    }

    handle_get_status(State(state)).await.into_response()
}

async fn handle_get_schedule(State(state): State<AppState>) -> impl IntoResponse {
    let schedule = state.schedule.lock().await.clone();
    Json(schedule)
}

async fn handle_put_schedule(
    State(state): State<AppState>,
    Json(mut schedule): Json<Schedule>,
) -> impl IntoResponse {
    if let Err(err) = replace_schedule(&state, &mut schedule).await {
        warn!("failed to persist schedule update: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist schedule",
        );
    }

    handle_get_schedule(State(state)).await.into_response()
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("CLIMATE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.smart-climate"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            schedule_path: Arc::new(data_dir.join("schedule.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn load_schedule(&self) -> anyhow::Result<Schedule> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.schedule_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<Schedule>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Schedule::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_schedule(&self, schedule: &Schedule) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.schedule_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(schedule)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}

fn now_in_timezone(timezone: &str) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    let tz: Tz = timezone.parse().ok()?;
    let local = Utc::now().with_timezone(&tz);
    Some(local.with_timezone(&local.offset().fix()))
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
