//! Engine behaviour tests
//!
//! Drive `AutonomousEngine::tick_at` on a fixed clock against the in-memory
//! data layer, a recording dispatcher and a static forecast.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

use farm_autopilot::collaborators::{InMemoryDataLayer, RecordingDispatcher};
use farm_autopilot::config::{EngineConfig, PolicyConfig};
use farm_autopilot::crop_profile::CropProfileResolver;
use farm_autopilot::engine::{AutonomousEngine, EngineDeps};
use farm_autopilot::storage::AutomationStateStore;
use farm_autopilot::types::{ActionKind, CommandType, FarmRecord, SensorSnapshot, TickReason};
use farm_autopilot::weather::{RainSignalProvider, StaticForecast};

struct Fixture {
    dir: tempfile::TempDir,
    data: Arc<InMemoryDataLayer>,
    dispatcher: Arc<RecordingDispatcher>,
    state: Arc<AutomationStateStore>,
    engine: Arc<AutonomousEngine>,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap()
}

fn fixture(rain: RainSignalProvider) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let data = Arc::new(InMemoryDataLayer::new());
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let state = Arc::new(AutomationStateStore::open(dir.path().join("automation_state.json")));
    let engine = build_engine(&data, &dispatcher, &state, rain);
    Fixture {
        dir,
        data,
        dispatcher,
        state,
        engine,
    }
}

fn build_engine(
    data: &Arc<InMemoryDataLayer>,
    dispatcher: &Arc<RecordingDispatcher>,
    state: &Arc<AutomationStateStore>,
    rain: RainSignalProvider,
) -> Arc<AutonomousEngine> {
    let deps = EngineDeps {
        data: data.clone(),
        dispatcher: dispatcher.clone(),
        state: state.clone(),
        profiles: Arc::new(CropProfileResolver::builtin_only()),
        rain: Arc::new(rain),
    };
    Arc::new(AutonomousEngine::new(
        deps,
        EngineConfig::default(),
        PolicyConfig::default(),
    ))
}

fn rainy(now: DateTime<Utc>) -> RainSignalProvider {
    RainSignalProvider::new(
        Arc::new(StaticForecast::single(now, 2, 0.9, 6.0)),
        std::time::Duration::from_secs(2),
    )
}

fn reading(moisture: f64, n: f64, at: DateTime<Utc>, farmer: &str) -> SensorSnapshot {
    SensorSnapshot {
        soil_moisture: moisture,
        nitrogen: n,
        phosphorus: 30.0,
        potassium: 60.0,
        temperature: 27.0,
        timestamp: at,
        farmer_id: farmer.to_string(),
    }
}

/// Register a farm growing `crop` with one reading, located at fixed coordinates.
fn add_farm(f: &Fixture, farm_id: &str, crop: &str, moisture: f64, nitrogen: f64) {
    let farmer = format!("farmer-of-{}", farm_id);
    f.data.upsert_farm(
        farm_id,
        FarmRecord {
            soil_type: Some("Loam".to_string()),
            latitude: Some(18.52),
            longitude: Some(73.85),
            farmer_id: farmer.clone(),
        },
    );
    f.data.set_crop(&farmer, crop);
    f.data.record_reading(farm_id, reading(moisture, nitrogen, t0(), &farmer));
    f.engine.register_farm(farm_id);
}

fn set_moisture(f: &Fixture, farm_id: &str, moisture: f64, at: DateTime<Utc>) {
    let farmer = format!("farmer-of-{}", farm_id);
    f.data.record_reading(farm_id, reading(moisture, 60.0, at, &farmer));
}

#[tokio::test]
async fn test_dry_wheat_field_is_irrigated() {
    let f = fixture(RainSignalProvider::disabled());
    add_farm(&f, "farm-1", "Wheat", 25.0, 60.0);

    let report = f.engine.tick_at(TickReason::Interval, t0()).await;

    assert_eq!(report.irrigations, 1);
    assert_eq!(report.fertilizations, 0);
    assert_eq!(f.dispatcher.count("farm-1", CommandType::WaterPump), 1);

    let state = f.state.get_farm_state("farm-1");
    assert_eq!(state.last_irrigation_at, Some(t0()));
    assert_eq!(state.last_run_at, Some(t0()));
    assert_eq!(state.last_fertilizer_at, None);

    let logs = f.data.action_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, ActionKind::Irrigation);
    assert_eq!(logs[0].farmer_id, "farmer-of-farm-1");
    assert_eq!(logs[0].timestamp, t0());
    assert!(logs[0].details.contains("25.0%"), "{}", logs[0].details);
    assert!(logs[0].details.contains("wheat"), "{}", logs[0].details);
}

#[tokio::test]
async fn test_moisture_within_slack_is_left_alone() {
    let f = fixture(RainSignalProvider::disabled());
    add_farm(&f, "farm-1", "wheat", 38.5, 60.0);

    let report = f.engine.tick_at(TickReason::Interval, t0()).await;
    assert_eq!(report.evaluated, 1);
    assert_eq!(report.actions(), 0);
    assert_eq!(f.state.get_farm_state("farm-1").last_run_at, Some(t0()));
}

#[tokio::test]
async fn test_irrigation_cooldown_is_respected() {
    let f = fixture(RainSignalProvider::disabled());
    add_farm(&f, "farm-1", "wheat", 20.0, 60.0);

    let mut fired = Vec::new();
    for minutes in (0..=300).step_by(10) {
        let now = t0() + Duration::minutes(minutes);
        set_moisture(&f, "farm-1", 20.0, now);
        let report = f.engine.tick_at(TickReason::Interval, now).await;
        if report.irrigations > 0 {
            fired.push(now);
        }
    }

    assert_eq!(
        fired,
        vec![t0(), t0() + Duration::hours(2), t0() + Duration::hours(4)]
    );
    for pair in fired.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::hours(2));
    }
}

#[tokio::test]
async fn test_fertilizer_cooldown_is_seven_days() {
    let f = fixture(RainSignalProvider::disabled());
    add_farm(&f, "farm-1", "wheat", 45.0, 20.0);

    let first = f.engine.tick_at(TickReason::Interval, t0()).await;
    assert_eq!(first.fertilizations, 1);

    let day6 = f
        .engine
        .tick_at(TickReason::Interval, t0() + Duration::days(6))
        .await;
    assert_eq!(day6.fertilizations, 0);

    let day7 = f
        .engine
        .tick_at(TickReason::Interval, t0() + Duration::days(7))
        .await;
    assert_eq!(day7.fertilizations, 1);
    assert_eq!(f.dispatcher.count("farm-1", CommandType::Fertilizer), 2);
}

#[tokio::test]
async fn test_dry_soil_is_not_fertilized() {
    let f = fixture(RainSignalProvider::disabled());
    add_farm(&f, "farm-1", "wheat", 25.0, 10.0);

    let report = f.engine.tick_at(TickReason::Interval, t0()).await;
    assert_eq!(report.irrigations, 1);
    assert_eq!(report.fertilizations, 0);
}

#[tokio::test]
async fn test_disabled_farm_never_acts() {
    let f = fixture(RainSignalProvider::disabled());
    add_farm(&f, "farm-1", "wheat", 5.0, 5.0);
    f.engine.set_autonomous_enabled("farm-1", false).unwrap();
    assert!(!f.engine.get_autonomous_enabled("farm-1"));

    for hours in 0..5 {
        let report = f
            .engine
            .tick_at(TickReason::Interval, t0() + Duration::hours(hours * 24))
            .await;
        assert_eq!(report.skipped, 1);
    }

    assert!(f.dispatcher.commands().is_empty());
    let state = f.state.get_farm_state("farm-1");
    assert!(!state.is_autonomous);
    assert_eq!(state.last_run_at, None);
    assert_eq!(state.last_irrigation_at, None);
    assert_eq!(state.last_fertilizer_at, None);

    // Re-enabling resumes control
    f.engine.set_autonomous_enabled("farm-1", true).unwrap();
    let report = f.engine.tick_at(TickReason::Interval, t0() + Duration::days(5)).await;
    assert_eq!(report.irrigations, 1);
}

#[tokio::test]
async fn test_set_autonomous_registers_farm() {
    let f = fixture(RainSignalProvider::disabled());
    assert!(f.engine.registered_farms().is_empty());
    f.engine.set_autonomous_enabled("farm-7", true).unwrap();
    assert_eq!(f.engine.registered_farms(), vec!["farm-7".to_string()]);
}

#[tokio::test]
async fn test_startup_tick_after_restart_does_not_duplicate() {
    let f = fixture(RainSignalProvider::disabled());
    add_farm(&f, "farm-1", "wheat", 45.0, 20.0);

    let first = f.engine.tick_at(TickReason::Startup, t0()).await;
    assert_eq!(first.fertilizations, 1);

    // Process restart: fresh engine over the same state document
    let restarted = build_engine(&f.data, &f.dispatcher, &f.state, RainSignalProvider::disabled());
    restarted.register_farm("farm-1");
    let again = restarted
        .tick_at(TickReason::Startup, t0() + Duration::minutes(3))
        .await;
    assert_eq!(again.skipped, 1);
    assert_eq!(again.evaluated, 0);
    assert_eq!(f.dispatcher.count("farm-1", CommandType::Fertilizer), 1);
    assert_eq!(f.state.get_farm_state("farm-1").last_run_at, Some(t0()));

    // Outside the catch-up window the farm is evaluated again
    let later = restarted
        .tick_at(TickReason::Startup, t0() + Duration::minutes(7))
        .await;
    assert_eq!(later.evaluated, 1);
    assert!(f.dir.path().join("automation_state.json").exists());
}

#[tokio::test]
async fn test_catch_up_guard_only_applies_to_startup() {
    let f = fixture(RainSignalProvider::disabled());
    add_farm(&f, "farm-1", "wheat", 45.0, 60.0);

    f.engine.tick_at(TickReason::Interval, t0()).await;
    let manual = f
        .engine
        .tick_at(TickReason::Manual, t0() + Duration::minutes(1))
        .await;
    assert_eq!(manual.evaluated, 1);
}

#[tokio::test]
async fn test_rain_defers_mild_deficit() {
    let f = fixture(rainy(t0()));
    // Wheat band minimum is 40: 5 points below
    add_farm(&f, "farm-1", "wheat", 35.0, 60.0);

    let report = f.engine.tick_at(TickReason::Interval, t0()).await;
    assert_eq!(report.evaluated, 1);
    assert_eq!(report.irrigations, 0);
    assert_eq!(f.state.get_farm_state("farm-1").last_irrigation_at, None);
}

#[tokio::test]
async fn test_very_low_moisture_overrides_rain() {
    let f = fixture(rainy(t0()));
    // 15 points below the band minimum
    add_farm(&f, "farm-1", "wheat", 25.0, 60.0);

    let report = f.engine.tick_at(TickReason::Interval, t0()).await;
    assert_eq!(report.irrigations, 1);
    let details = &f.data.action_logs()[0].details;
    assert!(details.contains("likely"), "{}", details);
}

#[tokio::test]
async fn test_unknown_forecast_does_not_defer() {
    let f = fixture(rainy(t0()));
    add_farm(&f, "farm-1", "wheat", 35.0, 60.0);
    // No coordinates: the rain signal is unknown, not "no rain"
    f.data.upsert_farm(
        "farm-1",
        FarmRecord {
            farmer_id: "farmer-of-farm-1".to_string(),
            ..FarmRecord::default()
        },
    );

    let report = f.engine.tick_at(TickReason::Interval, t0()).await;
    assert_eq!(report.irrigations, 1);
}

#[tokio::test]
async fn test_sensor_outage_in_one_farm_does_not_block_others() {
    let f = fixture(RainSignalProvider::disabled());
    add_farm(&f, "farm-a", "wheat", 20.0, 60.0);
    add_farm(&f, "farm-b", "wheat", 20.0, 60.0);
    f.data.fail_readings_for("farm-a");

    let report = f.engine.tick_at(TickReason::Interval, t0()).await;
    assert_eq!(report.farms, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.irrigations, 1);
    assert_eq!(f.dispatcher.count("farm-a", CommandType::WaterPump), 0);
    assert_eq!(f.dispatcher.count("farm-b", CommandType::WaterPump), 1);

    // The failed farm still records the run
    assert_eq!(f.state.get_farm_state("farm-a").last_run_at, Some(t0()));
}

#[tokio::test]
async fn test_dispatch_failure_in_one_farm_does_not_block_others() {
    let f = fixture(RainSignalProvider::disabled());
    add_farm(&f, "farm-a", "wheat", 20.0, 60.0);
    add_farm(&f, "farm-b", "wheat", 20.0, 60.0);
    f.dispatcher.fail_for("farm-a");

    let report = f.engine.tick_at(TickReason::Interval, t0()).await;
    assert_eq!(report.failed, 0);
    assert_eq!(report.evaluated, 2);
    assert_eq!(report.degraded, 1);
    assert_eq!(report.irrigations, 1);
    assert_eq!(f.state.get_farm_state("farm-a").last_irrigation_at, None);
    assert_eq!(f.state.get_farm_state("farm-a").last_run_at, Some(t0()));
    assert_eq!(f.state.get_farm_state("farm-b").last_irrigation_at, Some(t0()));

    // The failed pump command is retried on the next tick
    let retry = f
        .engine
        .tick_at(TickReason::Interval, t0() + Duration::minutes(10))
        .await;
    assert_eq!(retry.degraded, 1);
    assert_eq!(f.dispatcher.count("farm-b", CommandType::WaterPump), 1);
}

#[tokio::test]
async fn test_failed_pump_command_still_fertilizes() {
    let f = fixture(RainSignalProvider::disabled());
    add_farm(&f, "farm-1", "wheat", 35.0, 10.0);
    f.dispatcher.fail_command_for("farm-1", CommandType::WaterPump);

    let report = f.engine.tick_at(TickReason::Interval, t0()).await;
    assert_eq!(report.evaluated, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.degraded, 1);
    assert_eq!(report.fertilizations, 1);

    let state = f.state.get_farm_state("farm-1");
    assert_eq!(state.last_irrigation_at, None);
    assert_eq!(state.last_fertilizer_at, Some(t0()));
    assert_eq!(state.last_run_at, Some(t0()));

    let logs = f.data.action_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, ActionKind::Fertilization);
}

#[tokio::test]
async fn test_farm_without_reading_records_run() {
    let f = fixture(RainSignalProvider::disabled());
    f.engine.register_farm("farm-empty");

    let report = f.engine.tick_at(TickReason::Interval, t0()).await;
    assert_eq!(report.skipped, 1);
    assert_eq!(f.state.get_farm_state("farm-empty").last_run_at, Some(t0()));
}

#[tokio::test]
async fn test_unknown_crop_uses_default_band() {
    let f = fixture(RainSignalProvider::disabled());
    // Default moisture band is 40-70: 39 is within the slack
    add_farm(&f, "farm-1", "dragonfruit", 39.0, 60.0);
    assert_eq!(f.engine.tick_at(TickReason::Interval, t0()).await.irrigations, 0);

    set_moisture(&f, "farm-1", 37.0, t0() + Duration::minutes(10));
    let report = f
        .engine
        .tick_at(TickReason::Interval, t0() + Duration::minutes(10))
        .await;
    assert_eq!(report.irrigations, 1);
}
