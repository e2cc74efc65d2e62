//! Autonomous engine
//!
//! Owns the farm registry and the periodic tick. Each tick evaluates every
//! registered farm in turn:
//!
//! ```text
//! state → catch-up guard → reading → farm + crop → profile → rain
//!       → irrigation decision → fertilization decision → lastRunAt
//! ```
//!
//! Farms are evaluated sequentially and ticks are serialised, so a farm's
//! state read-modify-write never interleaves with another evaluation. An
//! error in one farm is logged and counted; the remaining farms still run.

mod policy;
mod report;

pub use policy::{
    cooldown_elapsed, decide_fertilization, decide_irrigation, describe_rain,
    FertilizationDecision, IrrigationDecision,
};
pub use report::{FarmOutcome, TickReport};

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collaborators::{load_farm_context, CollaboratorError, CommandDispatcher, FarmDataLayer};
use crate::config::{AutopilotConfig, EngineConfig, PolicyConfig};
use crate::crop_profile::CropProfileResolver;
use crate::storage::{AutomationStateStore, StateStoreError};
use crate::types::{
    ActionKind, ActionLogEntry, CommandType, FarmAutomationState, FarmStatePatch, TickReason,
};
use crate::weather::RainSignalProvider;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no tokio runtime available to run the engine")]
    NoRuntime,
    #[error("{command} dispatch failed: {source}")]
    Dispatch {
        command: CommandType,
        #[source]
        source: CollaboratorError,
    },
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error(transparent)]
    State(#[from] StateStoreError),
}

impl EngineError {
    /// Transport-level failures are expected and logged at low severity
    pub fn is_network(&self) -> bool {
        match self {
            EngineError::Dispatch { source, .. } => source.is_network(),
            EngineError::Collaborator(e) => e.is_network(),
            EngineError::NoRuntime | EngineError::State(_) => false,
        }
    }
}

/// Services the engine calls into
#[derive(Clone)]
pub struct EngineDeps {
    pub data: Arc<dyn FarmDataLayer>,
    pub dispatcher: Arc<dyn CommandDispatcher>,
    pub state: Arc<AutomationStateStore>,
    pub profiles: Arc<CropProfileResolver>,
    pub rain: Arc<RainSignalProvider>,
}

struct Runner {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodic control loop over registered farms
pub struct AutonomousEngine {
    deps: EngineDeps,
    config: EngineConfig,
    policy: PolicyConfig,
    farms: RwLock<BTreeSet<String>>,
    /// Serialises ticks (scheduled and manual)
    tick_lock: tokio::sync::Mutex<()>,
    runner: Mutex<Option<Runner>>,
    reports: watch::Sender<Option<TickReport>>,
}

impl AutonomousEngine {
    pub fn new(deps: EngineDeps, config: EngineConfig, policy: PolicyConfig) -> Self {
        let (reports, _) = watch::channel(None);
        Self {
            deps,
            config,
            policy,
            farms: RwLock::new(BTreeSet::new()),
            tick_lock: tokio::sync::Mutex::new(()),
            runner: Mutex::new(None),
            reports,
        }
    }

    pub fn from_config(deps: EngineDeps, config: &AutopilotConfig) -> Self {
        Self::new(deps, config.engine.clone(), config.policy.clone())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start the periodic tick, firing one startup tick immediately.
    ///
    /// Returns `Ok(false)` if the engine is already running.
    pub fn start(self: &Arc<Self>) -> Result<bool, EngineError> {
        let rt = tokio::runtime::Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        let mut runner = self.runner.lock().unwrap_or_else(|e| e.into_inner());

        if runner.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            debug!("Autonomous engine already running");
            return Ok(false);
        }

        let cancel = CancellationToken::new();
        let engine = Arc::clone(self);
        let token = cancel.clone();
        let handle = rt.spawn(async move { engine.run(token).await });
        *runner = Some(Runner { cancel, handle });

        info!(
            interval_secs = self.config.interval().as_secs(),
            farms = self.registered_farms().len(),
            "Autonomous engine started"
        );
        Ok(true)
    }

    /// Prevent further ticks. An in-flight tick runs to completion.
    ///
    /// Returns whether the engine was running.
    pub fn stop(&self) -> bool {
        let runner = self.runner.lock().unwrap_or_else(|e| e.into_inner()).take();
        match runner {
            Some(r) => {
                r.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Stop and wait for the loop task (and any in-flight tick) to finish.
    pub async fn shutdown(&self) {
        let runner = self.runner.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(r) = runner {
            r.cancel.cancel();
            if let Err(e) = r.handle.await {
                warn!(error = %e, "Autonomous engine task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.runner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        if cancel.is_cancelled() {
            return;
        }
        self.tick(TickReason::Startup).await;

        let period = self.config.interval();
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.tick(TickReason::Interval).await;
                }
            }
        }
        info!("Autonomous engine stopped");
    }

    // ------------------------------------------------------------------
    // Registry and autonomy flag
    // ------------------------------------------------------------------

    /// Add a farm to the evaluation set. Empty ids are ignored.
    ///
    /// Returns whether the farm was newly added.
    pub fn register_farm(&self, farm_id: &str) -> bool {
        if farm_id.trim().is_empty() {
            return false;
        }
        let added = self
            .farms
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(farm_id.to_string());
        if added {
            debug!(farm_id, "Farm registered");
        }
        added
    }

    /// Register every farm already present in the state document, so farms
    /// survive a restart without being re-registered by the host.
    ///
    /// Returns how many were newly added.
    pub fn register_known_farms(&self) -> usize {
        let mut added = 0;
        for farm_id in self.deps.state.all_states().into_keys() {
            if self.register_farm(&farm_id) {
                added += 1;
            }
        }
        added
    }

    pub fn registered_farms(&self) -> Vec<String> {
        self.farms
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Persist the autonomy flag and register the farm.
    pub fn set_autonomous_enabled(
        &self,
        farm_id: &str,
        enabled: bool,
    ) -> Result<FarmAutomationState, EngineError> {
        let state = self
            .deps
            .state
            .set_farm_state(farm_id, &FarmStatePatch::autonomous(enabled))?;
        self.register_farm(farm_id);
        info!(farm_id, enabled, "Autonomy updated");
        Ok(state)
    }

    pub fn get_autonomous_enabled(&self, farm_id: &str) -> bool {
        self.deps.state.get_farm_state(farm_id).is_autonomous
    }

    // ------------------------------------------------------------------
    // Ticks
    // ------------------------------------------------------------------

    /// Watch the report of each completed tick
    pub fn subscribe(&self) -> watch::Receiver<Option<TickReport>> {
        self.reports.subscribe()
    }

    pub fn last_report(&self) -> Option<TickReport> {
        self.reports.borrow().clone()
    }

    pub async fn tick(&self, reason: TickReason) -> TickReport {
        self.tick_at(reason, Utc::now()).await
    }

    /// Evaluate every registered farm as of `now`.
    pub async fn tick_at(&self, reason: TickReason, now: DateTime<Utc>) -> TickReport {
        let _guard = self.tick_lock.lock().await;

        let farms = self.registered_farms();
        let mut report = TickReport::new(reason, now, farms.len());
        if farms.is_empty() {
            debug!(reason = %reason, "Tick with no registered farms");
            self.reports.send_replace(Some(report.clone()));
            return report;
        }

        for farm_id in &farms {
            match self.evaluate_farm(farm_id, reason, now).await {
                Ok(outcome) => {
                    debug!(farm_id = %farm_id, reason = %reason, ?outcome, "Farm evaluated");
                    report.record(outcome);
                }
                Err(e) => {
                    report.failed += 1;
                    if e.is_network() {
                        debug!(farm_id = %farm_id, reason = %reason, error = %e, "Farm evaluation failed");
                    } else {
                        warn!(farm_id = %farm_id, reason = %reason, error = %e, "Farm evaluation failed");
                    }
                }
            }
        }

        if report.actions() > 0 || report.failed > 0 || report.degraded > 0 {
            info!(
                reason = %reason,
                farms = report.farms,
                evaluated = report.evaluated,
                skipped = report.skipped,
                degraded = report.degraded,
                failed = report.failed,
                irrigations = report.irrigations,
                fertilizations = report.fertilizations,
                "Tick complete"
            );
        } else {
            debug!(reason = %reason, farms = report.farms, evaluated = report.evaluated, "Tick complete, no action");
        }

        self.reports.send_replace(Some(report.clone()));
        report
    }

    /// Evaluate one farm. Callers must hold the tick lock.
    async fn evaluate_farm(
        &self,
        farm_id: &str,
        reason: TickReason,
        now: DateTime<Utc>,
    ) -> Result<FarmOutcome, EngineError> {
        let store = &self.deps.state;
        let state = store.get_farm_state(farm_id);
        if !state.is_autonomous {
            return Ok(FarmOutcome::Disabled);
        }

        if reason == TickReason::Startup {
            if let Some(last) = state.last_run_at {
                if now - last < self.policy.startup_catchup() {
                    debug!(farm_id, last_run_at = %last, "Evaluated recently, skipping startup catch-up");
                    return Ok(FarmOutcome::CatchUpSkipped);
                }
            }
        }

        let data = self.deps.data.as_ref();
        let reading = match data.get_latest_sensor_data(farm_id).await {
            Ok(Some(reading)) => reading,
            Ok(None) => {
                debug!(farm_id, "No sensor reading yet");
                store.set_farm_state(farm_id, &FarmStatePatch::run_at(now))?;
                return Ok(FarmOutcome::NoSnapshot);
            }
            Err(e) => {
                if e.is_network() {
                    debug!(farm_id, backend = data.backend_name(), error = %e, "Sensor fetch failed, no action this tick");
                } else {
                    warn!(farm_id, backend = data.backend_name(), error = %e, "Sensor fetch failed, no action this tick");
                }
                store.set_farm_state(farm_id, &FarmStatePatch::run_at(now))?;
                return Ok(FarmOutcome::NoSnapshot);
            }
        };

        let farm = load_farm_context(data, farm_id, &reading.farmer_id).await;
        let farmer_id = farm
            .farm
            .as_ref()
            .map(|f| f.farmer_id.clone())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| reading.farmer_id.clone());

        let profile = self
            .deps
            .profiles
            .resolve(farm.crop.as_deref(), farm.soil_type());
        let rain = self
            .deps
            .rain
            .get_rain_signal(farm.coordinates(), now)
            .await;

        // Irrigation
        let irrigation = decide_irrigation(
            reading.soil_moisture,
            &profile.moisture_optimal,
            rain.as_ref(),
            state.last_irrigation_at,
            now,
            self.config.irrigation_cooldown_hours,
            &self.policy,
        );
        let mut degraded = false;
        let mut irrigated = false;
        if irrigation.should_irrigate && self.dispatch(CommandType::WaterPump, farm_id).await {
            irrigated = true;
            store.set_farm_state(
                farm_id,
                &FarmStatePatch {
                    last_irrigation_at: Some(now),
                    ..FarmStatePatch::default()
                },
            )?;

            let mut details = format!(
                "Auto irrigation: soil moisture {:.1}% below optimal {}% for {} (rain next 6h: {})",
                reading.soil_moisture,
                profile.moisture_optimal,
                profile.crop,
                describe_rain(rain.as_ref()),
            );
            if irrigation.rain_likely && irrigation.very_low {
                details.push_str("; deficit very low, rain forecast overridden");
            }
            self.audit(ActionKind::Irrigation, farm_id, &farmer_id, details, now)
                .await;
        } else if irrigation.should_irrigate {
            degraded = true;
        } else if irrigation.needs_water {
            debug!(
                farm_id,
                moisture = reading.soil_moisture,
                cooldown_ok = irrigation.cooldown_ok,
                rain_likely = irrigation.rain_likely,
                "Irrigation needed but held back"
            );
        }

        // Fertilization
        let fertilization = decide_fertilization(
            &reading,
            &profile.npk_optimal,
            state.last_fertilizer_at,
            now,
            self.config.fertilizer_cooldown_hours,
            &self.policy,
        );
        let mut fertilized = false;
        if fertilization.should_fertilize && self.dispatch(CommandType::Fertilizer, farm_id).await {
            fertilized = true;
            store.set_farm_state(
                farm_id,
                &FarmStatePatch {
                    last_fertilizer_at: Some(now),
                    ..FarmStatePatch::default()
                },
            )?;

            let npk = &profile.npk_optimal;
            let details = format!(
                "Auto fertilization: N {:.0} (optimal {}), P {:.0} (optimal {}), K {:.0} (optimal {}) for {}; low: {}",
                reading.nitrogen,
                npk.nitrogen,
                reading.phosphorus,
                npk.phosphorus,
                reading.potassium,
                npk.potassium,
                profile.crop,
                fertilization.low.join(", "),
            );
            self.audit(ActionKind::Fertilization, farm_id, &farmer_id, details, now)
                .await;
        } else if fertilization.should_fertilize {
            degraded = true;
        } else if fertilization.nutrients_low() {
            debug!(
                farm_id,
                low = %fertilization.low.join(","),
                cooldown_ok = fertilization.cooldown_ok,
                moisture_ok = fertilization.moisture_ok,
                "Fertilization needed but held back"
            );
        }

        store.set_farm_state(farm_id, &FarmStatePatch::run_at(now))?;

        Ok(FarmOutcome::Evaluated {
            irrigated,
            fertilized,
            degraded,
        })
    }

    /// Send one command. A failure is logged and leaves the cooldown
    /// untouched so the next tick retries.
    ///
    /// Returns whether the command went out.
    async fn dispatch(&self, command: CommandType, farm_id: &str) -> bool {
        match self.deps.dispatcher.write_sensor_command(command, farm_id).await {
            Ok(()) => {
                info!(farm_id, command = %command, "Command issued");
                true
            }
            Err(source) => {
                let e = EngineError::Dispatch { command, source };
                if e.is_network() {
                    debug!(farm_id, error = %e, "Command dispatch failed");
                } else {
                    warn!(farm_id, error = %e, "Command dispatch failed");
                }
                false
            }
        }
    }

    /// Append an audit entry. The command already went out, so a failure
    /// here is logged and does not fail the evaluation.
    async fn audit(
        &self,
        action: ActionKind,
        farm_id: &str,
        farmer_id: &str,
        details: String,
        now: DateTime<Utc>,
    ) {
        let entry = ActionLogEntry::new(action, farmer_id, details, now);
        if let Err(e) = self.deps.data.create_action_log(entry).await {
            if e.is_network() {
                debug!(farm_id, action = %action, error = %e, "Audit log append failed");
            } else {
                warn!(farm_id, action = %action, error = %e, "Audit log append failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{InMemoryDataLayer, RecordingDispatcher};
    use crate::types::{FarmRecord, SensorSnapshot};
    use std::time::Duration;

    struct Harness {
        _dir: tempfile::TempDir,
        data: Arc<InMemoryDataLayer>,
        dispatcher: Arc<RecordingDispatcher>,
        engine: Arc<AutonomousEngine>,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let data = Arc::new(InMemoryDataLayer::new());
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let deps = EngineDeps {
            data: data.clone(),
            dispatcher: dispatcher.clone(),
            state: Arc::new(AutomationStateStore::open(dir.path().join("state.json"))),
            profiles: Arc::new(CropProfileResolver::builtin_only()),
            rain: Arc::new(RainSignalProvider::disabled()),
        };
        let engine = Arc::new(AutonomousEngine::new(
            deps,
            EngineConfig::default(),
            PolicyConfig::default(),
        ));
        Harness {
            _dir: dir,
            data,
            dispatcher,
            engine,
        }
    }

    fn dry_reading(now: DateTime<Utc>) -> SensorSnapshot {
        SensorSnapshot {
            soil_moisture: 20.0,
            nitrogen: 60.0,
            phosphorus: 30.0,
            potassium: 60.0,
            temperature: 26.0,
            timestamp: now,
            farmer_id: "farmer-1".to_string(),
        }
    }

    fn add_farm(h: &Harness, now: DateTime<Utc>) {
        h.data.upsert_farm(
            "farm-1",
            FarmRecord {
                farmer_id: "farmer-1".to_string(),
                ..FarmRecord::default()
            },
        );
        h.data.set_crop("farmer-1", "wheat");
        h.data.record_reading("farm-1", dry_reading(now));
        h.engine.register_farm("farm-1");
    }

    #[test]
    fn test_register_ignores_empty_id() {
        let h = harness();
        assert!(!h.engine.register_farm(""));
        assert!(!h.engine.register_farm("   "));
        assert!(h.engine.register_farm("farm-1"));
        assert!(!h.engine.register_farm("farm-1"));
        assert_eq!(h.engine.registered_farms(), vec!["farm-1".to_string()]);
    }

    #[test]
    fn test_known_farms_are_registered_from_state() {
        let h = harness();
        let store = &h.engine.deps.state;
        store.set_farm_state("farm-a", &FarmStatePatch::run_at(Utc::now())).unwrap();
        store.set_farm_state("farm-b", &FarmStatePatch::autonomous(false)).unwrap();
        h.engine.register_farm("farm-a");

        assert_eq!(h.engine.register_known_farms(), 1);
        assert_eq!(
            h.engine.registered_farms(),
            vec!["farm-a".to_string(), "farm-b".to_string()]
        );
        assert_eq!(h.engine.register_known_farms(), 0);
    }

    #[test]
    fn test_start_outside_runtime_is_an_error() {
        let h = harness();
        assert!(matches!(h.engine.start(), Err(EngineError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_empty_registry_tick_is_noop() {
        let h = harness();
        let report = h.engine.tick(TickReason::Manual).await;
        assert_eq!(report.farms, 0);
        assert!(h.dispatcher.commands().is_empty());
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_fail_evaluation() {
        let h = harness();
        let now = Utc::now();
        add_farm(&h, now);
        h.data.fail_action_logs(true);

        let report = h.engine.tick_at(TickReason::Manual, now).await;
        assert_eq!(report.failed, 0);
        assert_eq!(report.irrigations, 1);
        assert_eq!(h.engine.deps.state.get_farm_state("farm-1").last_irrigation_at, Some(now));
    }

    #[tokio::test]
    async fn test_dispatch_failure_degrades_but_completes_evaluation() {
        let h = harness();
        let now = Utc::now();
        add_farm(&h, now);
        h.dispatcher.fail_for("farm-1");

        let report = h.engine.tick_at(TickReason::Manual, now).await;
        assert_eq!(report.failed, 0);
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.degraded, 1);
        assert_eq!(report.irrigations, 0);

        let state = h.engine.deps.state.get_farm_state("farm-1");
        assert_eq!(state.last_irrigation_at, None);
        assert_eq!(state.last_run_at, Some(now));
        assert!(h.data.action_logs().is_empty());
    }

    #[tokio::test]
    async fn test_failed_irrigation_does_not_skip_fertilization() {
        let h = harness();
        let now = Utc::now();
        add_farm(&h, now);
        h.data.record_reading(
            "farm-1",
            SensorSnapshot {
                soil_moisture: 35.0,
                nitrogen: 10.0,
                ..dry_reading(now)
            },
        );
        h.dispatcher.fail_command_for("farm-1", CommandType::WaterPump);

        let report = h.engine.tick_at(TickReason::Manual, now).await;
        assert_eq!(report.degraded, 1);
        assert_eq!(report.irrigations, 0);
        assert_eq!(report.fertilizations, 1);
        assert_eq!(h.dispatcher.count("farm-1", CommandType::Fertilizer), 1);

        let state = h.engine.deps.state.get_farm_state("farm-1");
        assert_eq!(state.last_irrigation_at, None);
        assert_eq!(state.last_fertilizer_at, Some(now));
        assert_eq!(state.last_run_at, Some(now));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent_and_fires_startup_tick() {
        let h = harness();
        let now = Utc::now();
        add_farm(&h, now);
        let mut reports = h.engine.subscribe();

        assert!(h.engine.start().unwrap());
        assert!(!h.engine.start().unwrap());

        reports.changed().await.unwrap();
        let report = reports.borrow().clone().unwrap();
        assert_eq!(report.reason, TickReason::Startup);
        assert_eq!(report.irrigations, 1);

        // Next periodic tick runs after one interval
        tokio::time::sleep(h.engine.config().interval() + Duration::from_secs(1)).await;
        let report = h.engine.last_report().unwrap();
        assert_eq!(report.reason, TickReason::Interval);

        assert!(h.engine.stop());
        assert!(!h.engine.stop());
        assert!(!h.engine.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ticks_after_shutdown() {
        let h = harness();
        add_farm(&h, Utc::now());
        let mut reports = h.engine.subscribe();

        h.engine.start().unwrap();
        reports.changed().await.unwrap();
        h.engine.shutdown().await;

        tokio::time::sleep(h.engine.config().interval() * 3).await;
        assert_eq!(h.engine.last_report().unwrap().reason, TickReason::Startup);
    }
}
