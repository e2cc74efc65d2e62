//! Farm Simulation
//!
//! Drives the autonomous engine over synthetic farms on a virtual clock.
//! Soil dries according to the drift model, forecast rain falls on schedule,
//! and every irrigation or fertilization command feeds back into the next
//! reading. Each issued command is printed.
//!
//! # Usage
//! ```bash
//! ./simulation --farms 8 --days 14 --step-minutes 10 --seed 7
//! ```

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use clap::Parser;
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use std::path::PathBuf;
use std::sync::Arc;

use farm_autopilot::collaborators::{InMemoryDataLayer, RecordingDispatcher};
use farm_autopilot::config::AutopilotConfig;
use farm_autopilot::crop_profile::CropProfileResolver;
use farm_autopilot::drift::{DriftContext, OfflineDriftEstimator};
use farm_autopilot::engine::{AutonomousEngine, EngineDeps};
use farm_autopilot::storage::AutomationStateStore;
use farm_autopilot::types::{CommandType, FarmRecord, RainSignal, SensorSnapshot, TickReason};
use farm_autopilot::weather::{aggregate_rain, ForecastEntry, ForecastError, ForecastSource, RainSignalProvider};

const CROPS: [&str; 6] = ["wheat", "rice", "maize", "tomato", "cotton", "millet"];
const SOILS: [&str; 4] = ["sandy", "loam", "clay", "silt"];

/// Moisture points added per mm of rain that actually falls
const RAIN_SOAK_PER_MM: f64 = 1.5;
/// Moisture points added by one irrigation run
const IRRIGATION_RISE: f64 = 25.0;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "simulation")]
#[command(about = "Synthetic farm simulation for the autonomous engine")]
#[command(version = "1.0")]
struct Args {
    /// Number of synthetic farms
    #[arg(long, default_value = "5", value_parser = clap::value_parser!(u32).range(1..=200))]
    farms: u32,

    /// Simulated duration in days
    #[arg(long, default_value = "7", value_parser = clap::value_parser!(u32).range(1..=60))]
    days: u32,

    /// Virtual minutes between ticks
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u32).range(1..=240))]
    step_minutes: u32,

    /// Chance that a 3-hour forecast bucket carries rain
    #[arg(long, default_value = "0.08")]
    rain_chance: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Automation state document (default: a file in the temp directory)
    #[arg(long)]
    state_path: Option<PathBuf>,

    /// Only print the summary
    #[arg(short, long)]
    quiet: bool,
}

// ============================================================================
// Virtual forecast
// ============================================================================

/// Forecast buckets generated up front and served for every coordinate
struct SimForecast {
    entries: Vec<ForecastEntry>,
}

impl SimForecast {
    fn generate(rng: &mut StdRng, start: DateTime<Utc>, days: u32, rain_chance: f64) -> Self {
        let buckets = days as i64 * 8 + 2;
        let entries = (0..buckets)
            .map(|i| {
                let raining = rng.gen_bool(rain_chance.clamp(0.0, 1.0));
                ForecastEntry {
                    dt: start + Duration::hours(3 * i),
                    pop: if raining { rng.gen_range(0.55..1.0) } else { rng.gen_range(0.0..0.3) },
                    rain_mm: if raining { rng.gen_range(0.5..12.0) } else { 0.0 },
                }
            })
            .collect();
        Self { entries }
    }

    fn snapshot(&self) -> Vec<ForecastEntry> {
        self.entries.clone()
    }
}

#[async_trait]
impl ForecastSource for SimForecast {
    async fn fetch(&self, _lat: f64, _lon: f64) -> Result<Vec<ForecastEntry>, ForecastError> {
        Ok(self.snapshot())
    }

    fn source_name(&self) -> &str {
        "simulation"
    }
}

// ============================================================================
// Simulation State
// ============================================================================

struct SimFarm {
    id: String,
    farmer_id: String,
    crop: &'static str,
    soil: &'static str,
    reading: SensorSnapshot,
    irrigations: u32,
    fertilizations: u32,
    min_moisture: f64,
}

struct Simulation {
    rng: StdRng,
    noise: Normal<f64>,
    data: Arc<InMemoryDataLayer>,
    dispatcher: Arc<RecordingDispatcher>,
    engine: Arc<AutonomousEngine>,
    estimator: OfflineDriftEstimator,
    forecast: Arc<SimForecast>,
    farms: Vec<SimFarm>,
    seen_commands: usize,
    quiet: bool,
}

impl Simulation {
    /// Project one farm's reading forward by `step`, then apply rain that fell.
    fn advance_farm(&mut self, idx: usize, now: DateTime<Utc>, step: Duration) {
        let rain_now = rain_fallen(&self.forecast.snapshot(), now - step, now);
        let farm = &mut self.farms[idx];

        let ctx = DriftContext {
            soil_type: Some(farm.soil.to_string()),
            crop: Some(farm.crop.to_string()),
            rain: Some(aggregate_rain(&self.forecast.snapshot(), now, Duration::hours(6))),
            actions: Vec::new(),
        };
        let projected = self.estimator.estimate(&farm.reading, now, &ctx).snapshot;

        let jitter = self.noise.sample(&mut self.rng);
        let mut next = projected;
        next.soil_moisture = (next.soil_moisture + rain_now * RAIN_SOAK_PER_MM + jitter).clamp(0.0, 100.0);
        next.temperature = (farm.reading.temperature + self.noise.sample(&mut self.rng) * 0.5).clamp(5.0, 45.0);
        next.timestamp = now;

        farm.min_moisture = farm.min_moisture.min(next.soil_moisture);
        farm.reading = next;
        self.data.record_reading(&farm.id, farm.reading.clone());
    }

    /// Apply commands issued since the last call to the farms they target.
    fn apply_commands(&mut self, now: DateTime<Utc>) {
        let commands = self.dispatcher.commands();
        let config = self.estimator.config().clone();
        for cmd in &commands[self.seen_commands..] {
            let Some(farm) = self.farms.iter_mut().find(|f| f.id == cmd.farm_id) else {
                continue;
            };
            match cmd.command {
                CommandType::WaterPump => {
                    farm.irrigations += 1;
                    farm.reading.soil_moisture = (farm.reading.soil_moisture + IRRIGATION_RISE).min(100.0);
                }
                CommandType::Fertilizer => {
                    farm.fertilizations += 1;
                    farm.reading.nitrogen += config.fertilizer_n_bump;
                    farm.reading.phosphorus += config.fertilizer_p_bump;
                    farm.reading.potassium += config.fertilizer_k_bump;
                }
            }
            if !self.quiet {
                println!(
                    "[{}] {:<10} {:<11} crop={:<7} soil={:<6} moisture={:.1}",
                    now.format("%Y-%m-%d %H:%M"),
                    farm.id,
                    cmd.command.as_str(),
                    farm.crop,
                    farm.soil,
                    farm.reading.soil_moisture,
                );
            }
            self.data.record_reading(&farm.id, farm.reading.clone());
        }
        self.seen_commands = commands.len();
    }
}

/// Rain (mm) from forecast buckets that fell in `(from, to]`
fn rain_fallen(entries: &[ForecastEntry], from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    entries
        .iter()
        .filter(|e| e.dt > from && e.dt <= to && e.pop >= RainSignal::LIKELY_POP)
        .map(|e| e.rain_mm)
        .sum()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut rng = match args.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    let start = Utc
        .with_ymd_and_hms(2026, 6, 1, 6, 0, 0)
        .single()
        .ok_or_else(|| anyhow!("invalid simulation start time"))?;
    let step = Duration::minutes(i64::from(args.step_minutes));
    let steps = i64::from(args.days) * 24 * 60 / i64::from(args.step_minutes);

    let state_path = args.state_path.clone().unwrap_or_else(|| {
        std::env::temp_dir().join(format!("farm-autopilot-sim-{}.json", std::process::id()))
    });
    let _ = std::fs::remove_file(&state_path);

    let config = AutopilotConfig::default();
    let forecast = Arc::new(SimForecast::generate(&mut rng, start, args.days, args.rain_chance));
    let data = Arc::new(InMemoryDataLayer::new());
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let deps = EngineDeps {
        data: data.clone(),
        dispatcher: dispatcher.clone(),
        state: Arc::new(AutomationStateStore::open(&state_path)),
        profiles: Arc::new(CropProfileResolver::builtin_only()),
        rain: Arc::new(RainSignalProvider::new(
            forecast.clone(),
            std::time::Duration::from_secs(config.weather.timeout_secs),
        )),
    };
    let engine = Arc::new(AutonomousEngine::from_config(deps, &config));

    let mut farms = Vec::with_capacity(args.farms as usize);
    for i in 0..args.farms {
        let id = format!("farm-{:03}", i + 1);
        let farmer_id = format!("farmer-{:03}", i + 1);
        let crop = CROPS[rng.gen_range(0..CROPS.len())];
        let soil = SOILS[rng.gen_range(0..SOILS.len())];
        data.upsert_farm(
            &id,
            FarmRecord {
                soil_type: Some(soil.to_string()),
                latitude: Some(rng.gen_range(8.0..35.0)),
                longitude: Some(rng.gen_range(68.0..97.0)),
                farmer_id: farmer_id.clone(),
            },
        );
        data.set_crop(&farmer_id, crop);

        let reading = SensorSnapshot {
            soil_moisture: rng.gen_range(30.0..70.0),
            nitrogen: rng.gen_range(30.0..90.0),
            phosphorus: rng.gen_range(15.0..45.0),
            potassium: rng.gen_range(30.0..90.0),
            temperature: rng.gen_range(18.0..34.0),
            timestamp: start,
            farmer_id: farmer_id.clone(),
        };
        data.record_reading(&id, reading.clone());
        engine.register_farm(&id);

        farms.push(SimFarm {
            id,
            farmer_id,
            crop,
            soil,
            min_moisture: reading.soil_moisture,
            reading,
            irrigations: 0,
            fertilizations: 0,
        });
    }

    let mut sim = Simulation {
        rng,
        noise: Normal::new(0.0, 0.4).map_err(|e| anyhow!("noise distribution: {}", e))?,
        data,
        dispatcher,
        engine: engine.clone(),
        estimator: OfflineDriftEstimator::new(config.drift.clone()),
        forecast,
        farms,
        seen_commands: 0,
        quiet: args.quiet,
    };

    if !args.quiet {
        println!(
            "Simulating {} farms for {} days ({} ticks, {} min step)",
            args.farms, args.days, steps, args.step_minutes
        );
    }

    let mut failed = 0;
    for n in 0..=steps {
        let now = start + Duration::minutes(i64::from(args.step_minutes) * n);
        if n > 0 {
            for idx in 0..sim.farms.len() {
                sim.advance_farm(idx, now, step);
            }
        }
        let reason = if n == 0 { TickReason::Startup } else { TickReason::Interval };
        let report = sim.engine.tick_at(reason, now).await;
        failed += report.failed;
        sim.apply_commands(now);
    }

    println!();
    println!("{:<10} {:<11} {:<7} {:<6} {:>5} {:>5} {:>8}", "farm", "farmer", "crop", "soil", "irr", "fert", "min moist");
    for farm in &sim.farms {
        println!(
            "{:<10} {:<11} {:<7} {:<6} {:>5} {:>5} {:>8.1}",
            farm.id, farm.farmer_id, farm.crop, farm.soil, farm.irrigations, farm.fertilizations, farm.min_moisture
        );
    }
    println!(
        "\n{} irrigations, {} fertilizations, {} failed evaluations, {} audit entries",
        sim.farms.iter().map(|f| f.irrigations).sum::<u32>(),
        sim.farms.iter().map(|f| f.fertilizations).sum::<u32>(),
        failed,
        sim.data.action_logs().len(),
    );

    if args.state_path.is_none() {
        let _ = std::fs::remove_file(&state_path);
    }
    Ok(())
}
