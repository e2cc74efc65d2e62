//! Farm Autopilot service
//!
//! Runs the autonomous control loop next to its HTTP surface.
//!
//! # Usage
//!
//! ```bash
//! # Defaults (./autopilot.toml if present, state in ./data)
//! farm-autopilot
//!
//! # Seed farms, settings and first readings from a JSON file
//! farm-autopilot --farms farms.json --addr 127.0.0.1:8080
//!
//! # HTTP only, no periodic ticks
//! farm-autopilot --no-engine
//! ```
//!
//! # Environment Variables
//!
//! - `AUTOPILOT_CONFIG`: Path to the TOML config (default: ./autopilot.toml)
//! - `AUTONOMOUS_INTERVAL_SECONDS`, `AUTONOMOUS_*_COOLDOWN_HOURS`: engine cadence
//! - `OPENWEATHER_API_KEY`: enables the rain signal
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use farm_autopilot::api::{create_app, ApiState};
use farm_autopilot::collaborators::{InMemoryDataLayer, LoggingDispatcher, SeedFile};
use farm_autopilot::config::AutopilotConfig;
use farm_autopilot::crop_profile::CropProfileResolver;
use farm_autopilot::drift::{OfflineDriftEstimator, SnapshotProjector};
use farm_autopilot::engine::{AutonomousEngine, EngineDeps};
use farm_autopilot::storage::AutomationStateStore;
use farm_autopilot::weather::RainSignalProvider;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "farm-autopilot")]
#[command(about = "Autonomous irrigation and fertilization control loop")]
#[command(version)]
struct CliArgs {
    /// Path to the TOML configuration file
    #[arg(long, env = "AUTOPILOT_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP listen address (overrides config)
    #[arg(long, value_name = "HOST:PORT")]
    addr: Option<String>,

    /// Automation state document (overrides config)
    #[arg(long)]
    state_path: Option<PathBuf>,

    /// JSON seed file with farms, crops and initial readings
    #[arg(long, value_name = "FILE")]
    farms: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Serve HTTP without running the periodic engine
    #[arg(long)]
    no_engine: bool,
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_config(args: &CliArgs) -> Result<AutopilotConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let mut cfg = AutopilotConfig::load_from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?;
            cfg.apply_env_overrides();
            for adjustment in cfg.sanitize() {
                warn!("Config adjusted: {}", adjustment);
            }
            cfg
        }
        None => AutopilotConfig::load(),
    };

    if let Some(addr) = &args.addr {
        config.server.addr = addr.clone();
    }
    if let Some(path) = &args.state_path {
        config.storage.state_path = path.clone();
    }
    Ok(config)
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_json);

    let config = load_config(&args)?;
    info!(
        interval_secs = config.engine.interval().as_secs(),
        irrigation_cooldown_h = config.engine.irrigation_cooldown_hours,
        fertilizer_cooldown_h = config.engine.fertilizer_cooldown_hours,
        state_path = %config.storage.state_path.display(),
        "Farm Autopilot starting"
    );

    let seed = match &args.farms {
        Some(path) => SeedFile::load(path)?,
        None => SeedFile::default(),
    };
    let data = Arc::new(InMemoryDataLayer::from_seed(&seed));

    let profiles = Arc::new(CropProfileResolver::new(config.crops.dataset_path.clone()));
    let rain = Arc::new(RainSignalProvider::from_config(&config.weather));
    if !rain.is_enabled() {
        info!("Rain signal disabled (no forecast API key)");
    }

    let deps = EngineDeps {
        data: data.clone(),
        dispatcher: Arc::new(LoggingDispatcher),
        state: Arc::new(AutomationStateStore::open(&config.storage.state_path)),
        profiles: profiles.clone(),
        rain: rain.clone(),
    };
    let engine = Arc::new(AutonomousEngine::from_config(deps, &config));
    for farm in &seed.farms {
        engine.register_farm(&farm.farm_id);
    }
    let restored = engine.register_known_farms();
    if restored > 0 {
        info!(farms = restored, "Farms restored from automation state");
    }

    let projector = Arc::new(SnapshotProjector::new(
        data.clone(),
        rain,
        OfflineDriftEstimator::new(config.drift.clone()),
    ));

    let app = create_app(ApiState {
        engine: engine.clone(),
        data,
        projector,
        profiles,
        started_at: Utc::now(),
    });

    let listener = tokio::net::TcpListener::bind(&config.server.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.addr))?;
    info!(addr = %config.server.addr, "HTTP server listening");

    if args.no_engine {
        info!("Engine disabled (--no-engine)");
    } else {
        engine.start().context("Failed to start autonomous engine")?;
    }

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let server_token = cancel_token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            server_token.cancelled().await;
        })
        .await
        .context("HTTP server error")?;

    engine.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}
