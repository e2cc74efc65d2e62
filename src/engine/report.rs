//! Tick and per-farm outcomes

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::TickReason;

/// Result of evaluating one farm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FarmOutcome {
    /// Autonomy switched off, nothing touched
    Disabled,
    /// Startup tick within the catch-up window of the last evaluation
    CatchUpSkipped,
    /// No reading available (missing or fetch failed)
    NoSnapshot,
    /// `degraded` is set when a decided command could not be dispatched
    Evaluated {
        irrigated: bool,
        fertilized: bool,
        degraded: bool,
    },
}

/// Summary of one tick over all registered farms
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub reason: TickReason,
    pub started_at: DateTime<Utc>,
    /// Registered farms at tick start
    pub farms: usize,
    pub evaluated: usize,
    /// Disabled, catch-up or no reading
    pub skipped: usize,
    /// Evaluated, but at least one command dispatch failed
    pub degraded: usize,
    pub failed: usize,
    pub irrigations: usize,
    pub fertilizations: usize,
}

impl TickReport {
    pub fn new(reason: TickReason, started_at: DateTime<Utc>, farms: usize) -> Self {
        Self {
            reason,
            started_at,
            farms,
            evaluated: 0,
            skipped: 0,
            degraded: 0,
            failed: 0,
            irrigations: 0,
            fertilizations: 0,
        }
    }

    pub fn record(&mut self, outcome: FarmOutcome) {
        match outcome {
            FarmOutcome::Evaluated {
                irrigated,
                fertilized,
                degraded,
            } => {
                self.evaluated += 1;
                self.degraded += usize::from(degraded);
                self.irrigations += usize::from(irrigated);
                self.fertilizations += usize::from(fertilized);
            }
            FarmOutcome::Disabled | FarmOutcome::CatchUpSkipped | FarmOutcome::NoSnapshot => {
                self.skipped += 1;
            }
        }
    }

    pub fn actions(&self) -> usize {
        self.irrigations + self.fertilizations
    }
}
