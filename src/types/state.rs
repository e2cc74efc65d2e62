//! Persisted per-farm automation state and tick reasons

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_autonomous() -> bool {
    true
}

/// Durable per-farm automation state, keyed by farm id in the state document.
///
/// The three timestamps only move forward; `AutomationStateStore` enforces
/// this when merging patches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmAutomationState {
    /// Whether the engine may act on this farm
    #[serde(default = "default_autonomous")]
    pub is_autonomous: bool,

    /// Last tick that evaluated this farm (any outcome)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,

    /// Last time an irrigation command was issued
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_irrigation_at: Option<DateTime<Utc>>,

    /// Last time a fertilization command was issued
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fertilizer_at: Option<DateTime<Utc>>,
}

impl Default for FarmAutomationState {
    fn default() -> Self {
        Self {
            is_autonomous: true,
            last_run_at: None,
            last_irrigation_at: None,
            last_fertilizer_at: None,
        }
    }
}

impl FarmAutomationState {
    /// Hours elapsed since `at`, or `None` if the event never happened.
    ///
    /// Negative spans (clock skew) read as zero.
    pub fn hours_since(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<f64> {
        at.map(|t| ((now - t).num_milliseconds() as f64 / 3_600_000.0).max(0.0))
    }
}

/// Partial update merged onto a stored `FarmAutomationState`.
///
/// `None` fields leave the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FarmStatePatch {
    pub is_autonomous: Option<bool>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_irrigation_at: Option<DateTime<Utc>>,
    pub last_fertilizer_at: Option<DateTime<Utc>>,
}

impl FarmStatePatch {
    pub fn autonomous(enabled: bool) -> Self {
        Self {
            is_autonomous: Some(enabled),
            ..Self::default()
        }
    }

    pub fn run_at(now: DateTime<Utc>) -> Self {
        Self {
            last_run_at: Some(now),
            ..Self::default()
        }
    }
}

/// Why a tick was started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TickReason {
    /// Immediate tick fired when the engine starts
    Startup,
    /// Periodic timer tick
    Interval,
    /// Operator-requested tick (HTTP or CLI)
    Manual,
}

impl std::fmt::Display for TickReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TickReason::Startup => write!(f, "startup"),
            TickReason::Interval => write!(f, "interval"),
            TickReason::Manual => write!(f, "manual"),
        }
    }
}
