//! Audit-log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of audit-log entry.
///
/// Unknown kinds written by other parts of the product deserialize as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Irrigation,
    Fertilization,
    Info,
    #[serde(other)]
    Other,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Irrigation => write!(f, "irrigation"),
            ActionKind::Fertilization => write!(f, "fertilization"),
            ActionKind::Info => write!(f, "info"),
            ActionKind::Other => write!(f, "other"),
        }
    }
}

/// Append-only audit trail entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub action: ActionKind,
    pub farmer_id: String,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl ActionLogEntry {
    pub fn new(
        action: ActionKind,
        farmer_id: impl Into<String>,
        details: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            action,
            farmer_id: farmer_id.into(),
            details: details.into(),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_action_kind_is_other() {
        let json = r#"{"action":"harvest","farmer_id":"f1","details":"","timestamp":"2026-01-01T00:00:00Z"}"#;
        let entry: ActionLogEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.action, ActionKind::Other);
    }

    #[test]
    fn test_action_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&ActionKind::Fertilization).unwrap(),
            "\"fertilization\""
        );
    }
}
