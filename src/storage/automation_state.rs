//! Automation state store
//!
//! One JSON document mapping farm id → [`FarmAutomationState`]. All mutation
//! goes through `set_farm_state`: read the document, merge the patch, write a
//! temp file and rename it over the document, under a process-local lock.
//!
//! Reads never fail. A missing file, unparsable content, a non-object root, or
//! a malformed per-farm entry all read as the default state.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::types::{FarmAutomationState, FarmStatePatch};

#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error("state I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] io::Error),
    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable per-farm automation state
#[derive(Debug)]
pub struct AutomationStateStore {
    path: PathBuf,
    /// Serialises read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl AutomationStateStore {
    /// Store backed by the document at `path`. The file is created on first write.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored state for a farm, or the default `{isAutonomous: true}`.
    pub fn get_farm_state(&self, farm_id: &str) -> FarmAutomationState {
        let doc = self.read_document();
        entry_state(farm_id, doc.get(farm_id))
    }

    /// Every readable farm state in the document.
    pub fn all_states(&self) -> BTreeMap<String, FarmAutomationState> {
        self.read_document()
            .iter()
            .map(|(id, v)| (id.clone(), entry_state(id, Some(v))))
            .collect()
    }

    /// Merge `patch` onto the stored (or default) state and persist the document.
    ///
    /// Timestamps never move backwards: a patched timestamp older than the
    /// stored one is ignored. Returns the merged state.
    pub fn set_farm_state(
        &self,
        farm_id: &str,
        patch: &FarmStatePatch,
    ) -> Result<FarmAutomationState, StateStoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| {
            warn!("State store lock poisoned, recovering");
            e.into_inner()
        });

        let mut doc = self.read_document();
        let current = entry_state(farm_id, doc.get(farm_id));
        let merged = merge(farm_id, current, patch);

        doc.insert(farm_id.to_string(), serde_json::to_value(&merged)?);
        self.write_document(&doc)?;
        Ok(merged)
    }

    fn read_document(&self) -> Map<String, Value> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Map::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read automation state, using defaults");
                return Map::new();
            }
        };

        let text = String::from_utf8_lossy(&bytes);
        let text = text.trim_start_matches('\u{feff}');
        if text.trim().is_empty() {
            return Map::new();
        }

        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!(path = %self.path.display(), "Automation state root is not an object, using defaults");
                Map::new()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Automation state unparsable, using defaults");
                Map::new()
            }
        }
    }

    /// Write the document atomically (temp file, then rename).
    fn write_document(&self, doc: &Map<String, Value>) -> Result<(), StateStoreError> {
        let json = serde_json::to_vec_pretty(doc)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StateStoreError::Io(parent.to_path_buf(), e))?;
        }

        let tmp_path = self.tmp_path();
        std::fs::write(&tmp_path, &json).map_err(|e| StateStoreError::Io(tmp_path.clone(), e))?;
        if let Err(e) = std::fs::rename(&tmp_path, &self.path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(StateStoreError::Io(self.path.clone(), e));
        }
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map_or_else(|| "automation_state".into(), |n| n.to_string_lossy().into_owned());
        self.path
            .with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
    }
}

fn entry_state(farm_id: &str, value: Option<&Value>) -> FarmAutomationState {
    match value {
        None => FarmAutomationState::default(),
        Some(v) => serde_json::from_value(v.clone()).unwrap_or_else(|e| {
            debug!(farm_id, error = %e, "Malformed farm state entry, using default");
            FarmAutomationState::default()
        }),
    }
}

fn merge(
    farm_id: &str,
    mut state: FarmAutomationState,
    patch: &FarmStatePatch,
) -> FarmAutomationState {
    if let Some(enabled) = patch.is_autonomous {
        state.is_autonomous = enabled;
    }
    state.last_run_at = forward_only(farm_id, "lastRunAt", state.last_run_at, patch.last_run_at);
    state.last_irrigation_at = forward_only(
        farm_id,
        "lastIrrigationAt",
        state.last_irrigation_at,
        patch.last_irrigation_at,
    );
    state.last_fertilizer_at = forward_only(
        farm_id,
        "lastFertilizerAt",
        state.last_fertilizer_at,
        patch.last_fertilizer_at,
    );
    state
}

fn forward_only(
    farm_id: &str,
    field: &str,
    current: Option<DateTime<Utc>>,
    patched: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    match (current, patched) {
        (Some(cur), Some(new)) if new < cur => {
            debug!(farm_id, field, current = %cur, ignored = %new, "Ignoring backwards timestamp");
            Some(cur)
        }
        (_, Some(new)) => Some(new),
        (cur, None) => cur,
    }
}
