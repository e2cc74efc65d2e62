//! In-memory data layer
//!
//! Thread-safe via `RwLock`. Not durable, data is lost on restart. Used by the
//! tests, the simulation binary, and the service binary when it runs without
//! a hosted store (seeded from a JSON file, readings ingested over HTTP).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::RwLock;

use super::{CollaboratorError, FarmDataLayer};
use crate::types::{ActionLogEntry, FarmRecord, FarmSettings, SensorSnapshot};

/// One farm in a seed file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FarmSeed {
    pub farm_id: String,
    #[serde(flatten)]
    pub farm: FarmRecord,
    /// Crop stored as the farmer's settings
    #[serde(default)]
    pub crop: Option<String>,
    /// Initial reading
    #[serde(default)]
    pub reading: Option<SensorSnapshot>,
}

/// Seed document: `{ "farms": [ ... ] }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub farms: Vec<FarmSeed>,
}

impl SeedFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse seed file: {}", path.display()))
    }
}

#[derive(Default)]
struct Tables {
    farms: HashMap<String, FarmRecord>,
    settings: HashMap<String, FarmSettings>,
    readings: HashMap<String, SensorSnapshot>,
    action_logs: Vec<ActionLogEntry>,
    failing_reading_farms: HashSet<String>,
    fail_action_logs: bool,
}

/// In-memory implementation of [`FarmDataLayer`]
pub struct InMemoryDataLayer {
    tables: RwLock<Tables>,
}

impl InMemoryDataLayer {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Build a data layer pre-populated from a seed document.
    pub fn from_seed(seed: &SeedFile) -> Self {
        let layer = Self::new();
        for farm in &seed.farms {
            layer.upsert_farm(&farm.farm_id, farm.farm.clone());
            if let Some(crop) = &farm.crop {
                layer.set_crop(&farm.farm.farmer_id, crop);
            }
            if let Some(reading) = &farm.reading {
                layer.record_reading(&farm.farm_id, reading.clone());
            }
        }
        layer
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| {
            tracing::warn!("RwLock poisoned on data layer write, recovering");
            e.into_inner()
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| {
            tracing::warn!("RwLock poisoned on data layer read, recovering");
            e.into_inner()
        })
    }

    pub fn upsert_farm(&self, farm_id: &str, farm: FarmRecord) {
        self.write().farms.insert(farm_id.to_string(), farm);
    }

    pub fn set_crop(&self, farmer_id: &str, crop: &str) {
        self.write().settings.insert(
            farmer_id.to_string(),
            FarmSettings {
                crop: Some(crop.to_string()),
            },
        );
    }

    /// Store a reading; an older reading never replaces a newer one.
    ///
    /// Returns whether the reading became the latest.
    pub fn record_reading(&self, farm_id: &str, reading: SensorSnapshot) -> bool {
        let mut tables = self.write();
        match tables.readings.get(farm_id) {
            Some(existing) if existing.timestamp > reading.timestamp => false,
            _ => {
                tables.readings.insert(farm_id.to_string(), reading);
                true
            }
        }
    }

    pub fn farm_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().farms.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot of the audit trail, oldest first
    pub fn action_logs(&self) -> Vec<ActionLogEntry> {
        self.read().action_logs.clone()
    }

    /// Make reading fetches for `farm_id` fail with a network error.
    pub fn fail_readings_for(&self, farm_id: &str) {
        self.write().failing_reading_farms.insert(farm_id.to_string());
    }

    /// Make audit-log appends fail with a backend error.
    pub fn fail_action_logs(&self, fail: bool) {
        self.write().fail_action_logs = fail;
    }
}

impl Default for InMemoryDataLayer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FarmDataLayer for InMemoryDataLayer {
    async fn get_latest_sensor_data(
        &self,
        farm_id: &str,
    ) -> Result<Option<SensorSnapshot>, CollaboratorError> {
        let tables = self.read();
        if tables.failing_reading_farms.contains(farm_id) {
            return Err(CollaboratorError::Network(format!(
                "reading fetch failed for farm {}",
                farm_id
            )));
        }
        Ok(tables.readings.get(farm_id).cloned())
    }

    async fn get_farm_by_id(&self, farm_id: &str) -> Result<Option<FarmRecord>, CollaboratorError> {
        Ok(self.read().farms.get(farm_id).cloned())
    }

    async fn get_farm_settings(
        &self,
        farmer_id: &str,
    ) -> Result<Option<FarmSettings>, CollaboratorError> {
        Ok(self.read().settings.get(farmer_id).cloned())
    }

    async fn create_action_log(&self, entry: ActionLogEntry) -> Result<(), CollaboratorError> {
        let mut tables = self.write();
        if tables.fail_action_logs {
            return Err(CollaboratorError::Backend("action log store unavailable".to_string()));
        }
        tables.action_logs.push(entry);
        Ok(())
    }

    async fn get_action_logs_since(
        &self,
        farmer_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActionLogEntry>, CollaboratorError> {
        let mut entries: Vec<ActionLogEntry> = self
            .read()
            .action_logs
            .iter()
            .filter(|e| e.farmer_id == farmer_id && e.timestamp >= since)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionKind;
    use chrono::Duration;

    fn reading(moisture: f64, at: DateTime<Utc>) -> SensorSnapshot {
        SensorSnapshot {
            soil_moisture: moisture,
            nitrogen: 50.0,
            phosphorus: 30.0,
            potassium: 50.0,
            temperature: 25.0,
            timestamp: at,
            farmer_id: "farmer-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_older_reading_does_not_replace_newer() {
        let layer = InMemoryDataLayer::new();
        let now = Utc::now();
        assert!(layer.record_reading("farm-1", reading(40.0, now)));
        assert!(!layer.record_reading("farm-1", reading(10.0, now - Duration::hours(1))));

        let latest = layer.get_latest_sensor_data("farm-1").await.unwrap().unwrap();
        assert_eq!(latest.soil_moisture, 40.0);
    }

    #[tokio::test]
    async fn test_action_logs_since_filters_by_farmer_and_time() {
        let layer = InMemoryDataLayer::new();
        let now = Utc::now();
        for (farmer, offset) in [("a", 3), ("a", 1), ("b", 1)] {
            layer
                .create_action_log(ActionLogEntry::new(
                    ActionKind::Irrigation,
                    farmer,
                    "",
                    now - Duration::hours(offset),
                ))
                .await
                .unwrap();
        }

        let logs = layer
            .get_action_logs_since("a", now - Duration::hours(2))
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].farmer_id, "a");
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let layer = InMemoryDataLayer::new();
        layer.fail_readings_for("farm-x");
        let err = layer.get_latest_sensor_data("farm-x").await.unwrap_err();
        assert!(err.is_network());

        layer.fail_action_logs(true);
        let err = layer
            .create_action_log(ActionLogEntry::new(ActionKind::Info, "a", "", Utc::now()))
            .await
            .unwrap_err();
        assert!(!err.is_network());
    }

    #[test]
    fn test_seed_file_parsing() {
        let json = r#"{
            "farms": [{
                "farm_id": "farm-1",
                "farmer_id": "farmer-1",
                "soil_type": "Sandy Loam",
                "latitude": 12.9,
                "longitude": 77.6,
                "crop": "wheat",
                "reading": {
                    "soil_moisture": 25, "nitrogen": 50, "phosphorus": 30,
                    "potassium": 50, "temperature": 28,
                    "timestamp": "2026-05-01T06:00:00Z", "farmer_id": "farmer-1"
                }
            }]
        }"#;
        let seed: SeedFile = serde_json::from_str(json).unwrap();
        let layer = InMemoryDataLayer::from_seed(&seed);
        assert_eq!(layer.farm_ids(), vec!["farm-1".to_string()]);
        assert_eq!(seed.farms[0].farm.soil_type.as_deref(), Some("Sandy Loam"));
    }
}
