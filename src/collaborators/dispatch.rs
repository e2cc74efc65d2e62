//! Command dispatchers

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

use super::{CollaboratorError, CommandDispatcher};
use crate::types::CommandType;

/// Emits every command as a structured log event.
///
/// Stands in for the actuator subsystem when none is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDispatcher;

#[async_trait]
impl CommandDispatcher for LoggingDispatcher {
    async fn write_sensor_command(
        &self,
        command: CommandType,
        farm_id: &str,
    ) -> Result<(), CollaboratorError> {
        info!(farm_id, command = %command, "Actuator command issued");
        Ok(())
    }
}

/// A command captured by [`RecordingDispatcher`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchedCommand {
    pub command: CommandType,
    pub farm_id: String,
    pub at: DateTime<Utc>,
}

/// Keeps issued commands in memory.
///
/// Commands for farms registered with [`RecordingDispatcher::fail_for`] (or
/// one command type via [`RecordingDispatcher::fail_command_for`]) are
/// rejected with a backend error instead.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    commands: Mutex<Vec<DispatchedCommand>>,
    /// `None` fails every command for the farm
    failing: Mutex<HashMap<String, Option<CommandType>>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, farm_id: &str) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(farm_id.to_string(), None);
    }

    pub fn fail_command_for(&self, farm_id: &str, command: CommandType) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(farm_id.to_string(), Some(command));
    }

    pub fn commands(&self) -> Vec<DispatchedCommand> {
        self.commands.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Commands of one type issued for one farm
    pub fn count(&self, farm_id: &str, command: CommandType) -> usize {
        self.commands
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|c| c.farm_id == farm_id && c.command == command)
            .count()
    }
}

#[async_trait]
impl CommandDispatcher for RecordingDispatcher {
    async fn write_sensor_command(
        &self,
        command: CommandType,
        farm_id: &str,
    ) -> Result<(), CollaboratorError> {
        let rejected = self
            .failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(farm_id)
            .is_some_and(|only| only.map_or(true, |c| c == command));
        if rejected {
            return Err(CollaboratorError::Backend(format!(
                "actuator rejected {} for farm {}",
                command, farm_id
            )));
        }
        self.commands
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(DispatchedCommand {
                command,
                farm_id: farm_id.to_string(),
                at: Utc::now(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_dispatcher_counts_and_failures() {
        let dispatcher = RecordingDispatcher::new();
        dispatcher
            .write_sensor_command(CommandType::WaterPump, "farm-1")
            .await
            .unwrap();
        dispatcher.fail_for("farm-2");
        assert!(dispatcher
            .write_sensor_command(CommandType::WaterPump, "farm-2")
            .await
            .is_err());

        dispatcher.fail_command_for("farm-3", CommandType::WaterPump);
        assert!(dispatcher
            .write_sensor_command(CommandType::WaterPump, "farm-3")
            .await
            .is_err());
        dispatcher
            .write_sensor_command(CommandType::Fertilizer, "farm-3")
            .await
            .unwrap();
        assert_eq!(dispatcher.count("farm-3", CommandType::Fertilizer), 1);

        assert_eq!(dispatcher.count("farm-1", CommandType::WaterPump), 1);
        assert_eq!(dispatcher.count("farm-1", CommandType::Fertilizer), 0);
        assert_eq!(dispatcher.commands().len(), 2);
    }
}
