use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::command::CommandSource;
use crate::condition::Condition;
use crate::device::DeviceId;

/// A named, ordered set of device actions executed together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub name: String,

    /// Optional location scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Ordered actions; ordering is stable across activations
    pub actions: Vec<SceneAction>,

    /// AND-combined guard conditions; any false aborts the activation
    /// with zero actions executed.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

/// One device command within a scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneAction {
    pub device_id: DeviceId,
    pub command: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,

    /// Pause before issuing (milliseconds)
    #[serde(default)]
    pub delay_ms: u64,

    /// Transition duration forwarded to the bridge as a parameter
    #[serde(default)]
    pub fade_ms: u64,

    /// When true, runs concurrently with the previous action's group;
    /// when false, waits for the previous group to reach a terminal or
    /// timed-out state first.
    #[serde(default)]
    pub parallel: bool,
}

/// State machine for a single activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
}

/// Details of one failed action within an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionFailure {
    pub action_index: usize,
    pub device_id: DeviceId,
    pub command: String,
    pub code: String,
    pub message: String,
}

/// Tracks one activation of a scene.
///
/// A single action failure never fails the execution: the scene finishes
/// `Completed` with a non-empty `failures` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneExecution {
    pub id: String,
    pub scene_id: String,
    pub status: ExecutionStatus,

    pub trigger: CommandSource,
    pub triggered_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Index of the action currently being issued (while Running)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_action: Option<usize>,

    pub actions_total: usize,
    pub actions_completed: usize,
    #[serde(default)]
    pub failures: Vec<ActionFailure>,
}

impl SceneExecution {
    pub fn new(scene_id: impl Into<String>, trigger: CommandSource, actions_total: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            scene_id: scene_id.into(),
            status: ExecutionStatus::Pending,
            trigger,
            triggered_at: Utc::now(),
            completed_at: None,
            current_action: None,
            actions_total,
            actions_completed: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ExecutionStatus::Completed | ExecutionStatus::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_execution_is_pending() {
        let exec = SceneExecution::new("evening", CommandSource::Api, 3);
        assert_eq!(exec.status, ExecutionStatus::Pending);
        assert_eq!(exec.actions_total, 3);
        assert_eq!(exec.actions_completed, 0);
        assert!(!exec.is_terminal());
    }

    #[test]
    fn test_terminal_states() {
        let mut exec = SceneExecution::new("evening", CommandSource::Scene, 1);
        exec.status = ExecutionStatus::Completed;
        assert!(exec.is_terminal());
        exec.status = ExecutionStatus::Cancelled;
        assert!(exec.is_terminal());
        exec.status = ExecutionStatus::Running;
        assert!(!exec.is_terminal());
    }
}
