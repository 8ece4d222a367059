use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod publisher;
pub use publisher::EventPublisher;

use crate::device::DeviceId;
use crate::scene::ExecutionStatus;

/// Events emitted by the coordination core. Ephemeral - consumed by the
/// event router and push subscribers, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CoreEvent {
    /// Device state transition (after merge and attribution)
    StateChanged {
        device_id: DeviceId,
        old: Option<serde_json::Map<String, serde_json::Value>>,
        new: serde_json::Map<String, serde_json::Value>,
        confirmed: bool,
        /// Trigger classification: "bridge", "association", ...
        trigger: String,
        timestamp: DateTime<Utc>,
    },

    /// A tracked command got no ack within its deadline. Emitted exactly
    /// once per command; not necessarily a true failure.
    CommandTimedOut {
        command_id: String,
        device_id: DeviceId,
        timestamp: DateTime<Utc>,
    },

    /// A tracked command reached a terminal state
    CommandResolved {
        command_id: String,
        device_id: DeviceId,
        outcome: crate::command::CommandResolution,
        timestamp: DateTime<Utc>,
    },

    /// Scene execution progress snapshot
    SceneProgress {
        execution_id: String,
        scene_id: String,
        status: ExecutionStatus,
        actions_completed: usize,
        actions_total: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },

    /// A bridge's health status changed
    BridgeHealthChanged {
        protocol: String,
        status: String,
        timestamp: DateTime<Utc>,
    },

    /// House mode changed
    ModeChanged {
        old: String,
        new: String,
        timestamp: DateTime<Utc>,
    },
}

impl CoreEvent {
    pub fn state_changed(
        device_id: DeviceId,
        old: Option<serde_json::Map<String, serde_json::Value>>,
        new: serde_json::Map<String, serde_json::Value>,
        confirmed: bool,
        trigger: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::StateChanged {
            device_id,
            old,
            new,
            confirmed,
            trigger: trigger.into(),
            timestamp,
        }
    }

    pub fn command_timed_out(command_id: impl Into<String>, device_id: DeviceId) -> Self {
        Self::CommandTimedOut {
            command_id: command_id.into(),
            device_id,
            timestamp: Utc::now(),
        }
    }

    pub fn command_resolved(
        command_id: impl Into<String>,
        device_id: DeviceId,
        outcome: crate::command::CommandResolution,
    ) -> Self {
        Self::CommandResolved {
            command_id: command_id.into(),
            device_id,
            outcome,
            timestamp: Utc::now(),
        }
    }

    pub fn scene_progress(exec: &crate::scene::SceneExecution) -> Self {
        Self::SceneProgress {
            execution_id: exec.id.clone(),
            scene_id: exec.scene_id.clone(),
            status: exec.status,
            actions_completed: exec.actions_completed,
            actions_total: exec.actions_total,
            failed: exec.failures.len(),
            timestamp: Utc::now(),
        }
    }

    pub fn bridge_health_changed(protocol: impl Into<String>, status: impl Into<String>) -> Self {
        Self::BridgeHealthChanged {
            protocol: protocol.into(),
            status: status.into(),
            timestamp: Utc::now(),
        }
    }

    /// Device the event concerns, when there is one.
    pub fn device_id(&self) -> Option<&DeviceId> {
        match self {
            Self::StateChanged { device_id, .. }
            | Self::CommandTimedOut { device_id, .. }
            | Self::CommandResolved { device_id, .. } => Some(device_id),
            _ => None,
        }
    }
}
