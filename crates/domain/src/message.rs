//! Wire payloads exchanged with protocol bridges over the message bus.
//!
//! Delivery on command/ack/state topics is at-least-once; consumers must
//! de-duplicate via `device_id` + timestamp ordering and never assume
//! in-order delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::command::{Command, CommandSource};
use crate::device::DeviceId;

/// Core -> bridge. Topic: `{prefix}/command/{protocol}/{address}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandMessage {
    /// Correlates acks back to the pending-command table
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub device_id: DeviceId,
    pub command: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub source: CommandSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl CommandMessage {
    /// Build the outbound payload for a command, already rewritten to its
    /// physical target where a control proxy applies.
    pub fn from_command(cmd: &Command, device_id: DeviceId, command: impl Into<String>) -> Self {
        Self {
            id: cmd.id.clone(),
            timestamp: cmd.issued_at,
            device_id,
            command: command.into(),
            parameters: cmd.parameters.clone(),
            source: cmd.source,
            user_id: cmd.user_id.clone(),
        }
    }
}

/// Acknowledgment status reported by a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    /// Received and sent to the device
    Accepted,
    /// Received but waiting to send (device busy)
    Queued,
    /// Could not be executed
    Failed,
    /// The device did not respond within the bridge's own timeout
    Timeout,
}

/// Error details carried by failed acks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckError {
    /// e.g. "DEVICE_UNREACHABLE", "INVALID_COMMAND"
    pub code: String,
    pub message: String,
}

/// Bridge -> core. Topic: `{prefix}/ack/{protocol}/{address}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckMessage {
    pub command_id: String,
    pub timestamp: DateTime<Utc>,
    pub device_id: DeviceId,
    pub status: AckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AckError>,
}

/// Bridge -> core. Topic: `{prefix}/state/{protocol}/{address}`, retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateMessage {
    pub device_id: DeviceId,
    pub timestamp: DateTime<Utc>,
    pub state: serde_json::Map<String, serde_json::Value>,
}

/// Operational status of a bridge process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeStatus {
    Healthy,
    Degraded,
    Unhealthy,
    /// Published via last-will on disconnect
    Offline,
    Starting,
    Stopping,
}

impl BridgeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Offline => "offline",
            Self::Starting => "starting",
            Self::Stopping => "stopping",
        }
    }

    /// Commands may be published while the bridge is in this state.
    pub fn accepts_commands(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }
}

/// Bridge -> core. Topic: `{prefix}/health/{protocol}`, retained,
/// periodic plus last-will on disconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthMessage {
    pub bridge: String,
    pub timestamp: DateTime<Utc>,
    pub status: BridgeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Bidirectional request action. Topic: `{prefix}/request/{protocol}/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestAction {
    ReadState,
    ReadAll,
    Discover,
    Reconfigure,
    Restart,
}

/// Core -> bridge request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMessage {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub action: RequestAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl RequestMessage {
    /// Bulk read of every device behind one bridge.
    pub fn read_all() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            action: RequestAction::ReadAll,
            device_id: None,
            parameters: serde_json::Map::new(),
        }
    }
}

/// Bridge -> core response. Topic: `{prefix}/response/{protocol}/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(default)]
    pub result: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
