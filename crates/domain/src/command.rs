use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::DeviceId;

/// Where a command originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSource {
    Api,
    Automation,
    Voice,
    Scene,
}

impl CommandSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Automation => "automation",
            Self::Voice => "voice",
            Self::Scene => "scene",
        }
    }
}

/// A single command invocation against a logical device.
///
/// Lifecycle: created -> published -> acked(accepted|queued|failed) ->
/// resolved(state-confirmed | timed_out). The pending-command table owns
/// the lifecycle; this struct is the immutable invocation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    pub device_id: DeviceId,
    pub name: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub source: CommandSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub issued_at: DateTime<Utc>,
}

impl Command {
    pub fn new(
        device_id: DeviceId,
        name: impl Into<String>,
        parameters: serde_json::Map<String, serde_json::Value>,
        source: CommandSource,
        user_id: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            device_id,
            name: name.into(),
            parameters,
            source,
            user_id,
            issued_at: Utc::now(),
        }
    }
}

/// Terminal outcome of a tracked command, delivered to waiters.
///
/// `TimedOut` is not necessarily a true failure - the physical action may
/// still have succeeded after the ack window closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandResolution {
    /// A matching state update confirmed the command took effect
    Confirmed,
    /// The bridge accepted but no state confirmation arrived in time
    Unconfirmed,
    /// No ack within the deadline
    TimedOut,
    /// Explicit bridge-reported failure
    Failed { code: String, message: String },
}

impl CommandResolution {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::TimedOut | Self::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_ids_are_unique() {
        let a = Command::new(
            DeviceId::new("light-1").unwrap(),
            "on",
            serde_json::Map::new(),
            CommandSource::Api,
            None,
        );
        let b = Command::new(
            DeviceId::new("light-1").unwrap(),
            "on",
            serde_json::Map::new(),
            CommandSource::Api,
            None,
        );
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_resolution_failure_classification() {
        assert!(CommandResolution::TimedOut.is_failure());
        assert!(
            CommandResolution::Failed {
                code: "DEVICE_UNREACHABLE".to_string(),
                message: "no response".to_string(),
            }
            .is_failure()
        );
        assert!(!CommandResolution::Confirmed.is_failure());
        assert!(!CommandResolution::Unconfirmed.is_failure());
    }
}
