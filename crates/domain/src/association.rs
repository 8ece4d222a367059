use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::DeviceId;

/// Relationship kind between a source device and its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationType {
    /// Source readings are attributed onto the target
    Monitors,
    /// Source is the physical actuator for commands addressed to the target
    Controls,
    /// Both of the above
    MonitorsAndControls,
}

impl AssociationType {
    pub fn monitors(&self) -> bool {
        matches!(self, Self::Monitors | Self::MonitorsAndControls)
    }

    pub fn controls(&self) -> bool {
        matches!(self, Self::Controls | Self::MonitorsAndControls)
    }

    /// Priority rank for control-proxy resolution; higher wins.
    pub fn control_rank(&self) -> u8 {
        match self {
            Self::MonitorsAndControls => 2,
            Self::Controls => 1,
            Self::Monitors => 0,
        }
    }
}

/// What an association points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssociationTarget {
    Device { device_id: DeviceId },
    Group { group_id: String },
}

/// One monitored metric attributed from source onto target:
/// `target.property = source.property * scale + offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricMap {
    pub property: String,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
}

fn default_scale() -> f64 {
    1.0
}

/// Declared relationship attributing a source device's readings to, or
/// routing commands for, a different logical device.
///
/// Invariant (enforced by the resolver on configure): a target has at
/// most one active controls-capable association at a time, and two
/// associations for the same target may not share a `configured_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Association {
    pub id: String,
    pub source_device_id: DeviceId,
    pub target: AssociationTarget,
    #[serde(rename = "type")]
    pub kind: AssociationType,

    /// Metrics attributed onto the target (monitoring associations)
    #[serde(default)]
    pub metrics: Vec<MetricMap>,

    /// Logical command name -> proxy command name (control associations).
    /// Commands without an entry pass through unchanged.
    #[serde(default)]
    pub command_map: HashMap<String, String>,

    pub configured_at: DateTime<Utc>,
}

impl Association {
    /// Proxy-side command name for a logical command.
    pub fn map_command<'a>(&'a self, command: &'a str) -> &'a str {
        self.command_map
            .get(command)
            .map(String::as_str)
            .unwrap_or(command)
    }

    /// True when this association targets the given device, either
    /// directly or through the device's group.
    pub fn targets_device(&self, device_id: &DeviceId, group_id: Option<&str>) -> bool {
        match &self.target {
            AssociationTarget::Device { device_id: t } => t == device_id,
            AssociationTarget::Group { group_id: g } => group_id == Some(g.as_str()),
        }
    }

    pub fn targets_exact_device(&self) -> bool {
        matches!(self.target, AssociationTarget::Device { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assoc(kind: AssociationType) -> Association {
        Association {
            id: "a1".to_string(),
            source_device_id: DeviceId::new("relay-1-ch3").unwrap(),
            target: AssociationTarget::Device {
                device_id: DeviceId::new("pump-chw-1").unwrap(),
            },
            kind,
            metrics: vec![],
            command_map: HashMap::from([("power_on".to_string(), "on".to_string())]),
            configured_at: Utc::now(),
        }
    }

    #[test]
    fn test_control_rank_ordering() {
        assert!(
            AssociationType::MonitorsAndControls.control_rank()
                > AssociationType::Controls.control_rank()
        );
        assert!(
            AssociationType::Controls.control_rank() > AssociationType::Monitors.control_rank()
        );
    }

    #[test]
    fn test_map_command_uses_map_then_identity() {
        let a = assoc(AssociationType::Controls);
        assert_eq!(a.map_command("power_on"), "on");
        assert_eq!(a.map_command("power_off"), "power_off");
    }

    #[test]
    fn test_targets_device_by_group() {
        let mut a = assoc(AssociationType::Monitors);
        a.target = AssociationTarget::Group {
            group_id: "plant-room".to_string(),
        };
        let id = DeviceId::new("pump-chw-1").unwrap();
        assert!(a.targets_device(&id, Some("plant-room")));
        assert!(!a.targets_device(&id, Some("roof")));
        assert!(!a.targets_device(&id, None));
    }
}
