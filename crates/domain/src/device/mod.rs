use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod device_id;
mod kinds;

pub use device_id::DeviceId;
pub use kinds::{Capability, Domain, HealthStatus, Protocol};

/// Protocol-specific address information as an opaque JSON map.
///
/// Examples:
///   KNX: {"individual_address": "1.1.1", "functions": {"switch": {"ga": "1/0/1"}}}
///   DALI: {"gateway": "dali-gw-01", "short_address": 15}
///   Modbus: {"host": "192.168.1.100", "port": 502, "unit_id": 1}
pub type Address = serde_json::Map<String, serde_json::Value>;

/// Device-specific configuration as a JSON map.
pub type Config = serde_json::Map<String, serde_json::Value>;

/// A logical device in the hub's catalogue.
///
/// Identity is immutable once commissioned; capabilities and config are
/// mutated only through administrative operations on the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,

    /// Room-level location (one of room_id/area_id is normally set)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,

    pub domain: Domain,
    pub protocol: Protocol,
    pub address: Address,

    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub config: Config,

    #[serde(default)]
    pub health: HealthStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    pub fn has_capability(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }

    /// Canonical string form of the protocol address, used when checking
    /// address uniqueness across the catalogue.
    pub fn address_key(&self) -> String {
        format!(
            "{}:{}",
            self.protocol.as_str(),
            serde_json::Value::Object(self.address.clone())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn device(id: &str, addr: serde_json::Value) -> Device {
        let serde_json::Value::Object(address) = addr else {
            panic!("address must be an object");
        };
        Device {
            id: DeviceId::new(id).unwrap(),
            name: id.to_string(),
            room_id: Some("room-1".to_string()),
            area_id: None,
            domain: Domain::Lighting,
            protocol: Protocol::Knx,
            address,
            capabilities: vec![Capability::OnOff],
            config: Config::new(),
            health: HealthStatus::Unknown,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_address_key_is_stable_per_protocol_and_address() {
        let a = device("light-a", json!({"ga": "1/0/1"}));
        let b = device("light-b", json!({"ga": "1/0/1"}));
        let c = device("light-c", json!({"ga": "1/0/2"}));
        assert_eq!(a.address_key(), b.address_key());
        assert_ne!(a.address_key(), c.address_key());
    }

    #[test]
    fn test_has_capability() {
        let d = device("light-a", json!({"ga": "1/0/1"}));
        assert!(d.has_capability(Capability::OnOff));
        assert!(!d.has_capability(Capability::Dim));
    }
}
