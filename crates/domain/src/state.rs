use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::device::DeviceId;

/// Where a state entry came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateSource {
    /// Reported by the device's own bridge
    Native,
    /// Attributed from another device through a monitoring association
    Derived { source: DeviceId },
}

/// Authoritative cached state of one logical device.
///
/// Properties are a loosely-typed map, e.g. a light holds
/// `{"on": true, "level": 75}` and a thermostat
/// `{"temperature": 21.5, "setpoint": 22.0}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceState {
    pub device_id: DeviceId,
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub updated_at: DateTime<Utc>,
    /// True when corroborated by a status message rather than assumed
    /// from a command having been sent.
    pub confirmed: bool,
    pub source: StateSource,
}

impl DeviceState {
    pub fn new(
        device_id: DeviceId,
        properties: serde_json::Map<String, serde_json::Value>,
        updated_at: DateTime<Utc>,
        confirmed: bool,
        source: StateSource,
    ) -> Self {
        Self {
            device_id,
            properties,
            updated_at,
            confirmed,
            source,
        }
    }

    pub fn property(&self, name: &str) -> Option<&serde_json::Value> {
        self.properties.get(name)
    }

    /// Confirmed classification requires the flag AND a timestamp inside
    /// the staleness window. A negative elapsed duration (clock jumped
    /// backwards) counts as stale.
    pub fn is_confirmed(&self, now: DateTime<Utc>, staleness: Duration) -> bool {
        if !self.confirmed {
            return false;
        }
        let elapsed = now.signed_duration_since(self.updated_at);
        elapsed >= Duration::zero() && elapsed <= staleness
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(confirmed: bool, updated_at: DateTime<Utc>) -> DeviceState {
        let serde_json::Value::Object(props) = json!({"on": true}) else {
            unreachable!()
        };
        DeviceState::new(
            DeviceId::new("light-1").unwrap(),
            props,
            updated_at,
            confirmed,
            StateSource::Native,
        )
    }

    #[test]
    fn test_confirmed_within_window() {
        let now = Utc::now();
        let s = state(true, now - Duration::seconds(30));
        assert!(s.is_confirmed(now, Duration::seconds(60)));
    }

    #[test]
    fn test_confirmed_flag_alone_is_not_enough() {
        let now = Utc::now();
        let s = state(true, now - Duration::seconds(120));
        assert!(!s.is_confirmed(now, Duration::seconds(60)));
    }

    #[test]
    fn test_unconfirmed_never_confirmed() {
        let now = Utc::now();
        let s = state(false, now);
        assert!(!s.is_confirmed(now, Duration::seconds(60)));
    }

    #[test]
    fn test_future_timestamp_counts_as_stale() {
        // Clock jump: update timestamp ahead of "now"
        let now = Utc::now();
        let s = state(true, now + Duration::seconds(30));
        assert!(!s.is_confirmed(now, Duration::seconds(60)));
    }
}
