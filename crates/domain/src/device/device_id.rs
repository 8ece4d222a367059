use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// Value object representing a logical device identifier
///
/// Rules:
/// - Must be non-empty
/// - Must contain only alphanumeric, underscore, and hyphen
/// - Max length 100 characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a new DeviceId with validation
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(CoreError::InvalidDeviceId(
                "Device ID cannot be empty".to_string(),
            ));
        }

        if id.len() > 100 {
            return Err(CoreError::InvalidDeviceId(format!(
                "Device ID too long: {} chars (max 100)",
                id.len()
            )));
        }

        if !id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            return Err(CoreError::InvalidDeviceId(format!(
                "Device ID {id} must contain only alphanumeric, underscore, and hyphen"
            )));
        }

        Ok(Self(id))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_device_id() {
        let id = DeviceId::new("pump-chw-1").unwrap();
        assert_eq!(id.as_str(), "pump-chw-1");
    }

    #[test]
    fn test_device_id_with_underscore() {
        let id = DeviceId::new("relay_1_ch3").unwrap();
        assert_eq!(id.as_str(), "relay_1_ch3");
    }

    #[test]
    fn test_empty_device_id_rejected() {
        assert!(DeviceId::new("").is_err());
    }

    #[test]
    fn test_too_long_device_id_rejected() {
        let long = "x".repeat(101);
        assert!(DeviceId::new(long).is_err());
    }

    #[test]
    fn test_invalid_characters_rejected() {
        assert!(DeviceId::new("light living").is_err());
        assert!(DeviceId::new("light/living").is_err());
    }
}
