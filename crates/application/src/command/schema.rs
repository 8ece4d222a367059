//! Per-(domain, command) parameter schemas.
//!
//! Commands are validated against explicit tagged-union parameter specs
//! instead of being forwarded as opaque maps. Unknown extra parameters
//! pass through untouched so bridges can accept protocol-specific hints.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use domain::device::{Capability, Device, Domain};
use domain::error::{CoreError, Result};

/// Allowed shape of one command parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamSpec {
    Bool,
    Integer { min: Option<i64>, max: Option<i64> },
    Number { min: Option<f64>, max: Option<f64> },
    Text { one_of: Option<Vec<String>> },
}

impl ParamSpec {
    fn check(&self, name: &str, value: &serde_json::Value) -> Result<()> {
        let fail = |expected: &str| {
            Err(CoreError::validation(format!(
                "parameter '{}' must be {}",
                name, expected
            )))
        };
        match self {
            Self::Bool => {
                if value.is_boolean() {
                    Ok(())
                } else {
                    fail("a boolean")
                }
            }
            Self::Integer { min, max } => {
                let Some(v) = value.as_i64() else {
                    return fail("an integer");
                };
                if min.is_some_and(|m| v < m) || max.is_some_and(|m| v > m) {
                    return fail(&format!("in range {:?}..{:?}", min, max));
                }
                Ok(())
            }
            Self::Number { min, max } => {
                let Some(v) = value.as_f64() else {
                    return fail("a number");
                };
                if min.is_some_and(|m| v < m) || max.is_some_and(|m| v > m) {
                    return fail(&format!("in range {:?}..{:?}", min, max));
                }
                Ok(())
            }
            Self::Text { one_of } => {
                let Some(v) = value.as_str() else {
                    return fail("a string");
                };
                match one_of {
                    Some(allowed) if !allowed.iter().any(|a| a == v) => {
                        fail(&format!("one of {:?}", allowed))
                    }
                    _ => Ok(()),
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
struct ParamDef {
    spec: ParamSpec,
    required: bool,
}

/// Schema for one command: the capability the device must carry plus its
/// parameter specs.
#[derive(Debug, Clone)]
pub struct CommandSchema {
    capability: Capability,
    params: HashMap<String, ParamDef>,
}

impl CommandSchema {
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            params: HashMap::new(),
        }
    }

    pub fn required(mut self, name: &str, spec: ParamSpec) -> Self {
        self.params.insert(
            name.to_string(),
            ParamDef {
                spec,
                required: true,
            },
        );
        self
    }

    pub fn optional(mut self, name: &str, spec: ParamSpec) -> Self {
        self.params.insert(
            name.to_string(),
            ParamDef {
                spec,
                required: false,
            },
        );
        self
    }
}

/// Registry of command schemas keyed by (domain, command name).
pub struct CommandSchemaRegistry {
    schemas: HashMap<(Domain, String), CommandSchema>,
}

impl CommandSchemaRegistry {
    pub fn new() -> Self {
        Self {
            schemas: HashMap::new(),
        }
    }

    pub fn register(&mut self, domain: Domain, command: &str, schema: CommandSchema) {
        self.schemas.insert((domain, command.to_string()), schema);
    }

    /// Registry preloaded with the built-in command vocabulary.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        let pct = || ParamSpec::Integer {
            min: Some(0),
            max: Some(100),
        };
        let duration_ms = || ParamSpec::Integer {
            min: Some(0),
            max: None,
        };

        reg.register(Domain::Lighting, "on", CommandSchema::new(Capability::OnOff));
        reg.register(Domain::Lighting, "off", CommandSchema::new(Capability::OnOff));
        reg.register(
            Domain::Lighting,
            "dim",
            CommandSchema::new(Capability::Dim)
                .required("level", pct())
                .optional("fade_ms", duration_ms()),
        );
        reg.register(
            Domain::Lighting,
            "set_color_temp",
            CommandSchema::new(Capability::ColorTemp).required(
                "kelvin",
                ParamSpec::Integer {
                    min: Some(1000),
                    max: Some(10000),
                },
            ),
        );

        reg.register(
            Domain::Blinds,
            "set_position",
            CommandSchema::new(Capability::Position).required("position", pct()),
        );
        reg.register(
            Domain::Blinds,
            "set_tilt",
            CommandSchema::new(Capability::Tilt).required("tilt", pct()),
        );
        reg.register(Domain::Blinds, "open", CommandSchema::new(Capability::Position));
        reg.register(Domain::Blinds, "close", CommandSchema::new(Capability::Position));

        reg.register(
            Domain::Climate,
            "set_temperature",
            CommandSchema::new(Capability::TemperatureSet).required(
                "setpoint",
                ParamSpec::Number {
                    min: Some(5.0),
                    max: Some(35.0),
                },
            ),
        );
        reg.register(
            Domain::Climate,
            "set_mode",
            CommandSchema::new(Capability::ModeSelect).required(
                "mode",
                ParamSpec::Text {
                    one_of: Some(vec![
                        "off".to_string(),
                        "heat".to_string(),
                        "cool".to_string(),
                        "auto".to_string(),
                    ]),
                },
            ),
        );

        reg.register(Domain::Plant, "power_on", CommandSchema::new(Capability::RunStop));
        reg.register(Domain::Plant, "power_off", CommandSchema::new(Capability::RunStop));
        reg.register(
            Domain::Plant,
            "set_speed",
            CommandSchema::new(Capability::SpeedControl).required("speed", pct()),
        );

        reg.register(Domain::Energy, "power_on", CommandSchema::new(Capability::OnOff));
        reg.register(Domain::Energy, "power_off", CommandSchema::new(Capability::OnOff));

        reg
    }

    /// Validates a command invocation against the device and the schema.
    pub fn validate(
        &self,
        device: &Device,
        command: &str,
        parameters: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let schema = self
            .schemas
            .get(&(device.domain, command.to_string()))
            .ok_or_else(|| {
                CoreError::validation(format!(
                    "unknown command '{}' for domain {}",
                    command,
                    device.domain.as_str()
                ))
            })?;

        if !device.has_capability(schema.capability) {
            return Err(CoreError::validation(format!(
                "device {} lacks capability for command '{}'",
                device.id, command
            )));
        }

        for (name, def) in &schema.params {
            match parameters.get(name) {
                Some(value) => def.spec.check(name, value)?,
                None if def.required => {
                    return Err(CoreError::validation(format!(
                        "missing required parameter '{}'",
                        name
                    )));
                }
                None => {}
            }
        }
        Ok(())
    }
}

impl Default for CommandSchemaRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::device::{DeviceId, HealthStatus, Protocol};
    use serde_json::json;

    fn light(capabilities: Vec<Capability>) -> Device {
        Device {
            id: DeviceId::new("light-1").unwrap(),
            name: "light-1".to_string(),
            room_id: None,
            area_id: None,
            domain: Domain::Lighting,
            protocol: Protocol::Knx,
            address: Default::default(),
            capabilities,
            config: Default::default(),
            health: HealthStatus::Unknown,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn params(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        let serde_json::Value::Object(map) = value else {
            panic!("params must be an object");
        };
        map
    }

    #[test]
    fn test_unknown_command_rejected() {
        let reg = CommandSchemaRegistry::with_builtins();
        let device = light(vec![Capability::OnOff]);
        let err = reg
            .validate(&device, "explode", &Default::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_missing_capability_rejected() {
        let reg = CommandSchemaRegistry::with_builtins();
        let device = light(vec![Capability::OnOff]);
        let err = reg
            .validate(&device, "dim", &params(json!({"level": 50})))
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_required_parameter_enforced() {
        let reg = CommandSchemaRegistry::with_builtins();
        let device = light(vec![Capability::OnOff, Capability::Dim]);
        assert!(reg.validate(&device, "dim", &Default::default()).is_err());
        assert!(
            reg.validate(&device, "dim", &params(json!({"level": 50})))
                .is_ok()
        );
    }

    #[test]
    fn test_range_enforced() {
        let reg = CommandSchemaRegistry::with_builtins();
        let device = light(vec![Capability::Dim]);
        assert!(
            reg.validate(&device, "dim", &params(json!({"level": 150})))
                .is_err()
        );
        assert!(
            reg.validate(&device, "dim", &params(json!({"level": "high"})))
                .is_err()
        );
    }

    #[test]
    fn test_unknown_extra_parameters_pass_through() {
        let reg = CommandSchemaRegistry::with_builtins();
        let device = light(vec![Capability::OnOff]);
        assert!(
            reg.validate(&device, "on", &params(json!({"vendor_hint": "x"})))
                .is_ok()
        );
    }
}
