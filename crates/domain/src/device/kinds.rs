use serde::{Deserialize, Serialize};

/// Functional area a device belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Lighting,
    Climate,
    Blinds,
    Audio,
    Security,
    Energy,
    Plant,
    Irrigation,
    Safety,
    Sensor,
    Infrastructure,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lighting => "lighting",
            Self::Climate => "climate",
            Self::Blinds => "blinds",
            Self::Audio => "audio",
            Self::Security => "security",
            Self::Energy => "energy",
            Self::Plant => "plant",
            Self::Irrigation => "irrigation",
            Self::Safety => "safety",
            Self::Sensor => "sensor",
            Self::Infrastructure => "infrastructure",
        }
    }
}

/// Field protocol a device is reached through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Knx,
    Dali,
    ModbusRtu,
    ModbusTcp,
    BacnetIp,
    Ocpp,
    Mqtt,
}

impl Protocol {
    /// Topic segment for bridge routing
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Knx => "knx",
            Self::Dali => "dali",
            Self::ModbusRtu => "modbus_rtu",
            Self::ModbusTcp => "modbus_tcp",
            Self::BacnetIp => "bacnet_ip",
            Self::Ocpp => "ocpp",
            Self::Mqtt => "mqtt",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "knx" => Some(Self::Knx),
            "dali" => Some(Self::Dali),
            "modbus_rtu" => Some(Self::ModbusRtu),
            "modbus_tcp" => Some(Self::ModbusTcp),
            "bacnet_ip" => Some(Self::BacnetIp),
            "ocpp" => Some(Self::Ocpp),
            "mqtt" => Some(Self::Mqtt),
            _ => None,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a device can do. Commands are validated against this set
/// before they are routed anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    // Control
    OnOff,
    Dim,
    ColorTemp,
    Position,
    Tilt,
    Speed,
    // Reading
    TemperatureRead,
    TemperatureSet,
    HumidityRead,
    PowerRead,
    EnergyRead,
    // Detection
    MotionDetect,
    PresenceDetect,
    ContactState,
    LeakDetect,
    // Equipment
    RunStop,
    SpeedControl,
    FaultStatus,
    ModeSelect,
}

/// Device health as tracked by the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Online,
    Offline,
    Degraded,
    Unknown,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::Unknown
    }
}
