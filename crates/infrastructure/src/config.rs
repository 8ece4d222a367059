use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Hub status topic for the broker last-will
    pub status_topic: Option<String>,
}

fn default_client_id() -> String {
    "gridhub-core".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Protocol timing knobs. Defaults match the bridge contract; per-site
/// overrides go in the config files.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TimingConfig {
    /// Primary ack deadline for tracked commands
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout_secs: u64,
    /// Secondary deadline for state confirmation after an accepted ack
    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_secs: u64,
    /// Window inside which a confirmed state still counts as confirmed
    #[serde(default = "default_staleness")]
    pub staleness_secs: u64,
    /// Per-handler budget in the event router before dispatch detaches
    #[serde(default = "default_handler_budget")]
    pub handler_budget_ms: u64,
    /// Periodic state snapshot interval
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,
}

fn default_ack_timeout() -> u64 {
    10
}
fn default_confirm_timeout() -> u64 {
    30
}
fn default_staleness() -> u64 {
    300
}
fn default_handler_budget() -> u64 {
    250
}
fn default_snapshot_interval() -> u64 {
    60
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            ack_timeout_secs: default_ack_timeout(),
            confirm_timeout_secs: default_confirm_timeout(),
            staleness_secs: default_staleness(),
            handler_budget_ms: default_handler_budget(),
            snapshot_interval_secs: default_snapshot_interval(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CommandConfig {
    /// Upper bound on simultaneously pending commands; beyond it new
    /// submissions are rejected as bridge-unavailable
    #[serde(default = "default_pending_capacity")]
    pub pending_capacity: usize,
}

fn default_pending_capacity() -> usize {
    1024
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            pending_capacity: default_pending_capacity(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HubConfig {
    pub hub_id: String,
    pub mqtt: MqttConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub command: CommandConfig,
}

impl HubConfig {
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .set_default("hub_id", "gridhub")?
            .set_default("mqtt.host", "localhost")?
            .set_default("mqtt.port", 1883)?
            .set_default("database.path", "sqlite://gridhub.db")?
            // Base config file is required so a misplaced deployment fails fast
            .add_source(File::with_name(&format!("{}/default", config_dir)).required(true))
            // Per-mode overrides, e.g. config/production.toml
            .add_source(File::with_name(&format!("{}/{}", config_dir, run_mode)).required(false))
            // Environment variables (e.g. GRIDHUB__MQTT__HOST=10.0.0.1)
            .add_source(Environment::with_prefix("GRIDHUB").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_defaults_fill_missing_fields() {
        let timing: TimingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(timing.ack_timeout_secs, 10);
        assert_eq!(timing.handler_budget_ms, 250);
    }

    #[test]
    fn test_pending_capacity_default() {
        let cmd: CommandConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cmd.pending_capacity, 1024);
    }
}
