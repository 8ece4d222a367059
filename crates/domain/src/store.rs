//! Store interfaces for the external persistence collaborator.
//!
//! The core is agnostic to the concrete storage engine; it only assumes a
//! device-state table keyed by device_id, an append-only history table,
//! and definition tables for devices, associations, and scenes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::association::Association;
use crate::device::{Device, DeviceId};
use crate::error::Result;
use crate::scene::Scene;
use crate::state::{DeviceState, StateSource};

/// Device-state table keyed by device_id.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, device_id: &DeviceId) -> Result<Option<DeviceState>>;
    async fn put(&self, state: &DeviceState) -> Result<()>;
    async fn list(&self) -> Result<Vec<DeviceState>>;
}

/// One row in the append-only state history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub device_id: DeviceId,
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub confirmed: bool,
    pub source: StateSource,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn from_state(state: &DeviceState) -> Self {
        Self {
            device_id: state.device_id.clone(),
            properties: state.properties.clone(),
            confirmed: state.confirmed,
            source: state.source.clone(),
            recorded_at: state.updated_at,
        }
    }
}

/// Append-only history table.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, entry: &HistoryEntry) -> Result<()>;
}

/// Device definition table.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn get(&self, device_id: &DeviceId) -> Result<Option<Device>>;
    async fn list(&self) -> Result<Vec<Device>>;
    async fn put(&self, device: &Device) -> Result<()>;
    async fn delete(&self, device_id: &DeviceId) -> Result<()>;
}

/// Association definition table. Administrative reconfiguration replaces
/// the whole set atomically.
#[async_trait]
pub trait AssociationStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Association>>;
    async fn replace_all(&self, associations: &[Association]) -> Result<()>;
}

/// Scene definition table.
#[async_trait]
pub trait SceneStore: Send + Sync {
    async fn get(&self, scene_id: &str) -> Result<Option<Scene>>;
    async fn list(&self) -> Result<Vec<Scene>>;
    async fn put(&self, scene: &Scene) -> Result<()>;
    async fn delete(&self, scene_id: &str) -> Result<()>;
}
