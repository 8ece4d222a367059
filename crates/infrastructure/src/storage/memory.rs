//! In-memory store implementations for tests and bench wiring.

use std::collections::HashMap;
use std::sync::RwLock;

use domain::association::Association;
use domain::device::{Device, DeviceId};
use domain::error::{CoreError, Result};
use domain::scene::Scene;
use domain::state::DeviceState;
use domain::store::{
    AssociationStore, DeviceStore, HistoryEntry, HistoryStore, SceneStore, StateStore,
};

fn poisoned() -> CoreError {
    CoreError::Storage("store lock poisoned".to_string())
}

#[derive(Default)]
pub struct MemoryStateStore {
    states: RwLock<HashMap<DeviceId, DeviceState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, device_id: &DeviceId) -> Result<Option<DeviceState>> {
        Ok(self
            .states
            .read()
            .map_err(|_| poisoned())?
            .get(device_id)
            .cloned())
    }

    async fn put(&self, state: &DeviceState) -> Result<()> {
        self.states
            .write()
            .map_err(|_| poisoned())?
            .insert(state.device_id.clone(), state.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DeviceState>> {
        Ok(self
            .states
            .read()
            .map_err(|_| poisoned())?
            .values()
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryHistoryStore {
    entries: RwLock<Vec<HistoryEntry>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.read().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, entry: &HistoryEntry) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| poisoned())?
            .push(entry.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDeviceStore {
    devices: RwLock<HashMap<DeviceId, Device>>,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn get(&self, device_id: &DeviceId) -> Result<Option<Device>> {
        Ok(self
            .devices
            .read()
            .map_err(|_| poisoned())?
            .get(device_id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Device>> {
        Ok(self
            .devices
            .read()
            .map_err(|_| poisoned())?
            .values()
            .cloned()
            .collect())
    }

    async fn put(&self, device: &Device) -> Result<()> {
        self.devices
            .write()
            .map_err(|_| poisoned())?
            .insert(device.id.clone(), device.clone());
        Ok(())
    }

    async fn delete(&self, device_id: &DeviceId) -> Result<()> {
        self.devices
            .write()
            .map_err(|_| poisoned())?
            .remove(device_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAssociationStore {
    associations: RwLock<Vec<Association>>,
}

impl MemoryAssociationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AssociationStore for MemoryAssociationStore {
    async fn list(&self) -> Result<Vec<Association>> {
        Ok(self.associations.read().map_err(|_| poisoned())?.clone())
    }

    async fn replace_all(&self, associations: &[Association]) -> Result<()> {
        *self.associations.write().map_err(|_| poisoned())? = associations.to_vec();
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySceneStore {
    scenes: RwLock<HashMap<String, Scene>>,
}

impl MemorySceneStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SceneStore for MemorySceneStore {
    async fn get(&self, scene_id: &str) -> Result<Option<Scene>> {
        Ok(self
            .scenes
            .read()
            .map_err(|_| poisoned())?
            .get(scene_id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Scene>> {
        Ok(self
            .scenes
            .read()
            .map_err(|_| poisoned())?
            .values()
            .cloned()
            .collect())
    }

    async fn put(&self, scene: &Scene) -> Result<()> {
        self.scenes
            .write()
            .map_err(|_| poisoned())?
            .insert(scene.id.clone(), scene.clone());
        Ok(())
    }

    async fn delete(&self, scene_id: &str) -> Result<()> {
        self.scenes.write().map_err(|_| poisoned())?.remove(scene_id);
        Ok(())
    }
}
