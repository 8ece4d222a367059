//! Cached device catalogue over the `DeviceStore` port.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use domain::device::{Capability, Device, DeviceId, Domain, Protocol};
use domain::error::{CoreError, Result};
use domain::store::DeviceStore;

use crate::associations::AssociationResolver;

/// Filter for catalogue queries. Unset fields match everything.
#[derive(Debug, Default, Clone)]
pub struct DeviceQuery {
    pub room_id: Option<String>,
    pub area_id: Option<String>,
    pub domain: Option<Domain>,
    pub protocol: Option<Protocol>,
    pub capability: Option<Capability>,
}

impl DeviceQuery {
    fn matches(&self, device: &Device) -> bool {
        if let Some(room) = &self.room_id {
            if device.room_id.as_deref() != Some(room.as_str()) {
                return false;
            }
        }
        if let Some(area) = &self.area_id {
            if device.area_id.as_deref() != Some(area.as_str()) {
                return false;
            }
        }
        if let Some(domain) = self.domain {
            if device.domain != domain {
                return false;
            }
        }
        if let Some(protocol) = self.protocol {
            if device.protocol != protocol {
                return false;
            }
        }
        if let Some(cap) = self.capability {
            if !device.has_capability(cap) {
                return false;
            }
        }
        true
    }
}

/// In-memory cache over the device definition table.
///
/// Reads are served from the cache; administrative writes go through to
/// the store and update the cache on success.
pub struct DeviceRegistry {
    store: Arc<dyn DeviceStore>,
    cache: RwLock<HashMap<DeviceId, Device>>,
}

impl DeviceRegistry {
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Bulk-loads the catalogue from the store, replacing the cache.
    pub async fn refresh_cache(&self) -> Result<()> {
        let devices = self.store.list().await?;
        let mut cache = self.cache.write().await;
        cache.clear();
        for device in devices {
            cache.insert(device.id.clone(), device);
        }
        info!(count = cache.len(), "Device catalogue loaded");
        Ok(())
    }

    pub async fn get(&self, device_id: &DeviceId) -> Result<Device> {
        if let Some(device) = self.cache.read().await.get(device_id) {
            return Ok(device.clone());
        }
        // Cache miss: fall through to the store once
        match self.store.get(device_id).await? {
            Some(device) => {
                self.cache
                    .write()
                    .await
                    .insert(device.id.clone(), device.clone());
                Ok(device)
            }
            None => Err(CoreError::not_found("Device", device_id.as_str())),
        }
    }

    /// All devices, ordered by id for deterministic listings.
    pub async fn list(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.cache.read().await.values().cloned().collect();
        devices.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        devices
    }

    pub async fn query(&self, filter: &DeviceQuery) -> Vec<Device> {
        let mut devices: Vec<Device> = self
            .cache
            .read()
            .await
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        devices.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        devices
    }

    /// Commissions or updates a device.
    ///
    /// Two devices may not share a protocol address unless an association
    /// links them (a proxy relay legitimately shares its actuator address
    /// with the logical device it fronts).
    pub async fn put(&self, device: Device, resolver: &AssociationResolver) -> Result<()> {
        let key = device.address_key();
        // The write lock spans check and insert; two concurrent puts for
        // one address can never both pass the uniqueness scan
        let mut cache = self.cache.write().await;
        for other in cache.values() {
            if other.id != device.id
                && other.address_key() == key
                && !resolver.links(&device.id, &other.id)
            {
                return Err(CoreError::validation(format!(
                    "address already in use by device {}",
                    other.id
                )));
            }
        }

        self.store.put(&device).await?;
        debug!(device_id = %device.id, protocol = %device.protocol.as_str(), "Device stored");
        cache.insert(device.id.clone(), device);
        Ok(())
    }

    pub async fn delete(&self, device_id: &DeviceId) -> Result<()> {
        self.store.delete(device_id).await?;
        self.cache.write().await.remove(device_id);
        Ok(())
    }
}
