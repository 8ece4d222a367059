//! Authoritative device-state cache with last-write-wins merge and
//! monitoring attribution.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use domain::association::AssociationTarget;
use domain::device::DeviceId;
use domain::error::{CoreError, Result};
use domain::state::{DeviceState, StateSource};
use domain::store::{HistoryEntry, HistoryStore, StateStore};

use crate::associations::AssociationResolver;
use crate::logic::StateView;

/// One applied state transition, delivered to listeners and the push
/// channel.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub device_id: DeviceId,
    pub old: Option<serde_json::Map<String, serde_json::Value>>,
    pub new: serde_json::Map<String, serde_json::Value>,
    pub confirmed: bool,
    pub source: StateSource,
    pub timestamp: DateTime<Utc>,
}

/// Synchronous observer invoked inline on every applied transition, in
/// registration order. Handlers must be cheap; anything slow belongs on
/// the push channel instead.
pub trait StateListener: Send + Sync {
    fn on_state_changed(&self, change: &StateChange);
}

/// Sharded cache of the authoritative state of every device.
///
/// Updates merge per-key under the shard lock; persistence is
/// write-behind and never blocks or rolls back an applied update.
pub struct StateManager {
    cache: DashMap<DeviceId, DeviceState>,
    resolver: Arc<AssociationResolver>,
    listeners: RwLock<Vec<Arc<dyn StateListener>>>,
    tx: broadcast::Sender<StateChange>,
    state_store: Arc<dyn StateStore>,
    history_store: Arc<dyn HistoryStore>,
    staleness: chrono::Duration,
}

impl StateManager {
    pub fn new(
        resolver: Arc<AssociationResolver>,
        state_store: Arc<dyn StateStore>,
        history_store: Arc<dyn HistoryStore>,
        staleness: Duration,
    ) -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            cache: DashMap::new(),
            resolver,
            listeners: RwLock::new(Vec::new()),
            tx,
            state_store,
            history_store,
            staleness: chrono::Duration::from_std(staleness)
                .unwrap_or_else(|_| chrono::Duration::seconds(300)),
        }
    }

    /// Preloads the cache from the state table at startup.
    pub async fn restore(&self) -> Result<()> {
        let states = self.state_store.list().await?;
        let count = states.len();
        for state in states {
            self.cache.insert(state.device_id.clone(), state);
        }
        info!(count, "Device states restored");
        Ok(())
    }

    pub fn add_listener(&self, listener: Arc<dyn StateListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.tx.subscribe()
    }

    /// Applies a partial state update.
    ///
    /// Strictly older updates (by `timestamp`) are a no-op. Applied
    /// updates are attributed onto monitoring targets, then fanned out to
    /// listeners (inline, registration order), the push channel, and the
    /// write-behind persistence path.
    pub async fn set_state(
        &self,
        device_id: &DeviceId,
        partial: serde_json::Map<String, serde_json::Value>,
        confirmed: bool,
        timestamp: DateTime<Utc>,
        source: StateSource,
    ) -> Result<()> {
        let Some(change) = self.apply(device_id, partial, confirmed, timestamp, source) else {
            debug!(device_id = %device_id, "Stale state update ignored");
            return Ok(());
        };

        let mut changes = vec![change];

        // Attribute configured metrics onto monitoring targets
        for assoc in self.resolver.monitoring_targets(device_id) {
            let AssociationTarget::Device { device_id: target } = &assoc.target else {
                continue;
            };
            let mut derived = serde_json::Map::new();
            for metric in &assoc.metrics {
                if let Some(value) = changes[0].new.get(&metric.property).and_then(|v| v.as_f64())
                {
                    derived.insert(
                        metric.property.clone(),
                        serde_json::json!(value * metric.scale + metric.offset),
                    );
                }
            }
            if derived.is_empty() {
                continue;
            }
            derived.insert(
                "power_source".to_string(),
                serde_json::Value::String(device_id.as_str().to_string()),
            );
            if let Some(change) = self.apply(
                target,
                derived,
                confirmed,
                timestamp,
                StateSource::Derived {
                    source: device_id.clone(),
                },
            ) {
                changes.push(change);
            }
        }

        for change in changes {
            self.notify(&change);
            self.persist(&change).await;
        }
        Ok(())
    }

    /// Returns the cached entry; never synthesizes a default.
    pub fn get_state(&self, device_id: &DeviceId) -> Result<DeviceState> {
        self.cache
            .get(device_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| CoreError::not_found("DeviceState", device_id.as_str()))
    }

    /// Confirmed classification: the flag plus a timestamp inside the
    /// staleness window. Unknown devices are never confirmed.
    pub fn is_confirmed(&self, device_id: &DeviceId) -> bool {
        self.cache
            .get(device_id)
            .is_some_and(|entry| entry.is_confirmed(Utc::now(), self.staleness))
    }

    /// Merge under the shard entry. Returns `None` for a stale no-op.
    fn apply(
        &self,
        device_id: &DeviceId,
        partial: serde_json::Map<String, serde_json::Value>,
        confirmed: bool,
        timestamp: DateTime<Utc>,
        source: StateSource,
    ) -> Option<StateChange> {
        match self.cache.entry(device_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let state = occupied.get_mut();
                // Last-write-wins: strictly older loses, equal applies
                if timestamp < state.updated_at {
                    return None;
                }
                let old = Some(state.properties.clone());
                for (key, value) in partial {
                    state.properties.insert(key, value);
                }
                state.updated_at = timestamp;
                state.confirmed = confirmed;
                state.source = source.clone();
                Some(StateChange {
                    device_id: device_id.clone(),
                    old,
                    new: state.properties.clone(),
                    confirmed,
                    source,
                    timestamp,
                })
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let new = partial.clone();
                vacant.insert(DeviceState {
                    device_id: device_id.clone(),
                    properties: partial,
                    updated_at: timestamp,
                    confirmed,
                    source: source.clone(),
                });
                Some(StateChange {
                    device_id: device_id.clone(),
                    old: None,
                    new,
                    confirmed,
                    source,
                    timestamp,
                })
            }
        }
    }

    fn notify(&self, change: &StateChange) {
        debug!(
            device_id = %change.device_id,
            confirmed = change.confirmed,
            "State changed"
        );
        for listener in self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
        {
            listener.on_state_changed(change);
        }
        // No receivers is fine; push delivery is best-effort
        let _ = self.tx.send(change.clone());
    }

    async fn persist(&self, change: &StateChange) {
        let state = DeviceState {
            device_id: change.device_id.clone(),
            properties: change.new.clone(),
            updated_at: change.timestamp,
            confirmed: change.confirmed,
            source: change.source.clone(),
        };
        if let Err(e) = self.state_store.put(&state).await {
            warn!(device_id = %state.device_id, "State persistence failed: {}", e);
        }
        if let Err(e) = self.history_store.append(&HistoryEntry::from_state(&state)).await {
            warn!(device_id = %state.device_id, "History append failed: {}", e);
        }
    }

    /// Persists every cached entry. Also run periodically by the
    /// snapshot task.
    pub async fn snapshot(&self) {
        let states: Vec<DeviceState> = self.cache.iter().map(|e| e.clone()).collect();
        for state in states {
            if let Err(e) = self.state_store.put(&state).await {
                warn!(device_id = %state.device_id, "Snapshot write failed: {}", e);
            }
        }
    }

    pub fn spawn_snapshot_task(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await; // immediate first tick
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        manager.snapshot().await;
                        break;
                    }
                    _ = timer.tick() => manager.snapshot().await,
                }
            }
        })
    }
}

impl StateView for StateManager {
    fn property(&self, device_id: &DeviceId, property: &str) -> Option<serde_json::Value> {
        self.cache
            .get(device_id)
            .and_then(|entry| entry.properties.get(property).cloned())
    }
}
