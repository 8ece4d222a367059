//! Per-protocol bridge health, fed by retained health topics and
//! last-will offline markers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{info, warn};

use domain::device::Protocol;
use domain::event::{CoreEvent, EventPublisher};
use domain::message::{BridgeStatus, HealthMessage};

/// Latest report from one bridge.
#[derive(Debug, Clone)]
pub struct BridgeHealth {
    pub status: BridgeStatus,
    pub reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Latest known health per protocol bridge.
///
/// A bridge never heard from counts as unavailable: commands are only
/// published toward bridges that have positively reported themselves.
pub struct BridgeHealthRegistry {
    bridges: DashMap<String, BridgeHealth>,
    publisher: Arc<dyn EventPublisher>,
}

impl BridgeHealthRegistry {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            bridges: DashMap::new(),
            publisher,
        }
    }

    pub async fn update(&self, protocol: &str, message: HealthMessage) {
        let previous = self
            .bridges
            .insert(
                protocol.to_string(),
                BridgeHealth {
                    status: message.status,
                    reason: message.reason.clone(),
                    updated_at: message.timestamp,
                },
            )
            .map(|h| h.status);

        if previous == Some(message.status) {
            return;
        }

        match message.status {
            BridgeStatus::Healthy => {
                info!(protocol = %protocol, "Bridge healthy");
            }
            status => {
                warn!(
                    protocol = %protocol,
                    status = %status.as_str(),
                    reason = message.reason.as_deref().unwrap_or(""),
                    "Bridge status changed"
                );
            }
        }

        let event = CoreEvent::bridge_health_changed(protocol, message.status.as_str());
        if let Err(e) = self.publisher.publish(event).await {
            warn!("Failed to publish bridge health event: {}", e);
        }
    }

    pub fn status(&self, protocol: Protocol) -> Option<BridgeStatus> {
        self.bridges.get(protocol.as_str()).map(|h| h.status)
    }

    /// Full report for diagnostics, including reason and report time.
    pub fn detail(&self, protocol: Protocol) -> Option<BridgeHealth> {
        self.bridges.get(protocol.as_str()).map(|h| h.clone())
    }

    /// True when the bridge has reported a state that accepts commands.
    pub fn accepts_commands(&self, protocol: Protocol) -> bool {
        self.status(protocol)
            .is_some_and(|status| status.accepts_commands())
    }
}
