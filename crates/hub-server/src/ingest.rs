//! Inbound MQTT dispatch: bridge traffic and UI requests fan out to the
//! core components.

use std::sync::Arc;

use tracing::{debug, warn};

use application::{
    AckTracker, BridgeHealthRegistry, DeviceRegistry, HouseMode, SceneEngine, StateManager,
};
use domain::command::CommandSource;
use domain::event::{CoreEvent, EventPublisher};
use domain::message::{AckMessage, HealthMessage, RequestMessage, ResponseMessage, StateMessage};
use domain::state::StateSource;
use infrastructure::messaging::mqtt_client::{BridgeTransport, Qos};
use infrastructure::messaging::topics::{self, ParsedTopic};
use infrastructure::MqttMessage;

/// Everything the dispatch loop feeds.
pub struct IngestContext {
    pub states: Arc<StateManager>,
    pub tracker: Arc<AckTracker>,
    pub health: Arc<BridgeHealthRegistry>,
    pub scenes: Arc<SceneEngine>,
    pub mode: Arc<HouseMode>,
    pub publisher: Arc<dyn EventPublisher>,
}

pub async fn process_message(ctx: &IngestContext, msg: MqttMessage) {
    if let Some(parsed) = topics::parse(&msg.topic) {
        match parsed {
            ParsedTopic::State { .. } => handle_state(ctx, &msg).await,
            ParsedTopic::Ack { .. } => handle_ack(ctx, &msg).await,
            ParsedTopic::Health { protocol } => handle_health(ctx, &protocol, &msg).await,
            ParsedTopic::Response { request_id, .. } => handle_response(&request_id, &msg),
        }
        return;
    }

    // UI request topics under the core prefix
    if let Some(scene_id) = scene_activation_target(&msg.topic) {
        handle_scene_activation(ctx, scene_id).await;
    } else if msg.topic == topics::core_mode_set() {
        handle_mode_set(ctx, &msg).await;
    }
}

async fn handle_state(ctx: &IngestContext, msg: &MqttMessage) {
    let message: StateMessage = match serde_json::from_slice(&msg.payload) {
        Ok(m) => m,
        Err(e) => {
            warn!(topic = %msg.topic, "Malformed state payload: {}", e);
            return;
        }
    };

    // Confirmation feed first: the state update may close pending commands
    ctx.tracker
        .handle_state(&message.device_id, message.timestamp)
        .await;

    if let Err(e) = ctx
        .states
        .set_state(
            &message.device_id,
            message.state,
            true,
            message.timestamp,
            StateSource::Native,
        )
        .await
    {
        warn!(device_id = %message.device_id, "State update rejected: {}", e);
    }
}

async fn handle_ack(ctx: &IngestContext, msg: &MqttMessage) {
    match serde_json::from_slice::<AckMessage>(&msg.payload) {
        Ok(ack) => ctx.tracker.handle_ack(ack).await,
        Err(e) => warn!(topic = %msg.topic, "Malformed ack payload: {}", e),
    }
}

async fn handle_health(ctx: &IngestContext, protocol: &str, msg: &MqttMessage) {
    match serde_json::from_slice::<HealthMessage>(&msg.payload) {
        Ok(health) => ctx.health.update(protocol, health).await,
        Err(e) => warn!(topic = %msg.topic, "Malformed health payload: {}", e),
    }
}

fn handle_response(request_id: &str, msg: &MqttMessage) {
    match serde_json::from_slice::<ResponseMessage>(&msg.payload) {
        Ok(response) if response.success => {
            debug!(request_id = %response.request_id, "Bridge request succeeded");
        }
        Ok(response) => {
            warn!(
                request_id = %response.request_id,
                error = ?response.error,
                "Bridge request failed"
            );
        }
        Err(e) => warn!(request_id = %request_id, "Malformed response payload: {}", e),
    }
}

/// Asks every bridge with registered devices for a full state read.
/// Runs once at startup so the cache converges without waiting for
/// unsolicited traffic. Returns the number of requests published.
pub async fn request_full_state(
    registry: &DeviceRegistry,
    transport: &dyn BridgeTransport,
) -> usize {
    let mut protocols: Vec<&'static str> = registry
        .list()
        .await
        .into_iter()
        .map(|device| device.protocol.as_str())
        .collect();
    protocols.sort_unstable();
    protocols.dedup();

    let mut sent = 0;
    for protocol in protocols {
        let request = RequestMessage::read_all();
        let topic = topics::request(protocol, &request.request_id);
        let payload = match serde_json::to_vec(&request) {
            Ok(p) => p,
            Err(e) => {
                warn!(protocol, "Failed to serialize state request: {}", e);
                continue;
            }
        };
        match transport
            .publish_bytes(&topic, &payload, Qos::AtLeastOnce, false)
            .await
        {
            Ok(()) => {
                debug!(protocol, request_id = %request.request_id, "Full state read requested");
                sent += 1;
            }
            Err(e) => warn!(protocol, "State read request failed: {}", e),
        }
    }
    sent
}

async fn handle_scene_activation(ctx: &IngestContext, scene_id: &str) {
    match ctx.scenes.activate(scene_id, CommandSource::Api).await {
        Ok(execution_id) => {
            debug!(scene_id = %scene_id, execution_id = %execution_id, "Scene activation accepted");
        }
        Err(e) => warn!(scene_id = %scene_id, "Scene activation rejected: {}", e),
    }
}

async fn handle_mode_set(ctx: &IngestContext, msg: &MqttMessage) {
    #[derive(serde::Deserialize)]
    struct ModeRequest {
        mode: String,
    }

    let request: ModeRequest = match serde_json::from_slice(&msg.payload) {
        Ok(r) => r,
        Err(e) => {
            warn!("Malformed mode request: {}", e);
            return;
        }
    };

    let old = ctx.mode.set(request.mode.clone());
    if old != request.mode {
        let event = CoreEvent::ModeChanged {
            old,
            new: request.mode,
            timestamp: chrono::Utc::now(),
        };
        if let Err(e) = ctx.publisher.publish(event).await {
            warn!("Failed to publish mode change: {}", e);
        }
    }
}

/// Extracts the scene id from `…/scene/{id}/activate`, if this is one.
fn scene_activation_target(topic: &str) -> Option<&str> {
    let rest = topic.strip_prefix(topics::CORE_PREFIX)?;
    let rest = rest.strip_prefix("/scene/")?;
    rest.strip_suffix("/activate")
        .filter(|id| !id.is_empty() && !id.contains('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::device::{Capability, Device, DeviceId, Domain, HealthStatus, Protocol};
    use domain::message::RequestAction;
    use infrastructure::MemoryDeviceStore;

    struct RecordingTransport {
        topics: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl BridgeTransport for RecordingTransport {
        async fn publish_bytes(
            &self,
            topic: &str,
            payload: &[u8],
            _qos: Qos,
            _retain: bool,
        ) -> anyhow::Result<()> {
            let request: RequestMessage = serde_json::from_slice(payload)?;
            assert_eq!(request.action, RequestAction::ReadAll);
            assert!(request.device_id.is_none());
            self.topics.lock().unwrap().push(topic.to_string());
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    fn device(id: &str, protocol: Protocol) -> Device {
        let now = chrono::Utc::now();
        Device {
            id: DeviceId::new(id).unwrap(),
            name: id.to_string(),
            room_id: None,
            area_id: None,
            domain: Domain::Lighting,
            protocol,
            address: serde_json::Map::new(),
            capabilities: vec![Capability::OnOff],
            config: serde_json::Map::new(),
            health: HealthStatus::Unknown,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_startup_state_sync_asks_each_bridge_once() {
        let store = Arc::new(MemoryDeviceStore::new());
        for d in [
            device("light-1", Protocol::Knx),
            device("light-2", Protocol::Knx),
            device("pump-1", Protocol::ModbusTcp),
        ] {
            domain::store::DeviceStore::put(store.as_ref(), &d)
                .await
                .unwrap();
        }
        let registry = DeviceRegistry::new(store);
        registry.refresh_cache().await.unwrap();

        let transport = RecordingTransport {
            topics: std::sync::Mutex::new(Vec::new()),
        };
        let sent = request_full_state(&registry, &transport).await;

        assert_eq!(sent, 2);
        let seen = transport.topics.lock().unwrap();
        assert!(seen.iter().any(|t| t.starts_with("gridhub/request/knx/")));
        assert!(
            seen.iter()
                .any(|t| t.starts_with("gridhub/request/modbus_tcp/"))
        );
    }

    #[test]
    fn test_scene_activation_target() {
        assert_eq!(
            scene_activation_target("gridhub/core/scene/evening/activate"),
            Some("evening")
        );
        assert_eq!(scene_activation_target("gridhub/core/scene//activate"), None);
        assert_eq!(scene_activation_target("gridhub/core/mode/set"), None);
        assert_eq!(
            scene_activation_target("gridhub/core/scene/a/b/activate"),
            None
        );
    }
}
