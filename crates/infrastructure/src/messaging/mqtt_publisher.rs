use crate::messaging::mqtt_client::MqttClient;
use crate::messaging::topics;
use async_trait::async_trait;
use domain::event::{CoreEvent, EventPublisher};

/// Pushes core events onto the message bus for UIs and external
/// subscribers. Failures are logged and swallowed; event delivery to the
/// outside world is best-effort and must never block the core.
pub struct MqttEventPublisher {
    client: MqttClient,
}

impl MqttEventPublisher {
    pub fn new(client: MqttClient) -> Self {
        Self { client }
    }

    fn topic_for(event: &CoreEvent) -> String {
        match event {
            CoreEvent::StateChanged { device_id, .. } => {
                topics::core_device_state(device_id.as_str())
            }
            CoreEvent::SceneProgress { scene_id, .. } => topics::core_scene_progress(scene_id),
            CoreEvent::CommandTimedOut { .. } => topics::core_event("command_timed_out"),
            CoreEvent::CommandResolved { .. } => topics::core_event("command_resolved"),
            CoreEvent::BridgeHealthChanged { .. } => topics::core_event("bridge_health_changed"),
            CoreEvent::ModeChanged { .. } => topics::core_mode(),
        }
    }

    /// Canonical device state and mode are retained so late subscribers
    /// see the latest value immediately.
    fn retain_for(event: &CoreEvent) -> bool {
        matches!(
            event,
            CoreEvent::StateChanged { .. } | CoreEvent::ModeChanged { .. }
        )
    }
}

#[async_trait]
impl EventPublisher for MqttEventPublisher {
    async fn publish(
        &self,
        event: CoreEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let topic = Self::topic_for(&event);
        let retain = Self::retain_for(&event);

        let payload = match serde_json::to_string(&event) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("Failed to serialize event for {}: {}", topic, e);
                return Ok(());
            }
        };

        if let Err(e) = self.client.publish(&topic, &payload, retain).await {
            tracing::error!("Failed to publish event to {}: {}", topic, e);
        }
        Ok(())
    }
}
