use async_trait::async_trait;
use domain::event::{CoreEvent, EventPublisher};
use std::sync::Arc;

/// Fans one event out to several publishers (in-process router plus the
/// MQTT push channel). A failing publisher never blocks the others.
pub struct CompositeEventPublisher {
    publishers: Vec<Arc<dyn EventPublisher>>,
}

impl CompositeEventPublisher {
    pub fn new(publishers: Vec<Arc<dyn EventPublisher>>) -> Self {
        Self { publishers }
    }
}

#[async_trait]
impl EventPublisher for CompositeEventPublisher {
    async fn publish(
        &self,
        event: CoreEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        for publisher in &self.publishers {
            if let Err(e) = publisher.publish(event.clone()).await {
                tracing::error!("Failed to publish event to one of the publishers: {}", e);
            }
        }
        Ok(())
    }
}
