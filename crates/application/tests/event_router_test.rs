use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use application::{AssociationResolver, StateManager, spawn_state_intake};
use domain::device::DeviceId;
use domain::event::{CoreEvent, EventPublisher};
use domain::state::StateSource;
use infrastructure::{MemoryAssociationStore, MemoryHistoryStore, MemoryStateStore};

struct CapturingPublisher {
    events: Mutex<Vec<CoreEvent>>,
}

#[async_trait]
impl EventPublisher for CapturingPublisher {
    async fn publish(
        &self,
        event: CoreEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

fn manager() -> Arc<StateManager> {
    let resolver = Arc::new(AssociationResolver::new(Arc::new(
        MemoryAssociationStore::new(),
    )));
    Arc::new(StateManager::new(
        resolver,
        Arc::new(MemoryStateStore::new()),
        Arc::new(MemoryHistoryStore::new()),
        Duration::from_secs(300),
    ))
}

fn props(power: f64) -> serde_json::Map<String, serde_json::Value> {
    let mut m = serde_json::Map::new();
    m.insert("power".to_string(), serde_json::json!(power));
    m
}

#[tokio::test]
async fn applied_state_changes_reach_the_wired_publisher() {
    let states = manager();
    let publisher = Arc::new(CapturingPublisher {
        events: Mutex::new(Vec::new()),
    });
    let cancel = CancellationToken::new();
    let intake = spawn_state_intake(
        Arc::clone(&publisher) as Arc<dyn EventPublisher>,
        states.subscribe(),
        cancel.clone(),
    );

    let id = DeviceId::new("pump-chw-1").unwrap();
    states
        .set_state(&id, props(120.0), true, Utc::now(), StateSource::Native)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    {
        let events = publisher.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            CoreEvent::StateChanged {
                device_id,
                trigger,
                confirmed,
                new,
                ..
            } => {
                assert_eq!(device_id, &id);
                assert_eq!(trigger, "bridge");
                assert!(*confirmed);
                assert_eq!(new.get("power"), Some(&serde_json::json!(120.0)));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    cancel.cancel();
    intake.await.unwrap();
}

#[tokio::test]
async fn stale_updates_produce_no_event() {
    let states = manager();
    let publisher = Arc::new(CapturingPublisher {
        events: Mutex::new(Vec::new()),
    });
    let cancel = CancellationToken::new();
    let intake = spawn_state_intake(
        Arc::clone(&publisher) as Arc<dyn EventPublisher>,
        states.subscribe(),
        cancel.clone(),
    );

    let id = DeviceId::new("pump-chw-1").unwrap();
    let now = Utc::now();
    states
        .set_state(&id, props(120.0), true, now, StateSource::Native)
        .await
        .unwrap();
    states
        .set_state(
            &id,
            props(90.0),
            true,
            now - chrono::Duration::seconds(10),
            StateSource::Native,
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(publisher.events.lock().unwrap().len(), 1);

    cancel.cancel();
    intake.await.unwrap();
}
