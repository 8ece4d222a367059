use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use application::AckTracker;
use domain::command::{Command, CommandResolution, CommandSource};
use domain::device::DeviceId;
use domain::event::{CoreEvent, EventPublisher};
use domain::message::{AckError, AckMessage, AckStatus};

// --- Mocks ---

struct CapturingPublisher {
    events: std::sync::Mutex<Vec<CoreEvent>>,
}

impl CapturingPublisher {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            events: std::sync::Mutex::new(Vec::new()),
        })
    }

    fn timeout_events(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, CoreEvent::CommandTimedOut { .. }))
            .count()
    }

    fn resolution_events(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, CoreEvent::CommandResolved { .. }))
            .count()
    }
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

// --- Fixtures ---

fn tracker(publisher: Arc<CapturingPublisher>) -> Arc<AckTracker> {
    Arc::new(AckTracker::new(
        8,
        Duration::from_secs(10),
        Duration::from_secs(30),
        publisher,
    ))
}

fn command(device: &str) -> Command {
    Command::new(
        DeviceId::new(device).unwrap(),
        "on",
        serde_json::Map::new(),
        CommandSource::Api,
        None,
    )
}

fn ack(command_id: &str, device: &str, status: AckStatus) -> AckMessage {
    AckMessage {
        command_id: command_id.to_string(),
        timestamp: Utc::now(),
        device_id: DeviceId::new(device).unwrap(),
        status,
        error: None,
    }
}

// --- Tests ---

#[tokio::test]
async fn unacked_command_times_out_exactly_once() {
    let publisher = CapturingPublisher::new();
    let tracker = tracker(Arc::clone(&publisher));
    let cmd = command("light-1");
    let rx = tracker.register(&cmd, cmd.device_id.clone()).unwrap();

    let past_deadline = cmd.issued_at + chrono::Duration::seconds(11);
    tracker.sweep(past_deadline).await;
    tracker.sweep(past_deadline).await;
    tracker.sweep(past_deadline + chrono::Duration::seconds(60)).await;

    assert_eq!(rx.await.unwrap(), CommandResolution::TimedOut);
    assert_eq!(publisher.timeout_events(), 1);
    assert_eq!(publisher.resolution_events(), 1);
    assert_eq!(tracker.pending_len(), 0);
}

#[tokio::test]
async fn accepted_then_state_update_confirms() {
    let publisher = CapturingPublisher::new();
    let tracker = tracker(publisher);
    let cmd = command("light-1");
    let rx = tracker.register(&cmd, cmd.device_id.clone()).unwrap();

    tracker.handle_ack(ack(&cmd.id, "light-1", AckStatus::Accepted)).await;
    tracker
        .handle_state(&cmd.device_id, cmd.issued_at + chrono::Duration::seconds(1))
        .await;

    assert_eq!(rx.await.unwrap(), CommandResolution::Confirmed);
    assert_eq!(tracker.pending_len(), 0);
}

#[tokio::test]
async fn state_update_for_the_physical_device_also_confirms() {
    let publisher = CapturingPublisher::new();
    let tracker = tracker(publisher);
    let cmd = command("pump-chw-1");
    let physical = DeviceId::new("relay-1-ch3").unwrap();
    let rx = tracker.register(&cmd, physical.clone()).unwrap();

    tracker.handle_ack(ack(&cmd.id, "relay-1-ch3", AckStatus::Queued)).await;
    tracker
        .handle_state(&physical, cmd.issued_at + chrono::Duration::seconds(1))
        .await;

    assert_eq!(rx.await.unwrap(), CommandResolution::Confirmed);
}

#[tokio::test]
async fn state_update_never_confirms_an_unacked_command() {
    let publisher = CapturingPublisher::new();
    let tracker = tracker(publisher);
    let cmd = command("light-1");
    let _rx = tracker.register(&cmd, cmd.device_id.clone()).unwrap();

    tracker
        .handle_state(&cmd.device_id, cmd.issued_at + chrono::Duration::seconds(1))
        .await;

    assert_eq!(tracker.pending_len(), 1);
}

#[tokio::test]
async fn stale_state_update_never_confirms() {
    let publisher = CapturingPublisher::new();
    let tracker = tracker(publisher);
    let cmd = command("light-1");
    let _rx = tracker.register(&cmd, cmd.device_id.clone()).unwrap();

    tracker.handle_ack(ack(&cmd.id, "light-1", AckStatus::Accepted)).await;
    // Retained state from before the command was issued
    tracker
        .handle_state(&cmd.device_id, cmd.issued_at - chrono::Duration::seconds(5))
        .await;

    assert_eq!(tracker.pending_len(), 1);
}

#[tokio::test]
async fn accepted_without_confirmation_resolves_unconfirmed() {
    let publisher = CapturingPublisher::new();
    let tracker = tracker(publisher);
    let cmd = command("light-1");
    let rx = tracker.register(&cmd, cmd.device_id.clone()).unwrap();

    tracker.handle_ack(ack(&cmd.id, "light-1", AckStatus::Accepted)).await;
    tracker.sweep(Utc::now() + chrono::Duration::seconds(31)).await;

    assert_eq!(rx.await.unwrap(), CommandResolution::Unconfirmed);
}

#[tokio::test]
async fn failed_ack_carries_the_bridge_error() {
    let publisher = CapturingPublisher::new();
    let tracker = tracker(publisher);
    let cmd = command("light-1");
    let rx = tracker.register(&cmd, cmd.device_id.clone()).unwrap();

    let mut nack = ack(&cmd.id, "light-1", AckStatus::Failed);
    nack.error = Some(AckError {
        code: "DEVICE_UNREACHABLE".to_string(),
        message: "no response on the bus".to_string(),
    });
    tracker.handle_ack(nack).await;

    match rx.await.unwrap() {
        CommandResolution::Failed { code, message } => {
            assert_eq!(code, "DEVICE_UNREACHABLE");
            assert_eq!(message, "no response on the bus");
        }
        other => panic!("expected Failed, got {:?}", other),
    }
}

#[tokio::test]
async fn duplicate_and_unknown_acks_are_tolerated() {
    let publisher = CapturingPublisher::new();
    let tracker = tracker(Arc::clone(&publisher));
    let cmd = command("light-1");
    let rx = tracker.register(&cmd, cmd.device_id.clone()).unwrap();

    tracker.handle_ack(ack(&cmd.id, "light-1", AckStatus::Accepted)).await;
    tracker.handle_ack(ack(&cmd.id, "light-1", AckStatus::Accepted)).await;
    tracker.handle_ack(ack("no-such-command", "light-1", AckStatus::Accepted)).await;
    tracker.handle_ack(ack("no-such-command", "light-1", AckStatus::Failed)).await;

    assert_eq!(tracker.pending_len(), 1);
    assert_eq!(publisher.resolution_events(), 0);

    tracker
        .handle_state(&cmd.device_id, Utc::now())
        .await;
    assert_eq!(rx.await.unwrap(), CommandResolution::Confirmed);
}

#[tokio::test]
async fn backwards_clock_jump_expires_immediately() {
    let publisher = CapturingPublisher::new();
    let tracker = tracker(publisher);
    let cmd = command("light-1");
    let rx = tracker.register(&cmd, cmd.device_id.clone()).unwrap();

    tracker.sweep(cmd.issued_at - chrono::Duration::hours(1)).await;

    assert_eq!(rx.await.unwrap(), CommandResolution::TimedOut);
    assert_eq!(tracker.pending_len(), 0);
}

#[tokio::test]
async fn dropped_waiter_still_resolves_cleanly() {
    let publisher = CapturingPublisher::new();
    let tracker = tracker(Arc::clone(&publisher));
    let cmd = command("light-1");
    let rx = tracker.register(&cmd, cmd.device_id.clone()).unwrap();
    drop(rx);

    tracker.sweep(cmd.issued_at + chrono::Duration::seconds(11)).await;

    assert_eq!(tracker.pending_len(), 0);
    assert_eq!(publisher.resolution_events(), 1);
}
