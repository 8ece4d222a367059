//! Budgeted fan-out of core events to registered handlers.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use domain::event::{CoreEvent, EventPublisher};
use domain::state::StateSource;

use crate::state::StateChange;

/// An in-process event consumer (scene triggers, re-evaluation hooks,
/// alerting). Handlers run as independent tasks; one handler can never
/// starve another.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;
    async fn handle(&self, event: CoreEvent);
}

/// Dispatches events to handlers under a per-handler wall-clock budget.
///
/// A handler exceeding the budget is logged and left running detached;
/// it is never joined and never blocks the dispatch of other handlers.
/// Cross-handler ordering is unspecified.
pub struct EventRouter {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
    budget: Duration,
}

impl EventRouter {
    pub fn new(budget: Duration) -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            budget,
        }
    }

    pub fn register_handler(&self, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(handler);
    }

    pub fn dispatch(&self, event: CoreEvent) {
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for handler in handlers {
            let event = event.clone();
            let budget = self.budget;
            let name = handler.name().to_string();
            tokio::spawn(async move {
                // Run the handler as its own task so an overrun detaches
                // instead of being cancelled mid-flight
                let join = tokio::spawn(async move { handler.handle(event).await });
                match tokio::time::timeout(budget, join).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(handler = %name, "Event handler panicked: {}", e),
                    Err(_) => {
                        warn!(
                            handler = %name,
                            budget_ms = budget.as_millis() as u64,
                            "Event handler exceeded dispatch budget, detached"
                        );
                    }
                }
            });
        }
    }
}

/// Consumes the state manager's push channel, forwarding every applied
/// transition as an event through the given publisher. Wiring the
/// composite publisher here puts both the in-process handlers and the
/// external push feed on the state-change path.
pub fn spawn_state_intake(
    publisher: Arc<dyn EventPublisher>,
    mut rx: broadcast::Receiver<StateChange>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(change) => {
                        if let Err(e) = publisher.publish(state_change_event(change)).await {
                            warn!("Failed to publish state change: {}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "State intake lagged, events skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("State channel closed, intake stopping");
                        break;
                    }
                }
            }
        }
    })
}

fn state_change_event(change: StateChange) -> CoreEvent {
    let trigger = match change.source {
        StateSource::Native => "bridge",
        StateSource::Derived { .. } => "association",
    };
    CoreEvent::state_changed(
        change.device_id,
        change.old,
        change.new,
        change.confirmed,
        trigger,
        change.timestamp,
    )
}

/// Writes every event to the log at an appropriate level. Registered by
/// default so a bare deployment still has an audit trail.
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    fn name(&self) -> &str {
        "logging"
    }

    async fn handle(&self, event: CoreEvent) {
        match &event {
            CoreEvent::StateChanged {
                device_id,
                confirmed,
                trigger,
                ..
            } => {
                debug!(device_id = %device_id, confirmed, trigger = %trigger, "State changed");
            }
            CoreEvent::CommandTimedOut {
                command_id,
                device_id,
                ..
            } => {
                warn!(command_id = %command_id, device_id = %device_id, "Command timed out");
            }
            CoreEvent::CommandResolved {
                command_id,
                outcome,
                ..
            } => {
                debug!(command_id = %command_id, outcome = ?outcome, "Command resolved");
            }
            CoreEvent::SceneProgress {
                execution_id,
                status,
                actions_completed,
                actions_total,
                ..
            } => {
                debug!(
                    execution_id = %execution_id,
                    status = ?status,
                    progress = format!("{}/{}", actions_completed, actions_total),
                    "Scene progress"
                );
            }
            CoreEvent::BridgeHealthChanged {
                protocol, status, ..
            } => {
                debug!(protocol = %protocol, status = %status, "Bridge health changed");
            }
            CoreEvent::ModeChanged { old, new, .. } => {
                debug!(old = %old, new = %new, "House mode changed");
            }
        }
    }
}

/// Lets components that emit events (ack tracker, scene engine, health
/// registry) publish straight into the router.
#[async_trait]
impl EventPublisher for EventRouter {
    async fn publish(
        &self,
        event: CoreEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.dispatch(event);
        Ok(())
    }
}
