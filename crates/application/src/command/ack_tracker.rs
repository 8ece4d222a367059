//! Pending-command table and the two-phase command-ack protocol.
//!
//! Phase one: the bridge acks receipt (accepted/queued/failed) within the
//! ack window. Phase two: an accepted command stays pending until a state
//! update from the device confirms it, or the confirm window closes. An
//! ack is not completion.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use domain::command::{Command, CommandResolution};
use domain::device::DeviceId;
use domain::error::{CoreError, Result};
use domain::event::{CoreEvent, EventPublisher};
use domain::message::{AckMessage, AckStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingPhase {
    /// Published, waiting for the bridge ack
    Published,
    /// Acked accepted/queued, waiting for state confirmation
    Acked,
}

struct PendingCommand {
    logical_device: DeviceId,
    physical_device: DeviceId,
    issued_at: DateTime<Utc>,
    ack_deadline: DateTime<Utc>,
    confirm_deadline: DateTime<Utc>,
    phase: PendingPhase,
    waiter: Option<oneshot::Sender<CommandResolution>>,
}

/// Bounded table of commands awaiting acknowledgment or confirmation.
pub struct AckTracker {
    pending: DashMap<String, PendingCommand>,
    capacity: usize,
    ack_timeout: chrono::Duration,
    confirm_timeout: chrono::Duration,
    publisher: Arc<dyn EventPublisher>,
}

impl AckTracker {
    pub fn new(
        capacity: usize,
        ack_timeout: Duration,
        confirm_timeout: Duration,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            pending: DashMap::new(),
            capacity,
            ack_timeout: chrono::Duration::from_std(ack_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(10)),
            confirm_timeout: chrono::Duration::from_std(confirm_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(30)),
            publisher,
        }
    }

    /// Registers a published command and returns the completion signal.
    ///
    /// Rejects with `BridgeUnavailable` when the table is full: a growing
    /// backlog means the bridges cannot keep up, and admission control
    /// beats unbounded memory.
    pub fn register(
        &self,
        command: &Command,
        physical_device: DeviceId,
    ) -> Result<oneshot::Receiver<CommandResolution>> {
        if self.pending.len() >= self.capacity {
            return Err(CoreError::BridgeUnavailable(
                "pending command table full".to_string(),
            ));
        }
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            command.id.clone(),
            PendingCommand {
                logical_device: command.device_id.clone(),
                physical_device,
                issued_at: command.issued_at,
                ack_deadline: command.issued_at + self.ack_timeout,
                confirm_deadline: command.issued_at + self.ack_timeout + self.confirm_timeout,
                phase: PendingPhase::Published,
                waiter: Some(tx),
            },
        );
        Ok(rx)
    }

    /// Drops a registration that never made it onto the wire.
    pub fn abort(&self, command_id: &str) {
        self.pending.remove(command_id);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Processes a bridge ack. Duplicate and unknown acks are tolerated
    /// silently (at-least-once delivery).
    pub async fn handle_ack(&self, ack: AckMessage) {
        match ack.status {
            AckStatus::Accepted | AckStatus::Queued => {
                let Some(mut entry) = self.pending.get_mut(&ack.command_id) else {
                    debug!(command_id = %ack.command_id, "Ack for unknown command ignored");
                    return;
                };
                if entry.phase == PendingPhase::Acked {
                    debug!(command_id = %ack.command_id, "Duplicate ack ignored");
                    return;
                }
                entry.phase = PendingPhase::Acked;
                entry.confirm_deadline = Utc::now() + self.confirm_timeout;
                debug!(
                    command_id = %ack.command_id,
                    status = ?ack.status,
                    "Command acked, awaiting state confirmation"
                );
            }
            AckStatus::Failed | AckStatus::Timeout => {
                let Some((_, entry)) = self.pending.remove(&ack.command_id) else {
                    debug!(command_id = %ack.command_id, "Ack for unknown command ignored");
                    return;
                };
                let (code, message) = match ack.error {
                    Some(err) => (err.code, err.message),
                    None => match ack.status {
                        AckStatus::Timeout => (
                            "DEVICE_TIMEOUT".to_string(),
                            "device did not respond".to_string(),
                        ),
                        _ => ("COMMAND_FAILED".to_string(), "bridge reported failure".to_string()),
                    },
                };
                warn!(
                    command_id = %ack.command_id,
                    device_id = %entry.logical_device,
                    code = %code,
                    "Command failed: {}",
                    message
                );
                self.resolve(
                    ack.command_id,
                    entry,
                    CommandResolution::Failed { code, message },
                )
                .await;
            }
        }
    }

    /// Feeds an inbound state update into phase two: any acked command
    /// against this device whose issue time is not after the update's
    /// timestamp becomes state-confirmed.
    pub async fn handle_state(&self, device_id: &DeviceId, timestamp: DateTime<Utc>) {
        let confirmed: Vec<String> = self
            .pending
            .iter()
            .filter(|e| {
                e.phase == PendingPhase::Acked
                    && timestamp >= e.issued_at
                    && (e.logical_device == *device_id || e.physical_device == *device_id)
            })
            .map(|e| e.key().clone())
            .collect();

        for command_id in confirmed {
            // Re-check under removal; an ack or sweep may have raced us
            if let Some((_, entry)) = self
                .pending
                .remove_if(&command_id, |_, e| e.phase == PendingPhase::Acked)
            {
                info!(command_id = %command_id, device_id = %device_id, "Command state-confirmed");
                self.resolve(command_id, entry, CommandResolution::Confirmed)
                    .await;
            }
        }
    }

    /// Expires overdue entries. An entry whose issue time lies in the
    /// future (clock jumped backwards) is expired immediately rather than
    /// left to linger.
    pub async fn sweep(&self, now: DateTime<Utc>) {
        let overdue: Vec<(String, PendingPhase)> = self
            .pending
            .iter()
            .filter_map(|e| {
                let clock_jump = now < e.issued_at;
                match e.phase {
                    PendingPhase::Published if clock_jump || now >= e.ack_deadline => {
                        Some((e.key().clone(), PendingPhase::Published))
                    }
                    PendingPhase::Acked if clock_jump || now >= e.confirm_deadline => {
                        Some((e.key().clone(), PendingPhase::Acked))
                    }
                    _ => None,
                }
            })
            .collect();

        for (command_id, phase) in overdue {
            let Some((_, entry)) = self.pending.remove_if(&command_id, |_, e| e.phase == phase)
            else {
                continue;
            };
            match phase {
                PendingPhase::Published => {
                    warn!(
                        command_id = %command_id,
                        device_id = %entry.logical_device,
                        "No acknowledgment within deadline"
                    );
                    let event = CoreEvent::command_timed_out(
                        command_id.clone(),
                        entry.logical_device.clone(),
                    );
                    if let Err(e) = self.publisher.publish(event).await {
                        warn!("Failed to publish timeout event: {}", e);
                    }
                    self.resolve(command_id, entry, CommandResolution::TimedOut)
                        .await;
                }
                PendingPhase::Acked => {
                    debug!(
                        command_id = %command_id,
                        device_id = %entry.logical_device,
                        "Accepted command never state-confirmed"
                    );
                    self.resolve(command_id, entry, CommandResolution::Unconfirmed)
                        .await;
                }
            }
        }
    }

    async fn resolve(
        &self,
        command_id: String,
        mut entry: PendingCommand,
        resolution: CommandResolution,
    ) {
        if let Some(tx) = entry.waiter.take() {
            // Receiver may have been dropped; resolution still gets published
            let _ = tx.send(resolution.clone());
        }
        let event =
            CoreEvent::command_resolved(command_id, entry.logical_device.clone(), resolution);
        if let Err(e) = self.publisher.publish(event).await {
            warn!("Failed to publish resolution event: {}", e);
        }
    }

    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = timer.tick() => tracker.sweep(Utc::now()).await,
                }
            }
        })
    }
}
