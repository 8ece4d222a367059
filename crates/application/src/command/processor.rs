//! Fail-fast command execution pipeline.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::info;

use domain::auth::Authorizer;
use domain::command::{Command, CommandResolution};
use domain::error::{CoreError, Result};
use domain::message::CommandMessage;

use infrastructure::messaging::mqtt_client::{BridgeTransport, Qos};
use infrastructure::messaging::topics;

use crate::associations::AssociationResolver;
use crate::command::ack_tracker::AckTracker;
use crate::command::schema::CommandSchemaRegistry;
use crate::health::BridgeHealthRegistry;
use crate::registry::DeviceRegistry;

/// Validates, authorizes, proxy-routes, and publishes commands.
///
/// Every check happens before anything touches the wire; a failure at any
/// step leaves zero side effects.
pub struct CommandProcessor {
    registry: Arc<DeviceRegistry>,
    resolver: Arc<AssociationResolver>,
    schemas: Arc<CommandSchemaRegistry>,
    authorizer: Arc<dyn Authorizer>,
    health: Arc<BridgeHealthRegistry>,
    transport: Arc<dyn BridgeTransport>,
    tracker: Arc<AckTracker>,
}

impl CommandProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<DeviceRegistry>,
        resolver: Arc<AssociationResolver>,
        schemas: Arc<CommandSchemaRegistry>,
        authorizer: Arc<dyn Authorizer>,
        health: Arc<BridgeHealthRegistry>,
        transport: Arc<dyn BridgeTransport>,
        tracker: Arc<AckTracker>,
    ) -> Self {
        Self {
            registry,
            resolver,
            schemas,
            authorizer,
            health,
            transport,
            tracker,
        }
    }

    /// Executes a command against a logical device.
    ///
    /// Pipeline: existence -> schema -> authorization -> proxy resolution
    /// -> bridge health -> register pending -> publish. The returned
    /// receiver resolves when the command reaches a terminal state.
    pub async fn execute(&self, cmd: Command) -> Result<oneshot::Receiver<CommandResolution>> {
        let device = self.registry.get(&cmd.device_id).await?;

        self.schemas.validate(&device, &cmd.name, &cmd.parameters)?;

        self.authorizer
            .authorize(cmd.user_id.as_deref(), &cmd.device_id, &cmd.name)
            .await?;

        // Route through the control proxy when one is configured
        let proxy = self
            .resolver
            .control_proxy(&cmd.device_id, device.room_id.as_deref());
        let (physical, wire_command) = match &proxy {
            Some(assoc) => {
                let physical = self.registry.get(&assoc.source_device_id).await?;
                let wire_command = assoc.map_command(&cmd.name).to_string();
                (physical, wire_command)
            }
            None => (device, cmd.name.clone()),
        };

        if !self.health.accepts_commands(physical.protocol) {
            return Err(CoreError::BridgeUnavailable(
                physical.protocol.as_str().to_string(),
            ));
        }

        let message = CommandMessage::from_command(&cmd, physical.id.clone(), wire_command.clone());
        let payload = serde_json::to_vec(&message)
            .map_err(|e| CoreError::validation(format!("failed to encode command: {}", e)))?;
        let topic = topics::command(physical.protocol.as_str(), physical.id.as_str());

        // Reserve the pending slot before touching the wire; a full table
        // rejects here with zero side effects
        let receiver = self.tracker.register(&cmd, physical.id.clone())?;

        if let Err(e) = self
            .transport
            .publish_bytes(&topic, &payload, Qos::AtLeastOnce, false)
            .await
        {
            self.tracker.abort(&cmd.id);
            return Err(CoreError::BridgeUnavailable(format!(
                "publish to {} failed: {}",
                topic, e
            )));
        }

        // Audit record: both the logical target and the physical proxy,
        // replayable to reconstruct the user-facing command
        info!(
            command_id = %cmd.id,
            logical_device = %cmd.device_id,
            physical_device = %physical.id,
            command = %cmd.name,
            wire_command = %wire_command,
            proxied = proxy.is_some(),
            source = %cmd.source.as_str(),
            user_id = cmd.user_id.as_deref().unwrap_or(""),
            "Command published"
        );

        Ok(receiver)
    }
}
