use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use application::{
    AckTracker, AssociationResolver, BridgeHealthRegistry, CommandProcessor,
    CommandSchemaRegistry, DeviceRegistry, EventRouter, HouseMode, LoggingEventHandler,
    SceneEngine, SceneTriggerHandler, StateManager, spawn_state_intake,
};
use application::logic::NoSun;
use domain::auth::AllowAll;
use domain::event::EventPublisher;
use infrastructure::messaging::mqtt_client::BridgeTransport;
use infrastructure::storage::sqlite::{
    self, SqliteAssociationStore, SqliteDeviceStore, SqliteHistoryStore, SqliteSceneStore,
    SqliteStateStore,
};
use infrastructure::{
    CompositeEventPublisher, HubConfig, MqttClient, MqttEventPublisher, WillSpec, topics,
};

use hub_server::ingest::{self, IngestContext};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// MQTT broker host
    #[arg(long, default_value = "localhost")]
    mqtt_host: String,

    /// MQTT broker port
    #[arg(long, default_value = "1883")]
    mqtt_port: u16,

    /// MQTT client ID
    #[arg(long, default_value = "gridhub-core")]
    mqtt_client_id: String,

    /// SQLite connection string
    #[arg(long, default_value = "sqlite://gridhub.db?mode=rwc")]
    database_url: String,

    /// Config directory; when present, file settings take precedence
    /// over the CLI defaults above
    #[arg(long)]
    config_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,hub_server=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("Gridhub core starting...");

    let config = match &args.config_dir {
        Some(dir) => HubConfig::load(dir)?,
        None => HubConfig {
            hub_id: "gridhub".to_string(),
            mqtt: infrastructure::config::MqttConfig {
                host: args.mqtt_host.clone(),
                port: args.mqtt_port,
                client_id: args.mqtt_client_id.clone(),
                status_topic: None,
            },
            database: infrastructure::config::DatabaseConfig {
                path: args.database_url.clone(),
            },
            timing: Default::default(),
            command: Default::default(),
        },
    };

    // Persistence
    info!(path = %config.database.path, "Opening state database...");
    let pool = sqlite::connect(&config.database.path).await?;
    sqlite::init_schema(&pool).await?;
    let state_store = Arc::new(SqliteStateStore::new(pool.clone()));
    let history_store = Arc::new(SqliteHistoryStore::new(pool.clone()));
    let device_store = Arc::new(SqliteDeviceStore::new(pool.clone()));
    let association_store = Arc::new(SqliteAssociationStore::new(pool.clone()));
    let scene_store = Arc::new(SqliteSceneStore::new(pool));

    // Core components
    let resolver = Arc::new(AssociationResolver::new(association_store));
    resolver.load().await?;
    let registry = Arc::new(DeviceRegistry::new(device_store));
    registry.refresh_cache().await?;
    let states = Arc::new(StateManager::new(
        Arc::clone(&resolver),
        state_store,
        history_store,
        Duration::from_secs(config.timing.staleness_secs),
    ));
    states.restore().await?;

    // MQTT
    let status_topic = config
        .mqtt
        .status_topic
        .clone()
        .unwrap_or_else(|| format!("{}/status", topics::CORE_PREFIX));
    info!(
        host = %config.mqtt.host,
        port = config.mqtt.port,
        client_id = %config.mqtt.client_id,
        "Connecting to MQTT..."
    );
    let mqtt_client = MqttClient::new(
        &config.mqtt.host,
        config.mqtt.port,
        &config.mqtt.client_id,
        Some(WillSpec {
            topic: status_topic.clone(),
            payload: serde_json::json!({"status": "offline"}).to_string(),
            retain: true,
        }),
    )
    .await?;

    mqtt_client.subscribe(&topics::all_states()).await?;
    mqtt_client.subscribe(&topics::all_acks()).await?;
    mqtt_client.subscribe(&topics::all_health()).await?;
    mqtt_client.subscribe(&topics::all_responses()).await?;
    mqtt_client.subscribe(&topics::all_scene_activations()).await?;
    mqtt_client.subscribe(&topics::core_mode_set()).await?;
    info!("MQTT connected and subscribed");

    // Event fabric: in-process router plus the MQTT push channel
    let router = Arc::new(EventRouter::new(Duration::from_millis(
        config.timing.handler_budget_ms,
    )));
    router.register_handler(Arc::new(LoggingEventHandler));
    let publisher: Arc<dyn EventPublisher> = Arc::new(CompositeEventPublisher::new(vec![
        Arc::clone(&router) as Arc<dyn EventPublisher>,
        Arc::new(MqttEventPublisher::new(mqtt_client.clone())),
    ]));

    let tracker = Arc::new(AckTracker::new(
        config.command.pending_capacity,
        Duration::from_secs(config.timing.ack_timeout_secs),
        Duration::from_secs(config.timing.confirm_timeout_secs),
        Arc::clone(&publisher),
    ));
    let health = Arc::new(BridgeHealthRegistry::new(Arc::clone(&publisher)));
    let mode = Arc::new(HouseMode::new("home"));

    let processor = Arc::new(CommandProcessor::new(
        Arc::clone(&registry),
        Arc::clone(&resolver),
        Arc::new(CommandSchemaRegistry::with_builtins()),
        Arc::new(AllowAll),
        Arc::clone(&health),
        Arc::new(mqtt_client.clone()) as Arc<dyn BridgeTransport>,
        Arc::clone(&tracker),
    ));

    let scenes = Arc::new(SceneEngine::new(
        scene_store,
        processor,
        Arc::clone(&publisher),
        Arc::clone(&states),
        Arc::clone(&mode),
        Arc::new(NoSun),
    ));
    router.register_handler(Arc::new(SceneTriggerHandler::new(Arc::clone(&scenes))));

    // Background tasks. State intake goes through the composite
    // publisher so transitions reach both the handlers and the bus.
    let cancel = CancellationToken::new();
    let intake = spawn_state_intake(
        Arc::clone(&publisher),
        states.subscribe(),
        cancel.clone(),
    );
    let sweeper = tracker.spawn_sweeper(Duration::from_secs(1), cancel.clone());
    let snapshots = states.spawn_snapshot_task(
        Duration::from_secs(config.timing.snapshot_interval_secs),
        cancel.clone(),
    );

    mqtt_client
        .publish(
            &status_topic,
            &serde_json::json!({"status": "online", "hub_id": config.hub_id}).to_string(),
            true,
        )
        .await?;
    info!(hub_id = %config.hub_id, "Gridhub core running");

    let requested = ingest::request_full_state(registry.as_ref(), &mqtt_client).await;
    info!(bridges = requested, "Startup state sync requested");

    // Inbound dispatch until shutdown
    let ctx = IngestContext {
        states: Arc::clone(&states),
        tracker,
        health,
        scenes,
        mode,
        publisher,
    };
    let mut rx = mqtt_client.subscribe_messages();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            received = rx.recv() => match received {
                Ok(msg) => {
                    let (topic, pkid) = (msg.topic.clone(), msg.pkid);
                    ingest::process_message(&ctx, msg).await;
                    // Manual-ack mode: unacked messages are redelivered
                    if let Err(e) = mqtt_client.ack(&topic, pkid).await {
                        warn!(topic = %topic, "Failed to ack message: {}", e);
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Inbound dispatch lagged, messages skipped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    warn!("MQTT channel closed");
                    break;
                }
            }
        }
    }

    // Orderly teardown: stop tasks, flush a final snapshot, mark offline
    cancel.cancel();
    let _ = tokio::join!(intake, sweeper, snapshots);
    if let Err(e) = mqtt_client
        .publish(
            &status_topic,
            &serde_json::json!({"status": "offline"}).to_string(),
            true,
        )
        .await
    {
        warn!("Failed to publish offline status: {}", e);
    }
    info!("Gridhub core stopped");
    Ok(())
}
