//! Infrastructure layer - External integrations

pub mod config;
pub mod messaging;
pub mod storage;

pub use config::HubConfig;
pub use messaging::composite_publisher::CompositeEventPublisher;
pub use messaging::mqtt_client::{BridgeTransport, MqttClient, MqttMessage, Qos, WillSpec};
pub use messaging::mqtt_publisher::MqttEventPublisher;
pub use messaging::topics;
pub use storage::memory::{
    MemoryAssociationStore, MemoryDeviceStore, MemoryHistoryStore, MemorySceneStore,
    MemoryStateStore,
};
pub use storage::sqlite::{
    SqliteAssociationStore, SqliteDeviceStore, SqliteHistoryStore, SqliteSceneStore,
    SqliteStateStore, connect, init_schema,
};
