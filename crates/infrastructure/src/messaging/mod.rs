pub mod composite_publisher;
pub mod mqtt_client;
pub mod mqtt_publisher;
pub mod topics;

pub use composite_publisher::CompositeEventPublisher;
pub use mqtt_client::{BridgeTransport, MqttClient, MqttMessage, Qos, WillSpec};
pub use mqtt_publisher::MqttEventPublisher;
