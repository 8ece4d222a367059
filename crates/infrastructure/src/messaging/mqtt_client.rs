use anyhow::{Result, anyhow};
use rumqttc::{AsyncClient, Event, LastWill, MqttOptions, Packet, QoS};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task;
use tracing::{error, info};

/// Delivery guarantee requested for a publish, kept independent of the
/// underlying MQTT library so callers never import it directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl From<Qos> for QoS {
    fn from(qos: Qos) -> Self {
        match qos {
            Qos::AtMostOnce => QoS::AtMostOnce,
            Qos::AtLeastOnce => QoS::AtLeastOnce,
            Qos::ExactlyOnce => QoS::ExactlyOnce,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub pkid: u16,
}

/// Publishing seam between the coordination core and the message bus.
#[async_trait::async_trait]
pub trait BridgeTransport: Send + Sync {
    async fn publish_bytes(
        &self,
        topic: &str,
        payload: &[u8],
        qos: Qos,
        retain: bool,
    ) -> Result<()>;
    fn is_connected(&self) -> bool;
}

/// A last-will registration: topic and payload the broker publishes on our
/// behalf when the connection drops without a clean disconnect.
#[derive(Clone, Debug)]
pub struct WillSpec {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

#[derive(Clone)]
pub struct MqttClient {
    client: AsyncClient,
    tx: broadcast::Sender<MqttMessage>,
    connected: Arc<AtomicBool>,
    subscriptions: Arc<std::sync::RwLock<Vec<String>>>,
}

impl MqttClient {
    pub async fn new(
        host: &str,
        port: u16,
        client_id: &str,
        last_will: Option<WillSpec>,
    ) -> Result<Self> {
        let mut mqttoptions = MqttOptions::new(client_id, host, port);
        mqttoptions.set_keep_alive(Duration::from_secs(20));
        mqttoptions.set_clean_session(false); // Persistent session so acks survive reconnects
        mqttoptions.set_manual_acks(true);

        if let Some(will) = last_will {
            mqttoptions.set_last_will(LastWill::new(
                will.topic,
                will.payload,
                QoS::AtLeastOnce,
                will.retain,
            ));
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
        let (tx, _) = broadcast::channel(250);
        let tx_clone = tx.clone();
        let connected = Arc::new(AtomicBool::new(false));
        let connected_clone = connected.clone();

        let subscriptions = Arc::new(std::sync::RwLock::new(Vec::new()));
        let subscriptions_clone = subscriptions.clone();
        let client_clone = client.clone();

        // Drive the event loop for the lifetime of the process
        task::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(notification) => match notification {
                        Event::Incoming(Packet::Publish(publish)) => {
                            let msg = MqttMessage {
                                topic: publish.topic,
                                payload: publish.payload.to_vec(),
                                pkid: publish.pkid,
                            };
                            if let Err(tokio::sync::broadcast::error::SendError(returned_msg)) =
                                tx_clone.send(msg)
                            {
                                // No internal subscribers yet (startup ordering).
                                // Silent for state traffic, which is retained and
                                // replayed anyway; a lost ack can strand a command.
                                if returned_msg.topic.contains("/ack/") {
                                    tracing::warn!(
                                        "Dropped ack on '{}': no internal subscribers listening yet",
                                        returned_msg.topic
                                    );
                                }
                            }
                        }
                        Event::Incoming(Packet::ConnAck(_)) => {
                            info!("MQTT connected");
                            connected_clone.store(true, Ordering::Relaxed);

                            // Re-subscribe to all topics
                            let subs = subscriptions_clone.read().unwrap().clone();
                            if !subs.is_empty() {
                                info!("Re-subscribing to {} topics...", subs.len());
                                for topic in subs {
                                    if let Err(e) =
                                        client_clone.subscribe(&topic, QoS::AtLeastOnce).await
                                    {
                                        error!("Failed to re-subscribe to {}: {}", topic, e);
                                    }
                                }
                            }
                        }
                        Event::Outgoing(rumqttc::Outgoing::Disconnect) => {
                            connected_clone.store(false, Ordering::Relaxed);
                        }
                        _ => {}
                    },
                    Err(e) => {
                        error!("MQTT connection error: {:?}", e);
                        connected_clone.store(false, Ordering::Relaxed);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok(Self {
            client,
            tx,
            connected,
            subscriptions,
        })
    }

    pub fn subscribe_messages(&self) -> broadcast::Receiver<MqttMessage> {
        self.tx.subscribe()
    }

    pub async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<()> {
        self.publish_bytes(topic, payload.as_bytes(), Qos::AtLeastOnce, retain)
            .await
    }

    pub async fn subscribe(&self, topic: &str) -> Result<()> {
        {
            let mut subs = self.subscriptions.write().unwrap();
            if !subs.contains(&topic.to_string()) {
                subs.push(topic.to_string());
            }
        }

        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| anyhow!("Failed to subscribe to topic {}: {}", topic, e))?;
        Ok(())
    }

    pub async fn ack(&self, topic: &str, pkid: u16) -> Result<()> {
        let publish = rumqttc::Publish {
            pkid,
            topic: topic.to_string(),
            qos: QoS::AtLeastOnce,
            payload: bytes::Bytes::new(),
            retain: false,
            dup: false,
        };

        self.client
            .ack(&publish)
            .await
            .map_err(|e| anyhow!("Failed to ack packet {}: {}", pkid, e))
    }
}

#[async_trait::async_trait]
impl BridgeTransport for MqttClient {
    async fn publish_bytes(
        &self,
        topic: &str,
        payload: &[u8],
        qos: Qos,
        retain: bool,
    ) -> Result<()> {
        self.client
            .publish(topic, qos.into(), retain, payload)
            .await
            .map_err(|e| anyhow!("Failed to publish MQTT message: {}", e))?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}
