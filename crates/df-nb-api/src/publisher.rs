//! Update publishers.
//!
//! After a lifecycle write commits, the API publishes one [`DbUpdate`] per
//! event. Delivery failures are reported to the caller of `publish` but never
//! undo the write.

use df_nb_proto::{DbUpdate, TopicScheme};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, QoS};
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use url::Url;

/// Sink for model update notifications.
pub trait UpdatePublisher: Send + Sync {
    /// Publish one update.
    fn publish(&self, update: &DbUpdate) -> impl Future<Output = Result<(), PublishError>> + Send;
}

/// In-process publisher fanning updates out to subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<DbUpdate>,
}

impl BroadcastPublisher {
    /// Create a publisher buffering up to `capacity` updates per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to updates published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DbUpdate> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl UpdatePublisher for BroadcastPublisher {
    async fn publish(&self, update: &DbUpdate) -> Result<(), PublishError> {
        // Sending with no receivers errors; that is zero deliveries, not a failure.
        let receivers = self.tx.send(update.clone()).unwrap_or(0);
        tracing::trace!(table = %update.table, id = %update.id, receivers, "Broadcast update");
        Ok(())
    }
}

/// Publisher sending CBOR-encoded updates to an MQTT broker.
pub struct MqttPublisher {
    client: AsyncClient,
    topic_scheme: TopicScheme,
}

impl MqttPublisher {
    /// Create a new MQTT publisher.
    ///
    /// The returned event loop must be polled (see [`spawn_eventloop`]) for
    /// publishes to reach the broker.
    ///
    /// # Errors
    ///
    /// Returns error if the broker URL is invalid.
    pub fn new(
        mqtt_broker: &str,
        client_id: &str,
        topic_scheme: TopicScheme,
    ) -> Result<(Self, EventLoop), PublishError> {
        let (host, port) = parse_mqtt_url(mqtt_broker)?;

        let mut mqtt_options = MqttOptions::new(client_id, host, port);
        mqtt_options.set_keep_alive(Duration::from_secs(30));

        let (client, eventloop) = AsyncClient::new(mqtt_options, 100);

        Ok((
            Self {
                client,
                topic_scheme,
            },
            eventloop,
        ))
    }

    /// Topic scheme used for publishing.
    #[must_use]
    pub fn topic_scheme(&self) -> &TopicScheme {
        &self.topic_scheme
    }
}

impl UpdatePublisher for MqttPublisher {
    async fn publish(&self, update: &DbUpdate) -> Result<(), PublishError> {
        let topic = self
            .topic_scheme
            .table(update.topic.as_deref(), &update.table);
        let payload = update
            .to_cbor()
            .map_err(|e| PublishError::Serialize(e.to_string()))?;

        tracing::debug!(topic, payload_len = payload.len(), action = %update.action, "Publishing update");

        self.client
            .publish(&topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| PublishError::Publish(e.to_string()))?;

        Ok(())
    }
}

/// Drive an MQTT event loop in the background, reconnecting after errors.
pub fn spawn_eventloop(mut eventloop: EventLoop) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(rumqttc::Packet::ConnAck(_))) => {
                    tracing::info!("Connected to MQTT broker");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "MQTT error");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    })
}

/// Parse MQTT URL into host and port.
fn parse_mqtt_url(input: &str) -> Result<(String, u16), PublishError> {
    if input.contains("://") {
        let url = Url::parse(input)
            .map_err(|e| PublishError::InvalidBrokerUrl(format!("{input}: {e}")))?;

        match url.scheme() {
            "tcp" | "mqtt" => {}
            scheme => {
                return Err(PublishError::InvalidBrokerUrl(format!(
                    "{input}: unsupported scheme '{scheme}'"
                )));
            }
        }

        let host = url
            .host_str()
            .ok_or_else(|| PublishError::InvalidBrokerUrl(format!("{input}: missing host")))?;
        let port = url.port().unwrap_or(1883);

        return Ok((host.to_string(), port));
    }

    let mut parts = input.split(':');
    let host = parts
        .next()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| PublishError::InvalidBrokerUrl(format!("{input}: missing host")))?;
    let port = match parts.next() {
        None => 1883,
        Some(port) => port.parse().map_err(|_| {
            PublishError::InvalidBrokerUrl(format!("{input}: invalid port '{port}'"))
        })?,
    };
    if parts.next().is_some() {
        return Err(PublishError::InvalidBrokerUrl(format!(
            "{input}: too many ':' separators"
        )));
    }

    Ok((host.to_string(), port))
}

/// Errors for publish operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PublishError {
    /// Invalid MQTT broker URL
    #[error("invalid MQTT broker URL: {0}")]
    InvalidBrokerUrl(String),
    /// Publish failed
    #[error("publish error: {0}")]
    Publish(String),
    /// Serialization failed
    #[error("serialize error: {0}")]
    Serialize(String),
}
