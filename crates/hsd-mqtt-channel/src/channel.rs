//! Async MQTT client for broker communication.
//!
//! Wraps `rumqttc::AsyncClient` behind the `Channel` trait so the bridge
//! logic can be exercised against `MockChannel` in tests.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};

use crate::config::MqttConfig;
use crate::error::{MqttError, MqttResult};
use crate::tls;

/// Capacity of the request queue between `AsyncClient` and `EventLoop`.
/// Sized for the discovery burst of a multi-channel device.
const REQUEST_CAPACITY: usize = 256;

/// Largest packet accepted or sent. Discovery configs for multi-channel
/// devices run well past rumqttc's 10 KB default.
const MAX_PACKET_SIZE: usize = 256 * 1024;

// ── Channel trait ─────────────────────────────────────────────

/// Abstraction for MQTT message publishing and subscribing.
///
/// Enables mocking in tests without a real MQTT broker.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Publish a raw payload to a topic.
    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool)
    -> MqttResult<()>;

    /// Subscribe to a topic filter.
    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()>;
}

// ── MqttChannel ───────────────────────────────────────────────

/// MQTT channel connected to the broker.
///
/// Owns the `AsyncClient` for publishing/subscribing. The `EventLoop`
/// is returned separately from `new()`; the caller must drive it via
/// `eventloop.poll()` for any request to reach the network.
#[derive(Clone)]
pub struct MqttChannel {
    client: AsyncClient,
}

impl MqttChannel {
    /// Create a new MQTT channel.
    ///
    /// TLS is enabled according to `MqttConfig::tls_enabled`; credentials
    /// are applied when both username and password are set.
    pub fn new(config: &MqttConfig) -> MqttResult<(Self, EventLoop)> {
        if config.broker_host.trim().is_empty() {
            return Err(MqttError::Connection("no broker address configured".into()));
        }

        let mut options =
            MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        options.set_keep_alive(Duration::from_secs(config.keepalive_secs.into()));
        options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);

        if let Some((username, password)) = config.credentials() {
            tracing::info!(username, "MQTT authentication enabled");
            options.set_credentials(username, password);
        }

        if config.tls_enabled() {
            tracing::info!("MQTT TLS enabled");
            options.set_transport(tls::load_tls_transport(config)?);
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        Ok((Self { client }, eventloop))
    }
}

/// Requests are enqueued without waiting: a full request queue is reported
/// as an error rather than parking the caller until the event loop drains it.
#[async_trait]
impl Channel for MqttChannel {
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> MqttResult<()> {
        self.client
            .try_publish(topic, qos, retain, payload)
            .map_err(|e| MqttError::Publish(e.to_string()))
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()> {
        self.client
            .try_subscribe(filter, qos)
            .map_err(|e| MqttError::Subscribe(e.to_string()))
    }
}
