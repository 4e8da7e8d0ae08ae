//! MQTT event loop driver and incoming message dispatcher.
//!
//! The rumqttc event loop runs in `drive`, which only classifies events
//! and forwards them over a bounded queue; `ConnectionManager::run`
//! consumes them one at a time, strictly in broker order. When the queue
//! is full `drive` stops polling, so backpressure reaches the broker
//! connection instead of piling up in memory. The processing side never
//! waits on the network task (channel publishes are enqueued without
//! blocking), so the two cannot deadlock.

use std::time::Duration;

use rumqttc::EventLoop;
use tokio::sync::mpsc::{self, Receiver, Sender};

use hsd_mqtt_channel::{Channel, ConnectReturnCode, QoS, SessionEvent, classify, classify_error};

use crate::announce::{AnnounceOutcome, AnnouncementProcessor};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::services::{ServiceCallFacade, ServiceRegistry};
use crate::status::StatusMonitor;

/// Back-off before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Session events buffered between `drive` and `ConnectionManager::run`.
pub const EVENT_QUEUE_CAPACITY: usize = 64;

/// Bounded queue connecting `drive` to `ConnectionManager::run`.
pub fn session_channel() -> (Sender<SessionEvent>, Receiver<SessionEvent>) {
    mpsc::channel(EVENT_QUEUE_CAPACITY)
}

/// Drive the MQTT event loop, forwarding session events to `events`.
///
/// Runs until the receiving side is dropped. rumqttc reconnects on the
/// next `poll()` after an error.
pub async fn drive(mut eventloop: EventLoop, events: Sender<SessionEvent>) {
    loop {
        let event = match eventloop.poll().await {
            Ok(event) => classify(&event),
            Err(e) => {
                match classify_error(&e) {
                    Some(refused) => {
                        if events.send(refused).await.is_err() {
                            return;
                        }
                    }
                    None => {
                        tracing::error!(error = %e, "MQTT event loop error, reconnecting in 5s");
                    }
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };

        if let Some(event) = event {
            if events.send(event).await.is_err() {
                tracing::warn!("session event receiver dropped, stopping MQTT event loop");
                return;
            }
        }
    }
}

/// Owns the session's subscriptions and routes inbound messages.
pub struct ConnectionManager<'a> {
    channel: &'a dyn Channel,
    announce_topic: String,
    status: Option<StatusMonitor>,
    processor: AnnouncementProcessor,
    services: ServiceRegistry,
}

impl<'a> ConnectionManager<'a> {
    pub fn new(
        channel: &'a dyn Channel,
        config: &BridgeConfig,
        processor: AnnouncementProcessor,
        services: ServiceRegistry,
    ) -> Self {
        let status = config
            .status_topic
            .as_deref()
            .map(|topic| StatusMonitor::new(topic, &config.announce_prefix));

        Self {
            channel,
            announce_topic: config.announce_topic(),
            status,
            processor,
            services,
        }
    }

    /// Topic filters subscribed on every successful connect.
    pub fn subscriptions(&self) -> Vec<&str> {
        let mut topics = vec![self.announce_topic.as_str()];
        if let Some(status) = &self.status {
            topics.push(status.status_topic());
        }
        topics
    }

    /// Consume session events until the stream ends.
    ///
    /// Only fatal errors (malformed overlay file) end the loop early.
    pub async fn run(&self, mut events: Receiver<SessionEvent>) -> BridgeResult<()> {
        tracing::info!("message dispatcher started");
        while let Some(event) = events.recv().await {
            self.dispatch(event).await?;
        }
        tracing::warn!("session event stream closed");
        Ok(())
    }

    /// Handle one session event.
    pub async fn dispatch(&self, event: SessionEvent) -> BridgeResult<()> {
        match event {
            SessionEvent::Connected(code) => {
                self.on_connect(code).await;
                Ok(())
            }
            SessionEvent::Message {
                topic,
                payload,
                qos,
                retain,
            } => {
                tracing::debug!(topic = %topic, qos = ?qos, retain, "message received");
                tracing::debug!(payload = %String::from_utf8_lossy(&payload), "message payload");
                self.on_message(&topic, &payload).await
            }
        }
    }

    async fn on_connect(&self, code: ConnectReturnCode) {
        if code != ConnectReturnCode::Success {
            tracing::error!(reason_code = ?code, "MQTT failed to connect");
            return;
        }

        tracing::info!("MQTT connected to broker");
        for topic in self.subscriptions() {
            tracing::info!(topic, "MQTT subscribe");
            if let Err(e) = self.channel.subscribe(topic, QoS::AtMostOnce).await {
                tracing::error!(topic, error = %e, "MQTT subscribe failed");
            }
        }
    }

    async fn on_message(&self, topic: &str, payload: &[u8]) -> BridgeResult<()> {
        let hass = ServiceCallFacade::new(&self.services, self.channel);

        if let Some(status) = self.status.as_ref().filter(|s| s.matches(topic)) {
            status
                .on_status(&String::from_utf8_lossy(payload), &hass)
                .await;
            return Ok(());
        }

        match self.processor.on_announcement(payload, &hass).await {
            Ok(AnnounceOutcome::Discovered) => {
                tracing::debug!(topic, "announcement processed");
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(BridgeError::Discovery(e)) => {
                tracing::error!(topic, error = %e, "discovery routine failed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
