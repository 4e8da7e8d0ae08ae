//! In-memory broker stand-in.
//!
//! `MockChannel` keeps every publish and subscribe it receives so tests can
//! assert on what the bridge would have sent, and can be told to reject
//! publishes to exercise the logged-not-raised failure path.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rumqttc::QoS;

use crate::channel::Channel;
use crate::error::{MqttError, MqttResult};

/// One publish as seen by the broker.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

impl PublishedMessage {
    /// Payload decoded as UTF-8 (lossy).
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[derive(Default)]
struct Recorded {
    published: Vec<PublishedMessage>,
    subscriptions: Vec<(String, QoS)>,
    reject_publishes: bool,
}

#[derive(Default)]
pub struct MockChannel {
    state: Mutex<Recorded>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, Recorded> {
        self.state.lock().unwrap()
    }

    /// Reject subsequent publishes the way a full request queue would.
    pub fn fail_publishes(&self, fail: bool) {
        self.state().reject_publishes = fail;
    }

    /// Every accepted publish, oldest first.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state().published.clone()
    }

    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.state()
            .published
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    pub fn last_published(&self) -> Option<PublishedMessage> {
        self.state().published.last().cloned()
    }

    /// Every subscribe call with its QoS, including repeats after reconnects.
    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.state().subscriptions.clone()
    }

    pub fn is_subscribed_to(&self, filter: &str) -> bool {
        self.state().subscriptions.iter().any(|(f, _)| f == filter)
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> MqttResult<()> {
        let mut state = self.state();
        if state.reject_publishes {
            return Err(MqttError::Publish("request queue full".into()));
        }
        state.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
            retain,
        });
        Ok(())
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()> {
        self.state().subscriptions.push((filter.to_string(), qos));
        Ok(())
    }
}
