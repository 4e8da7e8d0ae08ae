//! Home Assistant presence tracking.
//!
//! When Home Assistant (re)starts it publishes `online` on its status
//! topic and forgets non-retained state, so every device is asked to
//! announce itself again.

use hsd_protocol::{ServiceCall, topics};

use crate::services::ServiceCallFacade;

/// QoS used for the broadcast announce command.
const ANNOUNCE_QOS: u8 = 2;

pub struct StatusMonitor {
    status_topic: String,
    command_topic: String,
}

impl StatusMonitor {
    pub fn new(status_topic: impl Into<String>, announce_prefix: &str) -> Self {
        Self {
            status_topic: status_topic.into(),
            command_topic: topics::command(announce_prefix),
        }
    }

    pub fn status_topic(&self) -> &str {
        &self.status_topic
    }

    pub fn command_topic(&self) -> &str {
        &self.command_topic
    }

    /// Exact topic match; wildcards are not interpreted.
    pub fn matches(&self, topic: &str) -> bool {
        topic == self.status_topic
    }

    /// Handle a status payload. Returns whether an announce was requested.
    pub async fn on_status(&self, payload: &str, hass: &ServiceCallFacade<'_>) -> bool {
        if payload != topics::STATUS_ONLINE {
            tracing::debug!(status = payload, "Home Assistant status change ignored");
            return false;
        }

        tracing::info!(
            topic = %self.command_topic,
            "Home Assistant is online, asking devices to announce"
        );
        let call = ServiceCall::mqtt_publish(
            &self.command_topic,
            topics::ANNOUNCE_COMMAND,
            ANNOUNCE_QOS,
            false,
        );
        hass.dispatch(&call).await;
        true
    }
}
