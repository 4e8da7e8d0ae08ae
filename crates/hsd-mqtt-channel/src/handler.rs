//! Classification of raw event loop output.
//!
//! Reduces rumqttc's `Event` / `ConnectionError` stream to the two things
//! the bridge reacts to: connection acknowledgements and inbound publishes.

use rumqttc::{ConnectReturnCode, ConnectionError, Event, Packet, QoS};

/// A session-level event forwarded from the network task to the processor.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// CONNACK received (or connection refused) with the broker's code.
    Connected(ConnectReturnCode),
    /// Inbound publish.
    Message {
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    },
}

impl SessionEvent {
    pub fn message(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self::Message {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retain: false,
        }
    }
}

/// Classify an event loop event. Returns `None` for protocol noise
/// (PINGRESP, SUBACK, outgoing packets, ...).
pub fn classify(event: &Event) -> Option<SessionEvent> {
    match event {
        Event::Incoming(Packet::ConnAck(ack)) => Some(SessionEvent::Connected(ack.code)),
        Event::Incoming(Packet::Publish(publish)) => Some(SessionEvent::Message {
            topic: publish.topic.clone(),
            payload: publish.payload.to_vec(),
            qos: publish.qos,
            retain: publish.retain,
        }),
        _ => None,
    }
}

/// rumqttc reports a refused CONNACK as an error rather than an event.
pub fn classify_error(error: &ConnectionError) -> Option<SessionEvent> {
    match error {
        ConnectionError::ConnectionRefused(code) => Some(SessionEvent::Connected(*code)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, Outgoing, Publish};

    #[test]
    fn classify_publish() {
        let mut publish = Publish::new("shellies/announce", QoS::AtLeastOnce, b"{}".to_vec());
        publish.retain = true;
        let event = Event::Incoming(Packet::Publish(publish));
        assert_eq!(
            classify(&event),
            Some(SessionEvent::Message {
                topic: "shellies/announce".into(),
                payload: b"{}".to_vec(),
                qos: QoS::AtLeastOnce,
                retain: true,
            })
        );
    }

    #[test]
    fn classify_connack() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::Success,
            false,
        )));
        assert_eq!(
            classify(&event),
            Some(SessionEvent::Connected(ConnectReturnCode::Success))
        );
    }

    #[test]
    fn classify_noise_is_none() {
        assert!(classify(&Event::Incoming(Packet::PingResp)).is_none());
        assert!(classify(&Event::Outgoing(Outgoing::PingReq)).is_none());
    }

    #[test]
    fn refused_connection_becomes_connected_event() {
        let err = ConnectionError::ConnectionRefused(ConnectReturnCode::NotAuthorized);
        assert_eq!(
            classify_error(&err),
            Some(SessionEvent::Connected(ConnectReturnCode::NotAuthorized))
        );
    }

    #[test]
    fn transport_errors_are_not_classified() {
        let err = ConnectionError::RequestsDone;
        assert!(classify_error(&err).is_none());
    }
}
