//! Service-call facade emulating Home Assistant's `hass.services.call`.
//!
//! Discovery routines express every side effect as a generic
//! `(service, action, data)` call. The bridge executes the pairs that
//! have a registered `ServiceHandler` and logs everything else.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use hsd_mqtt_channel::{Channel, MqttError, QoS};
use hsd_protocol::{MQTT_SERVICE, PUBLISH_ACTION, ServiceCall};

/// Errors from executing a recognized service call.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid value for '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("publish to '{topic}' failed: {source}")]
    Publish {
        topic: String,
        #[source]
        source: MqttError,
    },
}

/// Executes one `(service, action)` pair against the bound connection.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    async fn handle(&self, data: &Map<String, Value>, channel: &dyn Channel)
    -> Result<(), ServiceError>;
}

// ── mqtt.publish ──────────────────────────────────────────────

/// Decoded `mqtt.publish` service data.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

impl PublishRequest {
    /// Decode service data. `topic` and `payload` are required; `qos`
    /// defaults to 0 and `retain` to false.
    pub fn from_data(data: &Map<String, Value>) -> Result<Self, ServiceError> {
        let topic = match data.get("topic") {
            Some(Value::String(topic)) if !topic.is_empty() => topic.clone(),
            None | Some(Value::Null) => return Err(ServiceError::MissingField("topic")),
            Some(other) => {
                return Err(ServiceError::InvalidField {
                    field: "topic",
                    reason: format!("expected a non-empty string, got {other}"),
                });
            }
        };

        // Non-string payloads are sent as their JSON encoding.
        let payload = match data.get("payload") {
            None | Some(Value::Null) => return Err(ServiceError::MissingField("payload")),
            Some(Value::String(text)) => text.clone().into_bytes(),
            Some(other) => other.to_string().into_bytes(),
        };

        let qos = match data.get("qos") {
            None | Some(Value::Null) => QoS::AtMostOnce,
            Some(value) => parse_qos(value)?,
        };

        let retain = match data.get("retain") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(retain)) => *retain,
            Some(other) => {
                return Err(ServiceError::InvalidField {
                    field: "retain",
                    reason: format!("expected a boolean, got {other}"),
                });
            }
        };

        Ok(Self {
            topic,
            payload,
            qos,
            retain,
        })
    }
}

fn parse_qos(value: &Value) -> Result<QoS, ServiceError> {
    let level = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    match level {
        Some(0) => Ok(QoS::AtMostOnce),
        Some(1) => Ok(QoS::AtLeastOnce),
        Some(2) => Ok(QoS::ExactlyOnce),
        _ => Err(ServiceError::InvalidField {
            field: "qos",
            reason: format!("expected 0, 1 or 2, got {value}"),
        }),
    }
}

/// Handler for `mqtt.publish`.
pub struct MqttPublishHandler;

#[async_trait]
impl ServiceHandler for MqttPublishHandler {
    async fn handle(
        &self,
        data: &Map<String, Value>,
        channel: &dyn Channel,
    ) -> Result<(), ServiceError> {
        let request = PublishRequest::from_data(data)?;
        channel
            .publish(&request.topic, &request.payload, request.qos, request.retain)
            .await
            .map_err(|source| ServiceError::Publish {
                topic: request.topic.clone(),
                source,
            })?;
        tracing::info!(
            topic = %request.topic,
            qos = ?request.qos,
            retain = request.retain,
            "published discovery"
        );
        Ok(())
    }
}

// ── Registry ──────────────────────────────────────────────────

/// Table of recognized `(service, action)` pairs.
pub struct ServiceRegistry {
    handlers: HashMap<(String, String), Box<dyn ServiceHandler>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with the handlers the bridge supports: `mqtt.publish`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(MQTT_SERVICE, PUBLISH_ACTION, Box::new(MqttPublishHandler));
        registry
    }

    /// Register (or replace) the handler for a pair.
    pub fn register(&mut self, service: &str, action: &str, handler: Box<dyn ServiceHandler>) {
        self.handlers
            .insert((service.to_string(), action.to_string()), handler);
    }

    pub fn lookup(&self, service: &str, action: &str) -> Option<&dyn ServiceHandler> {
        self.handlers
            .get(&(service.to_string(), action.to_string()))
            .map(|h| h.as_ref())
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ── Facade ────────────────────────────────────────────────────

/// What happened to a service call. Callers are free to ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// A handler ran successfully.
    Handled,
    /// A handler ran and failed; the failure was logged.
    Failed,
    /// No handler for the pair; logged at warn.
    Unhandled,
}

/// Per-message facade bound to the session's connection.
///
/// Never returns errors: failures are observability events.
pub struct ServiceCallFacade<'a> {
    registry: &'a ServiceRegistry,
    channel: &'a dyn Channel,
}

impl<'a> ServiceCallFacade<'a> {
    pub fn new(registry: &'a ServiceRegistry, channel: &'a dyn Channel) -> Self {
        Self { registry, channel }
    }

    pub async fn call(&self, service: &str, action: &str, data: &Map<String, Value>) -> CallOutcome {
        let Some(handler) = self.registry.lookup(service, action) else {
            tracing::warn!(service, action, "unhandled service/action pair");
            return CallOutcome::Unhandled;
        };

        match handler.handle(data, self.channel).await {
            Ok(()) => CallOutcome::Handled,
            Err(e) => {
                let topic = data.get("topic").and_then(Value::as_str).unwrap_or("");
                tracing::error!(service, action, topic, error = %e, "service call failed");
                CallOutcome::Failed
            }
        }
    }

    /// Execute a decoded `ServiceCall`.
    pub async fn dispatch(&self, call: &ServiceCall) -> CallOutcome {
        self.call(&call.service, &call.action, &call.data).await
    }
}
