//! Generic `(service, action, data)` requests, as issued by discovery routines.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The only service call the bridge knows how to execute.
pub const MQTT_SERVICE: &str = "mqtt";
pub const PUBLISH_ACTION: &str = "publish";

/// One service call, serialized as a single JSON object per line when
/// exchanged with an external discovery process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    pub service: String,
    pub action: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl ServiceCall {
    /// Build an `mqtt.publish` call.
    pub fn mqtt_publish(topic: &str, payload: &str, qos: u8, retain: bool) -> Self {
        let mut data = Map::new();
        data.insert("topic".into(), Value::from(topic));
        data.insert("payload".into(), Value::from(payload));
        data.insert("qos".into(), Value::from(qos));
        data.insert("retain".into(), Value::from(retain));
        Self {
            service: MQTT_SERVICE.into(),
            action: PUBLISH_ACTION.into(),
            data,
        }
    }
}
