use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Merged key/value mapping handed to a discovery routine.
pub type DiscoveryData = Map<String, Value>;

/// Devices reporting this generation are skipped by the bridge.
///
/// Some gen-2 firmware still publishes gen-1 shaped announcements on the
/// legacy topic; those devices are discovered through their own RPC channel.
pub const SKIPPED_GENERATION: u64 = 2;

/// Self-announcement published by a device on `{prefix}/announce`.
///
/// Kept as the raw JSON object: every field is optional and forwarded with
/// whatever JSON type the firmware used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceAnnouncement {
    fields: Map<String, Value>,
}

impl DeviceAnnouncement {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Raw value of `key`, if present.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Device id when it is a string (used for logging).
    pub fn id(&self) -> Option<&str> {
        self.get("id").and_then(Value::as_str)
    }

    pub fn model(&self) -> Option<&str> {
        self.get("model").and_then(Value::as_str)
    }

    /// Whether `gen` is numerically equal to 2 (`2` and `2.0` both count).
    /// Absent, null and non-numeric values are treated as gen 1.
    pub fn is_skipped_generation(&self) -> bool {
        self.get("gen").and_then(Value::as_f64) == Some(SKIPPED_GENERATION as f64)
    }
}

/// Device descriptor in the shape the discovery routine expects.
///
/// Device fields are carried through as raw JSON values; absent fields
/// become `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDescriptor {
    pub id: Value,
    pub mac: Value,
    pub fw_ver: Value,
    pub model: Value,
    /// Device mode (e.g. "relay" / "roller"); empty string when not announced.
    pub mode: Value,
    /// Device IP address, taken from the announcement's `ip`.
    pub host: Value,
    /// Home Assistant discovery prefix (process configuration, not device data).
    pub discovery_prefix: String,
}

impl NormalizedDescriptor {
    pub fn from_announcement(
        announcement: &DeviceAnnouncement,
        discovery_prefix: impl Into<String>,
    ) -> Self {
        let field = |key: &str| announcement.get(key).cloned().unwrap_or(Value::Null);

        Self {
            id: field("id"),
            mac: field("mac"),
            fw_ver: field("fw_ver"),
            model: field("model"),
            mode: announcement
                .get("mode")
                .cloned()
                .unwrap_or_else(|| Value::String(String::new())),
            host: field("ip"),
            discovery_prefix: discovery_prefix.into(),
        }
    }

    /// Flatten into a mapping.
    pub fn into_map(self) -> DiscoveryData {
        let mut map = Map::new();
        map.insert("id".into(), self.id);
        map.insert("mac".into(), self.mac);
        map.insert("fw_ver".into(), self.fw_ver);
        map.insert("model".into(), self.model);
        map.insert("mode".into(), self.mode);
        map.insert("host".into(), self.host);
        map.insert(
            "discovery_prefix".into(),
            Value::String(self.discovery_prefix),
        );
        map
    }
}
