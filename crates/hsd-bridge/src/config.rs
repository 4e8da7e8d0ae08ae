//! Bridge configuration, loadable from TOML and overridden by environment.

use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use hsd_mqtt_channel::MqttConfig;
use hsd_protocol::topics;

use crate::discovery::DiscoveryConfig;

/// Configuration errors. All of them abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("MQTT_BROKER must be defined")]
    MissingBroker,

    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: '{value}'")]
    InvalidValue { var: &'static str, value: String },
}

/// Top-level configuration for the bridge.
///
/// Immutable once loaded; threaded into components by reference.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// MQTT connection settings.
    #[serde(default)]
    pub mqtt: MqttConfig,
    /// Prefix Shelly devices announce under (`{prefix}/announce`).
    #[serde(default = "default_announce_prefix")]
    pub announce_prefix: String,
    /// Home Assistant discovery prefix, passed through to the discovery routine.
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,
    /// Home Assistant birth/last-will topic. None disables re-announce.
    #[serde(default)]
    pub status_topic: Option<String>,
    /// Optional YAML overlay merged over every descriptor.
    #[serde(default = "default_device_config_file")]
    pub device_config_file: PathBuf,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

fn default_announce_prefix() -> String {
    topics::DEFAULT_ANNOUNCE_PREFIX.to_string()
}

fn default_discovery_prefix() -> String {
    topics::DEFAULT_DISCOVERY_PREFIX.to_string()
}

fn default_device_config_file() -> PathBuf {
    PathBuf::from("/config/device-config.yml")
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig::default(),
            announce_prefix: default_announce_prefix(),
            discovery_prefix: default_discovery_prefix(),
            status_topic: None,
            device_config_file: default_device_config_file(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Load config from the process environment.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        Self::from_lookup(path, |key| std::env::var(key).ok())
    }

    /// Load config: TOML file (if given) or defaults, then overrides from
    /// `lookup`, then validation.
    pub fn from_lookup<F>(path: Option<&str>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = base.with_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a TOML file path.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// Apply environment-style overrides from `lookup`.
    ///
    /// Empty values count as unset, except `MQTT_BROKER` where an empty
    /// value clears the broker (and fails validation).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(broker) = lookup("MQTT_BROKER") {
            self.mqtt.broker_host = broker.trim().to_string();
        }
        if let Some(port) = var("MQTT_PORT") {
            self.mqtt.broker_port = parse_var("MQTT_PORT", &port)?;
        }
        if let Some(client_id) = var("MQTT_CLIENT_ID") {
            self.mqtt.client_id = client_id;
        }
        if let Some(username) = var("MQTT_USERNAME") {
            self.mqtt.username = Some(username);
        }
        if let Some(password) = var("MQTT_PASSWORD") {
            self.mqtt.password = Some(password);
        }
        if let Some(use_tls) = var("MQTT_USE_TLS") {
            self.mqtt.use_tls = Some(parse_bool("MQTT_USE_TLS", &use_tls)?);
        }
        if let Some(ca) = var("MQTT_CA_CERT") {
            self.mqtt.ca_cert_path = ca;
        }
        if let Some(cert) = var("MQTT_CLIENT_CERT") {
            self.mqtt.client_cert_path = Some(cert);
        }
        if let Some(key) = var("MQTT_CLIENT_KEY") {
            self.mqtt.client_key_path = Some(key);
        }
        if let Some(keepalive) = var("MQTT_KEEPALIVE") {
            self.mqtt.keepalive_secs = parse_var("MQTT_KEEPALIVE", &keepalive)?;
        }
        if let Some(prefix) = var("SHELLEY_ANNOUNCE_MQTT_PREFIX") {
            self.announce_prefix = prefix;
        }
        if let Some(prefix) = var("HA_DISCOVERY_PREFIX") {
            self.discovery_prefix = prefix;
        }
        if let Some(topic) = var("HA_STATUS_TOPIC") {
            self.status_topic = Some(topic);
        }
        if let Some(path) = var("DEVICE_CONFIG_FILE") {
            self.device_config_file = PathBuf::from(path);
        }
        if let Some(command) = var("DISCOVERY_COMMAND") {
            self.discovery.command = command;
        }
        if let Some(timeout) = var("DISCOVERY_TIMEOUT") {
            self.discovery.timeout_secs = parse_var("DISCOVERY_TIMEOUT", &timeout)?;
        }
        if let Some(dry_run) = var("DISCOVERY_DRY_RUN") {
            self.discovery.dry_run = parse_bool("DISCOVERY_DRY_RUN", &dry_run)?;
        }

        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.broker_host.trim().is_empty() {
            return Err(ConfigError::MissingBroker);
        }
        Ok(())
    }

    pub fn announce_topic(&self) -> String {
        topics::announce(&self.announce_prefix)
    }
}

fn parse_var<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
    })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: value.to_string(),
        }),
    }
}
