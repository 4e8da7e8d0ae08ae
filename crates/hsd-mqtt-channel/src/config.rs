use serde::Deserialize;

/// Port that implies a TLS connection when `use_tls` is not set explicitly.
pub const SECURE_PORT: u16 = 8883;

/// MQTT connection configuration, loadable from TOML or environment.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// MQTT broker hostname.
    #[serde(default = "default_host")]
    pub broker_host: String,
    /// MQTT broker port (default 8883 for TLS).
    #[serde(default = "default_port")]
    pub broker_port: u16,
    /// MQTT client ID.
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Force TLS on or off. When unset, TLS is used iff the port is 8883.
    #[serde(default)]
    pub use_tls: Option<bool>,
    /// PEM bundle of trusted CA certificates.
    #[serde(default = "default_ca_cert_path")]
    pub ca_cert_path: String,
    /// Path to a client certificate (PEM), for brokers requiring mTLS.
    #[serde(default)]
    pub client_cert_path: Option<String>,
    /// Path to the client private key (PEM).
    #[serde(default)]
    pub client_key_path: Option<String>,
    /// Keep-alive interval in seconds.
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u16,
}

impl MqttConfig {
    pub fn tls_enabled(&self) -> bool {
        self.use_tls.unwrap_or(self.broker_port == SECURE_PORT)
    }

    /// Username/password pair, only when both halves are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: default_host(),
            broker_port: default_port(),
            client_id: default_client_id(),
            username: None,
            password: None,
            use_tls: None,
            ca_cert_path: default_ca_cert_path(),
            client_cert_path: None,
            client_key_path: None,
            keepalive_secs: default_keepalive(),
        }
    }
}

fn default_host() -> String {
    "mqtt".to_string()
}

fn default_port() -> u16 {
    SECURE_PORT
}

fn default_client_id() -> String {
    "ha-shellies-discovery".to_string()
}

fn default_ca_cert_path() -> String {
    "/etc/ssl/certs/ca-certificates.crt".to_string()
}

fn default_keepalive() -> u16 {
    60
}
