//! TLS transport for broker connections.
//!
//! Loads the CA bundle and, when configured, a client certificate/key
//! pair from PEM files and configures rumqttc's TLS transport.

use rumqttc::{TlsConfiguration, Transport};

use crate::config::MqttConfig;
use crate::error::{MqttError, MqttResult};

/// Build a TLS transport from the file paths in the config.
///
/// Client authentication is only enabled when both the certificate and
/// the key path are set.
pub fn load_tls_transport(config: &MqttConfig) -> MqttResult<Transport> {
    let ca = read_pem(&config.ca_cert_path, "CA bundle")?;

    let client_auth = match (&config.client_cert_path, &config.client_key_path) {
        (Some(cert), Some(key)) => Some((
            read_pem(cert, "client cert")?,
            read_pem(key, "client key")?,
        )),
        _ => None,
    };

    Ok(Transport::tls_with_config(TlsConfiguration::Simple {
        ca,
        alpn: None,
        client_auth,
    }))
}

fn read_pem(path: &str, what: &str) -> MqttResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| MqttError::Tls(format!("failed to read {what} '{path}': {e}")))
}
