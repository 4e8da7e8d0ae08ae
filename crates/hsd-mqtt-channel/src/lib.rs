//! MQTT transport for the Shelly discovery bridge.
//!
//! Provides a narrow MQTT abstraction over `rumqttc`:
//! - `Channel` trait for publish/subscribe (mockable in tests)
//! - `MqttChannel` with optional TLS and credentials for production
//! - `MockChannel` for testing without a broker
//! - `SessionEvent` classification of raw event loop output

pub mod channel;
pub mod config;
pub mod error;
pub mod handler;
pub mod mock;
pub mod tls;

// Re-exports for convenience.
pub use channel::{Channel, MqttChannel};
pub use config::MqttConfig;
pub use error::{MqttError, MqttResult};
pub use handler::{SessionEvent, classify, classify_error};
pub use mock::{MockChannel, PublishedMessage};
pub use rumqttc::{ConnectReturnCode, QoS};
