//! Bridge-level error type.

use thiserror::Error;

use crate::discovery::DiscoveryError;
use crate::overlay::OverlayError;

/// Errors surfaced by the message pipeline.
///
/// Per-message problems (bad payloads, failed publishes) never show up
/// here; they are logged where they happen. Startup failures (config,
/// MQTT client construction) are reported by the binary directly.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Overlay(#[from] OverlayError),

    #[error("discovery routine failed: {0}")]
    Discovery(#[from] DiscoveryError),
}

/// Convenience alias for bridge results.
pub type BridgeResult<T> = Result<T, BridgeError>;
