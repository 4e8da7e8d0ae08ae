//! MQTT topic builders for the Shelly gen-1 topic hierarchy.
//!
//! Topic structure:
//! ```text
//! {announce_prefix}/announce   devices -> bridge (device self-description)
//! {announce_prefix}/command    bridge -> devices ("announce" broadcast)
//! ```
//!
//! The Home Assistant status topic is configured verbatim
//! (typically `homeassistant/status`) and has no builder.

/// Default prefix Shelly gen-1 devices publish under.
pub const DEFAULT_ANNOUNCE_PREFIX: &str = "shellies";

/// Default Home Assistant MQTT discovery prefix.
pub const DEFAULT_DISCOVERY_PREFIX: &str = "homeassistant";

/// Body of the broadcast command asking every device to re-announce.
pub const ANNOUNCE_COMMAND: &str = "announce";

/// Platform status payload that triggers a re-announce.
pub const STATUS_ONLINE: &str = "online";

pub fn announce(prefix: &str) -> String {
    format!("{prefix}/announce")
}

pub fn command(prefix: &str) -> String {
    format!("{prefix}/command")
}
