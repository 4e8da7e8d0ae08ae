//! Shelly discovery bridge library.
//!
//! Turns Shelly gen-1 `announce` messages into Home Assistant MQTT
//! discovery by handing a normalized device descriptor to a pluggable
//! discovery routine. Re-exports all modules so external crates
//! (e.g. `hsd-e2e-tests`) can drive the pipeline over a `MockChannel`.

pub mod announce;
pub mod config;
pub mod discovery;
pub mod error;
pub mod mock;
pub mod mqtt_loop;
pub mod overlay;
pub mod services;
pub mod status;

#[cfg(test)]
mod test_log;
