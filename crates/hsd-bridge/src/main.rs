//! Shelly discovery bridge: announces Shelly gen-1 devices to Home
//! Assistant via MQTT discovery.
//!
//! Wires the MQTT connection, the overlay loader and the configured
//! discovery routine into a single long-running process.

use tracing_subscriber::EnvFilter;

use hsd_bridge::announce::AnnouncementProcessor;
use hsd_bridge::config::BridgeConfig;
use hsd_bridge::discovery;
use hsd_bridge::mqtt_loop::{self, ConnectionManager};
use hsd_bridge::overlay::OverlayLoader;
use hsd_bridge::services::ServiceRegistry;
use hsd_mqtt_channel::MqttChannel;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "hsd-bridge starting");
    tracing::debug!("debug logging enabled");

    // ── Load config ─────────────────────────────────────────────
    let config_path = std::env::args().nth(1);
    let config = BridgeConfig::load(config_path.as_deref())?;
    tracing::info!(
        announce_topic = %config.announce_topic(),
        discovery_prefix = %config.discovery_prefix,
        status_topic = ?config.status_topic,
        overlay = %config.device_config_file.display(),
        "config loaded"
    );

    // ── Discovery routine ───────────────────────────────────────
    let routine = discovery::from_config(&config.discovery)?;
    let processor = AnnouncementProcessor::new(
        config.discovery_prefix.as_str(),
        OverlayLoader::new(&config.device_config_file),
        routine,
    );

    // ── MQTT channel ────────────────────────────────────────────
    let (channel, eventloop) = MqttChannel::new(&config.mqtt)?;
    tracing::info!(
        broker = %config.mqtt.broker_host,
        port = config.mqtt.broker_port,
        client_id = %config.mqtt.client_id,
        "MQTT connecting"
    );

    let manager =
        ConnectionManager::new(&channel, &config, processor, ServiceRegistry::with_defaults());
    let (events_tx, events_rx) = mqtt_loop::session_channel();

    tokio::select! {
        () = mqtt_loop::drive(eventloop, events_tx) => {
            tracing::error!("MQTT event loop exited unexpectedly");
        }
        result = manager.run(events_rx) => {
            result?;
        }
        // Graceful shutdown on SIGINT
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!("hsd-bridge stopped");
    Ok(())
}

/// `RUST_LOG` wins; otherwise `LOG_LEVEL` (default `info`).
/// `LOG_FORMAT=text` switches from JSON to human-readable lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::new(level_directive(&level))
    });

    let text = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("text"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if text {
        builder.init();
    } else {
        builder.json().init();
    }
}

/// Accept the level names operators already use (`WARNING`, `CRITICAL`).
fn level_directive(level: &str) -> String {
    match level.trim().to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        other => other.to_string(),
    }
}
