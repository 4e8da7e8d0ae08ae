//! Shared test harness for E2E integration tests.
//!
//! Wires a real `ConnectionManager` to a `MockChannel` and a
//! `RecordingDiscovery`, so tests push broker events in and assert on
//! subscriptions, publishes and discovery invocations.

#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::NamedTempFile;

use hsd_bridge::announce::AnnouncementProcessor;
use hsd_bridge::config::BridgeConfig;
use hsd_bridge::error::BridgeResult;
use hsd_bridge::mock::RecordingDiscovery;
use hsd_bridge::mqtt_loop::{self, ConnectionManager};
use hsd_bridge::overlay::OverlayLoader;
use hsd_bridge::services::ServiceRegistry;
use hsd_mqtt_channel::{ConnectReturnCode, MockChannel, SessionEvent};
use hsd_protocol::DiscoveryData;

pub const STATUS_TOPIC: &str = "homeassistant/status";
pub const ANNOUNCE_TOPIC: &str = "shellies/announce";
pub const COMMAND_TOPIC: &str = "shellies/command";

/// End-to-end harness: broker mock + recording discovery + bridge config.
pub struct TestHarness {
    pub mqtt: MockChannel,
    pub discovery: Arc<RecordingDiscovery>,
    pub config: BridgeConfig,
    /// Keeps the overlay file alive for the harness lifetime.
    overlay: Option<NamedTempFile>,
}

impl TestHarness {
    /// Harness with a status topic and no overlay file.
    pub fn new() -> Self {
        Self::with_discovery(RecordingDiscovery::new())
    }

    pub fn with_discovery(discovery: RecordingDiscovery) -> Self {
        let config = BridgeConfig {
            status_topic: Some(STATUS_TOPIC.to_string()),
            device_config_file: PathBuf::from("/nonexistent/device-config.yml"),
            ..Default::default()
        };
        Self {
            mqtt: MockChannel::new(),
            discovery: Arc::new(discovery),
            config,
            overlay: None,
        }
    }

    /// Write `yaml` to a temp file and point the bridge at it.
    pub fn with_overlay(mut self, yaml: &str) -> Self {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        self.config.device_config_file = file.path().to_path_buf();
        self.overlay = Some(file);
        self
    }

    pub fn manager(&self) -> ConnectionManager<'_> {
        let processor = AnnouncementProcessor::new(
            self.config.discovery_prefix.as_str(),
            OverlayLoader::new(&self.config.device_config_file),
            self.discovery.clone(),
        );
        ConnectionManager::new(
            &self.mqtt,
            &self.config,
            processor,
            ServiceRegistry::with_defaults(),
        )
    }

    /// Feed a sequence of events through `ConnectionManager::run` over the
    /// same bounded queue the binary uses.
    pub async fn run(&self, events: Vec<SessionEvent>) -> BridgeResult<()> {
        let (tx, rx) = mqtt_loop::session_channel();
        let producer = async move {
            for event in events {
                // The dispatcher may stop early on a fatal error.
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        };
        let manager = self.manager();
        let ((), result) = tokio::join!(producer, manager.run(rx));
        result
    }

    pub fn connected() -> SessionEvent {
        SessionEvent::Connected(ConnectReturnCode::Success)
    }

    pub fn announce(payload: &str) -> SessionEvent {
        SessionEvent::message(ANNOUNCE_TOPIC, payload)
    }

    pub fn status(payload: &str) -> SessionEvent {
        SessionEvent::message(STATUS_TOPIC, payload)
    }

    pub fn invocations(&self) -> Vec<DiscoveryData> {
        self.discovery.invocations()
    }
}

/// Announcement of a Shelly Plug S as published by firmware 1.x.
pub fn plug_announcement() -> &'static str {
    r#"{"id":"shellyplug-s-1","mac":"AA:BB","fw_ver":"1.0","model":"SHPLG-S","ip":"10.0.0.5"}"#
}
