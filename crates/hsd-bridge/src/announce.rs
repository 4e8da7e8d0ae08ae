//! Device announcement processing.
//!
//! Turns one raw `{prefix}/announce` payload into exactly one discovery
//! routine invocation (or none, for malformed and gen-2 payloads).

use std::sync::Arc;

use thiserror::Error;
use tracing::Instrument;

use hsd_protocol::{DeviceAnnouncement, DiscoveryData, NormalizedDescriptor};

use crate::discovery::DiscoveryRoutine;
use crate::error::BridgeResult;
use crate::overlay::{self, OverlayError, OverlayLoader};
use crate::services::ServiceCallFacade;

/// Reasons an announcement payload is rejected.
#[derive(Debug, Error)]
pub enum AnnouncementError {
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,
}

/// Result of processing one announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceOutcome {
    /// The discovery routine ran.
    Discovered,
    /// Gen-2 device; deliberately ignored.
    SkippedGeneration,
    /// Malformed payload; logged and dropped.
    Dropped,
}

pub struct AnnouncementProcessor {
    discovery_prefix: String,
    overlay: OverlayLoader,
    routine: Arc<dyn DiscoveryRoutine>,
}

impl AnnouncementProcessor {
    pub fn new(
        discovery_prefix: impl Into<String>,
        overlay: OverlayLoader,
        routine: Arc<dyn DiscoveryRoutine>,
    ) -> Self {
        Self {
            discovery_prefix: discovery_prefix.into(),
            overlay,
            routine,
        }
    }

    /// Decode a raw payload into an announcement.
    pub fn parse(payload: &[u8]) -> Result<DeviceAnnouncement, AnnouncementError> {
        let text = std::str::from_utf8(payload)?;
        match serde_json::from_str::<serde_json::Value>(text)? {
            serde_json::Value::Object(fields) => Ok(DeviceAnnouncement::new(fields)),
            _ => Err(AnnouncementError::NotAnObject),
        }
    }

    /// Descriptor for `announcement` with the overlay merged on top.
    ///
    /// The overlay file is re-read on every call.
    pub fn build_data(
        &self,
        announcement: &DeviceAnnouncement,
    ) -> Result<DiscoveryData, OverlayError> {
        let descriptor =
            NormalizedDescriptor::from_announcement(announcement, self.discovery_prefix.as_str());
        let overlay = self.overlay.load()?;
        Ok(overlay::merge(descriptor.into_map(), overlay))
    }

    /// Process one raw announcement payload.
    ///
    /// Malformed payloads are logged and dropped. Overlay and discovery
    /// routine failures are returned to the caller.
    pub async fn on_announcement(
        &self,
        payload: &[u8],
        hass: &ServiceCallFacade<'_>,
    ) -> BridgeResult<AnnounceOutcome> {
        let announcement = match Self::parse(payload) {
            Ok(announcement) => announcement,
            Err(e) => {
                tracing::error!(error = %e, "dropping malformed announcement");
                return Ok(AnnounceOutcome::Dropped);
            }
        };

        if announcement.is_skipped_generation() {
            tracing::debug!(device = ?announcement.get("id"), "skipping gen-2 announcement");
            return Ok(AnnounceOutcome::SkippedGeneration);
        }

        let data = self.build_data(&announcement)?;

        let device = announcement.id().unwrap_or("unknown");
        tracing::info!(
            device,
            model = announcement.model().unwrap_or(""),
            routine = self.routine.name(),
            "running discovery"
        );

        let span = tracing::info_span!("discovery", device);
        self.routine
            .discover(&data, &span, hass)
            .instrument(span.clone())
            .await?;

        Ok(AnnounceOutcome::Discovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoveryError;
    use crate::error::BridgeError;
    use crate::mock::RecordingDiscovery;
    use crate::services::ServiceRegistry;
    use crate::test_log;
    use hsd_mqtt_channel::MockChannel;
    use hsd_protocol::ServiceCall;
    use serde_json::json;
    use std::io::Write;
    use tracing::Level;

    const PLUG: &[u8] = br#"{"id":"shellyplug-s-1","mac":"AA:BB","fw_ver":"1.0","model":"SHPLG-S","ip":"10.0.0.5"}"#;

    fn processor(
        routine: &Arc<RecordingDiscovery>,
        overlay: OverlayLoader,
    ) -> AnnouncementProcessor {
        AnnouncementProcessor::new("homeassistant", overlay, routine.clone())
    }

    fn no_overlay() -> OverlayLoader {
        OverlayLoader::new("/nonexistent/device-config.yml")
    }

    #[tokio::test]
    async fn announcement_builds_descriptor() {
        let mock = MockChannel::new();
        let registry = ServiceRegistry::with_defaults();
        let hass = ServiceCallFacade::new(&registry, &mock);
        let routine = Arc::new(RecordingDiscovery::new());

        let outcome = processor(&routine, no_overlay())
            .on_announcement(PLUG, &hass)
            .await
            .unwrap();

        assert_eq!(outcome, AnnounceOutcome::Discovered);
        assert_eq!(routine.invocation_count(), 1);
        assert_eq!(
            serde_json::Value::Object(routine.last_invocation().unwrap()),
            json!({
                "id": "shellyplug-s-1",
                "mac": "AA:BB",
                "fw_ver": "1.0",
                "model": "SHPLG-S",
                "mode": "",
                "host": "10.0.0.5",
                "discovery_prefix": "homeassistant",
            })
        );
    }

    #[tokio::test]
    async fn explicit_gen_one_is_processed() {
        let mock = MockChannel::new();
        let registry = ServiceRegistry::with_defaults();
        let hass = ServiceCallFacade::new(&registry, &mock);
        let routine = Arc::new(RecordingDiscovery::new());

        let outcome = processor(&routine, no_overlay())
            .on_announcement(br#"{"id":"shelly1-1","gen":1,"mode":"relay"}"#, &hass)
            .await
            .unwrap();

        assert_eq!(outcome, AnnounceOutcome::Discovered);
        assert_eq!(routine.last_invocation().unwrap()["mode"], "relay");
    }

    #[tokio::test]
    async fn gen_two_is_skipped() {
        let mock = MockChannel::new();
        let registry = ServiceRegistry::with_defaults();
        let hass = ServiceCallFacade::new(&registry, &mock);
        let routine = Arc::new(RecordingDiscovery::emitting(vec![ServiceCall::mqtt_publish(
            "t", "p", 0, false,
        )]));

        let outcome = processor(&routine, no_overlay())
            .on_announcement(br#"{"id":"shellyplus1-1","gen":2}"#, &hass)
            .await
            .unwrap();

        assert_eq!(outcome, AnnounceOutcome::SkippedGeneration);
        assert_eq!(routine.invocation_count(), 0);
        assert!(mock.published().is_empty());
    }

    #[tokio::test]
    async fn malformed_payloads_are_dropped() {
        let mock = MockChannel::new();
        let registry = ServiceRegistry::with_defaults();
        let hass = ServiceCallFacade::new(&registry, &mock);
        let routine = Arc::new(RecordingDiscovery::new());
        let processor = processor(&routine, no_overlay());

        let payloads: [&[u8]; 4] = [b"not json", b"[1,2]", b"\xff\xfe", b"\"shelly1\""];
        for payload in payloads {
            let outcome = processor.on_announcement(payload, &hass).await.unwrap();
            assert_eq!(outcome, AnnounceOutcome::Dropped);
        }
        assert_eq!(routine.invocation_count(), 0);
    }

    #[tokio::test]
    async fn malformed_payload_logs_one_error() {
        let mock = MockChannel::new();
        let registry = ServiceRegistry::with_defaults();
        let hass = ServiceCallFacade::new(&registry, &mock);
        let routine = Arc::new(RecordingDiscovery::new());
        let (logs, _guard) = test_log::capture();

        let outcome = processor(&routine, no_overlay())
            .on_announcement(b"{not json", &hass)
            .await
            .unwrap();

        assert_eq!(outcome, AnnounceOutcome::Dropped);
        assert_eq!(logs.count(Level::ERROR), 1);
        assert_eq!(routine.invocation_count(), 0);
    }

    #[tokio::test]
    async fn non_string_fields_are_forwarded() {
        let mock = MockChannel::new();
        let registry = ServiceRegistry::with_defaults();
        let hass = ServiceCallFacade::new(&registry, &mock);
        let routine = Arc::new(RecordingDiscovery::new());
        let processor = processor(&routine, no_overlay());

        let outcome = processor
            .on_announcement(
                br#"{"id":"shelly1-1","mac":"AA:BB","fw_ver":20230913,"model":"SHSW-1"}"#,
                &hass,
            )
            .await
            .unwrap();
        assert_eq!(outcome, AnnounceOutcome::Discovered);
        assert_eq!(routine.last_invocation().unwrap()["fw_ver"], 20230913);

        let outcome = processor
            .on_announcement(br#"{"id":42,"ip":"10.0.0.9"}"#, &hass)
            .await
            .unwrap();
        assert_eq!(outcome, AnnounceOutcome::Discovered);
        let data = routine.last_invocation().unwrap();
        assert_eq!(data["id"], 42);
        assert_eq!(data["host"], "10.0.0.9");
        assert_eq!(routine.invocation_count(), 2);
    }

    #[tokio::test]
    async fn float_gen_two_is_skipped() {
        let mock = MockChannel::new();
        let registry = ServiceRegistry::with_defaults();
        let hass = ServiceCallFacade::new(&registry, &mock);
        let routine = Arc::new(RecordingDiscovery::new());

        let outcome = processor(&routine, no_overlay())
            .on_announcement(br#"{"id":"shellyplus1-1","gen":2.0}"#, &hass)
            .await
            .unwrap();

        assert_eq!(outcome, AnnounceOutcome::SkippedGeneration);
        assert_eq!(routine.invocation_count(), 0);
    }

    #[tokio::test]
    async fn overlay_is_merged_over_descriptor() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mode: switch\nshellyplug-s-1:\n  light: true").unwrap();

        let mock = MockChannel::new();
        let registry = ServiceRegistry::with_defaults();
        let hass = ServiceCallFacade::new(&registry, &mock);
        let routine = Arc::new(RecordingDiscovery::new());

        processor(&routine, OverlayLoader::new(file.path()))
            .on_announcement(PLUG, &hass)
            .await
            .unwrap();

        let data = routine.last_invocation().unwrap();
        assert_eq!(data["mode"], "switch");
        assert_eq!(data["shellyplug-s-1"]["light"], true);
        assert_eq!(data["id"], "shellyplug-s-1");
    }

    #[tokio::test]
    async fn overlay_is_reread_per_announcement() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mode: roller").unwrap();

        let mock = MockChannel::new();
        let registry = ServiceRegistry::with_defaults();
        let hass = ServiceCallFacade::new(&registry, &mock);
        let routine = Arc::new(RecordingDiscovery::new());
        let processor = processor(&routine, OverlayLoader::new(file.path()));

        processor.on_announcement(PLUG, &hass).await.unwrap();
        std::fs::write(file.path(), "mode: relay\n").unwrap();
        processor.on_announcement(PLUG, &hass).await.unwrap();

        let invocations = routine.invocations();
        assert_eq!(invocations[0]["mode"], "roller");
        assert_eq!(invocations[1]["mode"], "relay");
    }

    #[tokio::test]
    async fn malformed_overlay_propagates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mode: [unterminated").unwrap();

        let mock = MockChannel::new();
        let registry = ServiceRegistry::with_defaults();
        let hass = ServiceCallFacade::new(&registry, &mock);
        let routine = Arc::new(RecordingDiscovery::new());

        let err = processor(&routine, OverlayLoader::new(file.path()))
            .on_announcement(PLUG, &hass)
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::Overlay(_)));
        assert_eq!(routine.invocation_count(), 0);
    }

    #[tokio::test]
    async fn discovery_failure_propagates() {
        let mock = MockChannel::new();
        let registry = ServiceRegistry::with_defaults();
        let hass = ServiceCallFacade::new(&registry, &mock);
        let routine = Arc::new(RecordingDiscovery::failing("template missing"));

        let err = processor(&routine, no_overlay())
            .on_announcement(PLUG, &hass)
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::Discovery(DiscoveryError::Other(_))));
        assert_eq!(routine.invocation_count(), 1);
    }

    #[tokio::test]
    async fn routine_publishes_through_facade() {
        let mock = MockChannel::new();
        let registry = ServiceRegistry::with_defaults();
        let hass = ServiceCallFacade::new(&registry, &mock);
        let routine = Arc::new(RecordingDiscovery::emitting(vec![
            ServiceCall::mqtt_publish("homeassistant/switch/a/config", "{}", 0, true),
            ServiceCall::mqtt_publish("homeassistant/sensor/b/config", "{}", 0, true),
        ]));

        processor(&routine, no_overlay())
            .on_announcement(PLUG, &hass)
            .await
            .unwrap();

        let msgs = mock.published();
        assert_eq!(msgs.len(), 2);
        assert!(msgs.iter().all(|m| m.retain));
    }
}
