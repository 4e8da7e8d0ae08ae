//! Recording discovery routine for tests.
//!
//! Captures the data of every invocation and optionally replays a fixed
//! list of service calls or fails on demand.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::Span;

use hsd_protocol::{DiscoveryData, ServiceCall};

use crate::discovery::{DiscoveryError, DiscoveryRoutine};
use crate::services::ServiceCallFacade;

pub struct RecordingDiscovery {
    invocations: Mutex<Vec<DiscoveryData>>,
    calls: Vec<ServiceCall>,
    failure: Option<String>,
}

impl RecordingDiscovery {
    pub fn new() -> Self {
        Self {
            invocations: Mutex::new(Vec::new()),
            calls: Vec::new(),
            failure: None,
        }
    }

    /// Replay `calls` through the facade on every invocation.
    pub fn emitting(calls: Vec<ServiceCall>) -> Self {
        Self {
            calls,
            ..Self::new()
        }
    }

    /// Fail every invocation (after recording it).
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new()
        }
    }

    pub fn invocations(&self) -> Vec<DiscoveryData> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    pub fn last_invocation(&self) -> Option<DiscoveryData> {
        self.invocations.lock().unwrap().last().cloned()
    }
}

impl Default for RecordingDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiscoveryRoutine for RecordingDiscovery {
    fn name(&self) -> &str {
        "recording"
    }

    async fn discover(
        &self,
        data: &DiscoveryData,
        _logger: &Span,
        hass: &ServiceCallFacade<'_>,
    ) -> Result<(), DiscoveryError> {
        self.invocations.lock().unwrap().push(data.clone());

        if let Some(message) = &self.failure {
            return Err(DiscoveryError::Other(message.clone()));
        }
        for call in &self.calls {
            hass.dispatch(call).await;
        }
        Ok(())
    }
}
