//! Pluggable discovery routines.
//!
//! A routine receives the merged device data, a logging span and a
//! service-call facade, and expresses everything it wants published as
//! `hass.call(...)`. Which routine runs is decided once at startup:
//! - `ScriptDiscovery` runs an external program (the upstream discovery
//!   script behind a small adapter) and replays the service calls it
//!   prints, one JSON object per stdout line
//! - `DryRunDiscovery` only logs what it would have been given

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::Span;

use hsd_protocol::{DiscoveryData, ServiceCall};

use crate::services::ServiceCallFacade;

/// How the discovery routine is resolved and run.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Program plus arguments, split like a shell would (no shell involved).
    #[serde(default = "default_command")]
    pub command: String,
    /// Upper bound for one routine run, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Log descriptors instead of running the command.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            timeout_secs: default_timeout(),
            dry_run: false,
        }
    }
}

fn default_command() -> String {
    "shellies-discovery".to_string()
}

fn default_timeout() -> u64 {
    30
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("invalid discovery command '{command}': {reason}")]
    InvalidCommand { command: String, reason: String },

    #[error("failed to spawn discovery command '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("discovery I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode discovery data: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("discovery command failed: {0}")]
    Exited(ExitStatus),

    #[error("discovery command timed out after {0}s")]
    Timeout(u64),

    #[error("{0}")]
    Other(String),
}

/// A discovery routine. Called exactly once per accepted announcement.
#[async_trait]
pub trait DiscoveryRoutine: Send + Sync {
    fn name(&self) -> &str;

    async fn discover(
        &self,
        data: &DiscoveryData,
        logger: &Span,
        hass: &ServiceCallFacade<'_>,
    ) -> Result<(), DiscoveryError>;
}

/// Resolve the configured routine.
pub fn from_config(config: &DiscoveryConfig) -> Result<Arc<dyn DiscoveryRoutine>, DiscoveryError> {
    if config.dry_run {
        tracing::info!("discovery dry-run enabled, nothing will be published");
        return Ok(Arc::new(DryRunDiscovery));
    }
    let script = ScriptDiscovery::new(&config.command, Duration::from_secs(config.timeout_secs))?;
    tracing::info!(command = %config.command, "discovery command configured");
    Ok(Arc::new(script))
}

// ── ScriptDiscovery ───────────────────────────────────────────

/// Runs an external program per announcement.
///
/// Protocol: the merged data is written to stdin as a single JSON object,
/// then stdin is closed. Each stdout line holding a `ServiceCall` object is
/// executed in order; other lines are skipped. Stderr is logged at warn.
pub struct ScriptDiscovery {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ScriptDiscovery {
    pub fn new(command: &str, timeout: Duration) -> Result<Self, DiscoveryError> {
        let tokens = shell_words::split(command).map_err(|e| DiscoveryError::InvalidCommand {
            command: command.to_string(),
            reason: e.to_string(),
        })?;
        let Some((program, args)) = tokens.split_first() else {
            return Err(DiscoveryError::InvalidCommand {
                command: command.to_string(),
                reason: "empty command".into(),
            });
        };

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }

    async fn run(
        &self,
        data: &DiscoveryData,
        logger: &Span,
        hass: &ServiceCallFacade<'_>,
    ) -> Result<usize, DiscoveryError> {
        let input = serde_json::to_vec(data)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DiscoveryError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let (Some(mut stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(DiscoveryError::Other("discovery command pipes unavailable".into()));
        };

        let writer = async move {
            let result = match stdin.write_all(&input).await {
                Ok(()) => stdin.shutdown().await,
                Err(e) => Err(e),
            };
            // A routine that exits without reading its input is not our failure.
            match result {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            }
        };

        let stderr_logger = async {
            let mut lines = BufReader::new(stderr).lines();
            while let Some(line) = lines.next_line().await? {
                tracing::warn!(parent: logger, line = %line, "discovery stderr");
            }
            Ok::<_, std::io::Error>(())
        };

        let call_reader = async {
            let mut lines = BufReader::new(stdout).lines();
            let mut calls = 0;
            while let Some(line) = lines.next_line().await? {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<ServiceCall>(line) {
                    Ok(call) => {
                        hass.dispatch(&call).await;
                        calls += 1;
                    }
                    Err(e) => {
                        tracing::debug!(parent: logger, line, error = %e, "skipping non service-call output");
                    }
                }
            }
            Ok::<_, std::io::Error>(calls)
        };

        let (written, logged, calls) = tokio::join!(writer, stderr_logger, call_reader);
        written?;
        logged?;
        let calls = calls?;

        let status = child.wait().await?;
        if !status.success() {
            return Err(DiscoveryError::Exited(status));
        }
        Ok(calls)
    }
}

#[async_trait]
impl DiscoveryRoutine for ScriptDiscovery {
    fn name(&self) -> &str {
        &self.program
    }

    async fn discover(
        &self,
        data: &DiscoveryData,
        logger: &Span,
        hass: &ServiceCallFacade<'_>,
    ) -> Result<(), DiscoveryError> {
        match tokio::time::timeout(self.timeout, self.run(data, logger, hass)).await {
            Ok(Ok(calls)) => {
                tracing::debug!(parent: logger, calls, "discovery command finished");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DiscoveryError::Timeout(self.timeout.as_secs())),
        }
    }
}

// ── DryRunDiscovery ───────────────────────────────────────────

/// Logs the data it receives and publishes nothing.
pub struct DryRunDiscovery;

#[async_trait]
impl DiscoveryRoutine for DryRunDiscovery {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn discover(
        &self,
        data: &DiscoveryData,
        logger: &Span,
        _hass: &ServiceCallFacade<'_>,
    ) -> Result<(), DiscoveryError> {
        let rendered = serde_json::to_string(data)?;
        tracing::info!(parent: logger, data = %rendered, "dry-run discovery");
        Ok(())
    }
}
