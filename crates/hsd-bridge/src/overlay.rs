//! Static per-deployment overrides read from a YAML side file.
//!
//! The file is optional and re-read on every announcement, so edits take
//! effect on the next announce cycle without a restart.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;

use hsd_protocol::DiscoveryData;

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("failed to read device config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed device config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Loads the overlay mapping from a fixed path.
#[derive(Debug, Clone)]
pub struct OverlayLoader {
    path: PathBuf,
}

impl OverlayLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the overlay. A missing file yields an empty mapping.
    pub fn load(&self) -> Result<DiscoveryData, OverlayError> {
        load(&self.path)
    }
}

/// Read and parse the overlay at `path`.
pub fn load(path: &Path) -> Result<DiscoveryData, OverlayError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(DiscoveryData::new()),
        Err(source) => {
            return Err(OverlayError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    parse(&contents).map_err(|source| OverlayError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a YAML mapping. An empty or `null` document is an empty mapping.
pub fn parse(contents: &str) -> Result<DiscoveryData, serde_yaml::Error> {
    if contents.trim().is_empty() {
        return Ok(DiscoveryData::new());
    }
    let doc: Option<DiscoveryData> = serde_yaml::from_str(contents)?;
    Ok(doc.unwrap_or_default())
}

/// Right-biased merge: overlay keys replace descriptor keys.
pub fn merge(descriptor: DiscoveryData, overlay: DiscoveryData) -> DiscoveryData {
    let mut merged = descriptor;
    merged.extend(overlay);
    merged
}
