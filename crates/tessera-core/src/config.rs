// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Runtime configuration.
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parallel::default_workers;

/// Error type for config and pipeline file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization/deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Persistence format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Single packed file.
    #[default]
    Packed,
    /// Directory tree of JSON metadata and raw payloads.
    Directory,
}

/// Core settings, loaded from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Worker count for parallel loops.
    pub workers: usize,
    /// Minimum spacing between progress messages, in milliseconds.
    pub progress_interval_ms: u64,
    /// Format used when none is given explicitly.
    pub default_backend: BackendKind,
    /// Check payload length and digest on full reads.
    pub verify_payload_digests: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            progress_interval_ms: 1000,
            default_backend: BackendKind::default(),
            verify_payload_digests: true,
        }
    }
}

impl CoreConfig {
    /// Loads settings from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read(path) {
            Ok(bytes) if bytes.is_empty() => Ok(Self::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes settings as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    /// Progress throttle as a duration.
    #[must_use]
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}
