// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! File-backed counter checkpoint.
//!
//! The value is written as decimal text to a sibling temp file which is then
//! renamed over the target, so a crash mid-write leaves the previous value.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use parley_core::{AdapterType, CounterCheckpoint, HealthStatus, ParleyError, PluginAdapter};

fn io_err(e: std::io::Error) -> ParleyError {
    ParleyError::Storage {
        source: Box::new(e),
    }
}

/// Counter checkpoint stored in a single small file.
pub struct FileCheckpoint {
    path: PathBuf,
}

impl FileCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl PluginAdapter for FileCheckpoint {
    fn name(&self) -> &str {
        "file-checkpoint"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Checkpoint
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => Ok(
                HealthStatus::Degraded(format!("{} does not exist yet", parent.display())),
            ),
            _ => Ok(HealthStatus::Healthy),
        }
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl CounterCheckpoint for FileCheckpoint {
    async fn load(&self) -> Result<Option<u64>, ParleyError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(e)),
        };

        match text.trim().parse::<u64>() {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                // Treat a garbled checkpoint as absent; the store's arrival
                // maximum and the wall clock still bound the seed.
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable counter checkpoint");
                Ok(None)
            }
        }
    }

    async fn store(&self, value: u64) -> Result<(), ParleyError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, value.to_string()).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        debug!(value, "counter checkpoint written");
        Ok(())
    }
}
