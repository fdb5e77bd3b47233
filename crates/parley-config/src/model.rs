// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Parley identity subsystem.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Parley configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParleyConfig {
    /// Client identity and logging settings.
    #[serde(default)]
    pub client: ClientConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Remote directory service settings.
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Batch lookup settings.
    #[serde(default)]
    pub lookup: LookupConfig,

    /// Message ordering counter settings.
    #[serde(default)]
    pub counter: CounterConfig,
}

/// Client identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Display name of this client instance, used in log output.
    #[serde(default = "default_client_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: default_client_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_client_name() -> String {
    "parley".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// Path to the counter checkpoint file. Defaults to the database path
    /// with a `.counter` suffix.
    #[serde(default)]
    pub checkpoint_path: Option<String>,
}

impl StorageConfig {
    /// The checkpoint path, derived from the database path when unset.
    pub fn resolved_checkpoint_path(&self) -> String {
        self.checkpoint_path
            .clone()
            .unwrap_or_else(|| format!("{}.counter", self.database_path))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            checkpoint_path: None,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("parley").join("parley.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("parley.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Remote directory service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DirectoryConfig {
    /// Base URL of the directory service.
    #[serde(default = "default_directory_url")]
    pub base_url: String,

    /// Basic-auth username. `None` sends unauthenticated requests.
    #[serde(default)]
    pub username: Option<String>,

    /// Basic-auth password.
    #[serde(default)]
    pub password: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_directory_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries for transient HTTP failures (429, 5xx).
    #[serde(default = "default_directory_max_retries")]
    pub max_retries: u32,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_directory_url(),
            username: None,
            password: None,
            timeout_secs: default_directory_timeout_secs(),
            max_retries: default_directory_max_retries(),
        }
    }
}

fn default_directory_url() -> String {
    "https://directory.parley.invalid".to_string()
}

fn default_directory_timeout_secs() -> u64 {
    30
}

fn default_directory_max_retries() -> u32 {
    1
}

/// Batch lookup configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LookupConfig {
    /// Maximum phone numbers per directory request.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Maximum directory requests in flight at once.
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_concurrent_batches: default_max_concurrent_batches(),
        }
    }
}

fn default_max_batch_size() -> usize {
    1000
}

fn default_max_concurrent_batches() -> usize {
    4
}

/// Message ordering counter configuration.
///
/// Controls the debounced checkpoint write: a burst of increments is written
/// once after `quiet_period_ms` without new increments, and never later than
/// `max_wait_ms` after the first unwritten increment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CounterConfig {
    /// Quiet period before a checkpoint write, in milliseconds.
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,

    /// Upper bound on checkpoint delay during sustained bursts, in milliseconds.
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: default_quiet_period_ms(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

fn default_quiet_period_ms() -> u64 {
    25
}

fn default_max_wait_ms() -> u64 {
    250
}
