// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-empty paths, parseable URLs, and non-zero batch limits.

use crate::diagnostic::ConfigError;
use crate::model::ParleyConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ParleyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.client.log_level.as_str()) {
        fail(format!(
            "client.log_level `{}` must be one of {}",
            config.client.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if let Some(path) = &config.storage.checkpoint_path
        && path.trim().is_empty()
    {
        fail("storage.checkpoint_path must not be empty when set".to_string());
    }

    let url = config.directory.base_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        fail(format!(
            "directory.base_url `{url}` must start with http:// or https://"
        ));
    }

    if config.directory.password.is_some() && config.directory.username.is_none() {
        fail("directory.password is set but directory.username is missing".to_string());
    }

    if config.directory.timeout_secs == 0 {
        fail("directory.timeout_secs must be at least 1".to_string());
    }

    if config.lookup.max_batch_size == 0 {
        fail("lookup.max_batch_size must be at least 1".to_string());
    }

    if config.lookup.max_concurrent_batches == 0 {
        fail("lookup.max_concurrent_batches must be at least 1".to_string());
    }

    if config.counter.max_wait_ms < config.counter.quiet_period_ms {
        fail(format!(
            "counter.max_wait_ms ({}) must not be less than counter.quiet_period_ms ({})",
            config.counter.max_wait_ms, config.counter.quiet_period_ms
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
