// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered loading of the `[client]`, `[storage]`, `[directory]`, `[lookup]`
//! and `[counter]` sections.
//!
//! A machine-wide file can pin the directory endpoint and credentials, a
//! per-user file picks the database location, and `PARLEY_*` variables tune
//! batch sizes or debounce timings for a single run.

#![allow(clippy::result_large_err)] // figment::Error is returned as-is

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::ParleyConfig;

const SYSTEM_CONFIG: &str = "/etc/parley/parley.toml";
const LOCAL_CONFIG: &str = "parley.toml";

/// Load the identity subsystem settings from every standard location.
///
/// Later layers win: compiled defaults, `/etc/parley/parley.toml`, the
/// user's `parley/parley.toml` under the platform config dir, `./parley.toml`,
/// then `PARLEY_*` variables.
pub fn load_config() -> Result<ParleyConfig, figment::Error> {
    build_figment().extract()
}

/// Parse settings from inline TOML on top of the defaults. Files and the
/// environment are not consulted.
pub fn load_config_from_str(toml_content: &str) -> Result<ParleyConfig, figment::Error> {
    defaults().merge(Toml::string(toml_content)).extract()
}

/// Load one explicit file (the CLI's `--config`), still honoring `PARLEY_*`.
pub fn load_config_from_path(path: &Path) -> Result<ParleyConfig, figment::Error> {
    defaults()
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The full provider stack behind [`load_config`], unextracted so
/// diagnostics can trace a bad value back to its file.
pub fn build_figment() -> Figment {
    config_files()
        .into_iter()
        .fold(defaults(), |figment, file| figment.merge(Toml::file(file)))
        .merge(env_provider())
}

/// Config files in merge order. Missing files contribute nothing.
pub(crate) fn config_files() -> Vec<PathBuf> {
    let mut files = vec![PathBuf::from(SYSTEM_CONFIG)];
    if let Some(dir) = dirs::config_dir() {
        files.push(dir.join("parley").join(LOCAL_CONFIG));
    }
    files.push(PathBuf::from(LOCAL_CONFIG));
    files
}

fn defaults() -> Figment {
    Figment::from(Serialized::defaults(ParleyConfig::default()))
}

/// `PARLEY_*` variables, routed to their section by prefix.
///
/// `PARLEY_COUNTER_QUIET_PERIOD_MS` becomes `counter.quiet_period_ms`; only the
/// first underscore after a known section name is a separator.
fn env_provider() -> Env {
    Env::prefixed("PARLEY_").map(|key| map_env_key(key.as_str()).into())
}

/// `lookup_max_batch_size` -> `lookup.max_batch_size`. Unknown names pass through
/// and are rejected later by `deny_unknown_fields`.
pub(crate) fn map_env_key(key: &str) -> String {
    const SECTIONS: [&str; 5] = ["client", "storage", "directory", "lookup", "counter"];

    for section in SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
