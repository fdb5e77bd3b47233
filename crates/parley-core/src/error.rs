// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Parley identity subsystem.

use thiserror::Error;

use crate::types::{IndexField, LocalId};

/// The primary error type used across all Parley adapter traits and core operations.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The counter store was initialized a second time in this process.
    #[error("counter store already initialized")]
    AlreadyInitialized,

    /// The counter store was used before `initialize()` completed.
    #[error("counter store not initialized -- call initialize() first")]
    NotInitialized,

    /// A directory mutation would leave two records sharing one identifier.
    ///
    /// Only reachable when a caller bypasses the merge resolver.
    #[error("conflicting {field} index: `{value}` is held by {existing}, not {incoming}")]
    ConflictingIndex {
        field: IndexField,
        value: String,
        existing: LocalId,
        incoming: LocalId,
    },

    /// Remote directory lookup failed (rate limit, network, malformed response).
    #[error("directory lookup failed: {message}")]
    LookupFailed {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Remote account existence check failed.
    #[error("existence check failed: {message}")]
    ExistenceCheckFailed {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A phone number or account identifier failed boundary normalization.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    /// Returns true for remote-service failures that the next reconciliation
    /// pass may retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ParleyError::LookupFailed { .. } | ParleyError::ExistenceCheckFailed { .. }
        )
    }
}
