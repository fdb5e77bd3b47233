// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Parley identity subsystem.
//!
//! This crate provides the foundational trait definitions, error types, and
//! identity types used throughout the Parley workspace. Storage, directory
//! and checkpoint adapters implement traits defined here.

pub mod clock;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use clock::{Clock, SystemClock};
pub use error::ParleyError;
pub use types::{
    AccountId, AccountSubject, AdapterType, Arrival, HealthStatus, IdentityRecord, IndexField,
    LocalId, LookupResult, PhoneNumber, RecordChange,
};

pub use traits::{CounterCheckpoint, DirectoryAdapter, PluginAdapter, StorageAdapter};
