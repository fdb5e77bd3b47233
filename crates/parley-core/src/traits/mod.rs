// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the collaborators the identity subsystem consumes.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod checkpoint;
pub mod directory;
pub mod storage;

pub use adapter::PluginAdapter;
pub use checkpoint::CounterCheckpoint;
pub use directory::DirectoryAdapter;
pub use storage::StorageAdapter;
