// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for the durable identity store (SQLite, etc.).

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Arrival, IdentityRecord, LocalId, RecordChange};

/// Adapter for the durable store backing identity records and arrivals.
///
/// The in-memory directory is authoritative for uniqueness decisions; the
/// store only mirrors committed state.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), ParleyError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), ParleyError>;

    async fn get_record(&self, local_id: &LocalId) -> Result<Option<IdentityRecord>, ParleyError>;

    /// Insert or replace a record by local id.
    async fn put_record(&self, record: &IdentityRecord) -> Result<(), ParleyError>;

    /// Delete a record subsumed by a merge. Deleting a missing id is not an error.
    async fn remove_record(&self, local_id: &LocalId) -> Result<(), ParleyError>;

    /// Apply a sequence of changes atomically, in order.
    async fn apply_changes(&self, changes: &[RecordChange]) -> Result<(), ParleyError>;

    async fn list_records(&self) -> Result<Vec<IdentityRecord>, ParleyError>;

    /// Highest ordering counter stamped on any durable arrival, if any.
    async fn max_counter_value(&self) -> Result<Option<u64>, ParleyError>;

    async fn record_arrival(&self, arrival: &Arrival) -> Result<(), ParleyError>;
}
