// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory storage and checkpoint adapters.
//!
//! `MemoryStorage` mirrors the SQLite adapter's UNIQUE constraints on phone
//! number and account id, so a test that persists changes in the wrong order
//! fails here the same way it would against a real database.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use parley_core::types::{AdapterType, Arrival, HealthStatus, IdentityRecord, LocalId, RecordChange};
use parley_core::{CounterCheckpoint, ParleyError, PluginAdapter, StorageAdapter};

fn storage_err(msg: impl Into<String>) -> ParleyError {
    ParleyError::Storage {
        source: msg.into().into(),
    }
}

/// A `StorageAdapter` backed by a map.
#[derive(Default)]
pub struct MemoryStorage {
    records: Mutex<BTreeMap<LocalId, IdentityRecord>>,
    arrivals: Mutex<Vec<Arrival>>,
    fail_writes: AtomicBool,
    write_calls: AtomicUsize,
    write_delay: Option<Duration>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate with records, bypassing constraint checks.
    pub fn with_records(records: impl IntoIterator<Item = IdentityRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|r| (r.local_id.clone(), r))
            .collect();
        Self {
            records: Mutex::new(map),
            ..Self::default()
        }
    }

    /// Pre-populate arrival rows (drives `max_counter_value`).
    pub fn with_arrivals(self, arrivals: impl IntoIterator<Item = Arrival>) -> Self {
        Self {
            arrivals: Mutex::new(arrivals.into_iter().collect()),
            ..self
        }
    }

    /// Delay every `apply_changes` call, to model a slow disk.
    pub fn with_write_delay(self, delay: Duration) -> Self {
        Self {
            write_delay: Some(delay),
            ..self
        }
    }

    /// Make every subsequent write fail with a storage error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of write calls (put, remove, apply, arrival) seen so far.
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> Vec<IdentityRecord> {
        self.records.lock().await.values().cloned().collect()
    }

    pub async fn arrivals(&self) -> Vec<Arrival> {
        self.arrivals.lock().await.clone()
    }

    fn begin_write(&self) -> Result<(), ParleyError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(storage_err("injected write failure"));
        }
        Ok(())
    }
}

fn check_unique(records: &BTreeMap<LocalId, IdentityRecord>) -> Result<(), ParleyError> {
    let mut phones = HashSet::new();
    let mut accounts = HashSet::new();
    for record in records.values() {
        if let Some(p) = &record.phone_number
            && !phones.insert(p)
        {
            return Err(storage_err(format!("UNIQUE constraint failed: phone_number {p}")));
        }
        if let Some(a) = &record.account_id
            && !accounts.insert(a)
        {
            return Err(storage_err(format!("UNIQUE constraint failed: account_id {a}")));
        }
    }
    Ok(())
}

fn apply_one(map: &mut BTreeMap<LocalId, IdentityRecord>, change: &RecordChange) -> Result<(), ParleyError> {
    match change {
        RecordChange::Put(record) => {
            if record.is_empty() {
                return Err(storage_err("CHECK constraint failed: record holds no identifier"));
            }
            map.insert(record.local_id.clone(), record.clone());
        }
        RecordChange::Remove(id) => {
            map.remove(id);
        }
    }
    check_unique(map)
}

#[async_trait]
impl PluginAdapter for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn initialize(&self) -> Result<(), ParleyError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), ParleyError> {
        Ok(())
    }

    async fn get_record(&self, local_id: &LocalId) -> Result<Option<IdentityRecord>, ParleyError> {
        Ok(self.records.lock().await.get(local_id).cloned())
    }

    async fn put_record(&self, record: &IdentityRecord) -> Result<(), ParleyError> {
        self.apply_changes(&[RecordChange::Put(record.clone())]).await
    }

    async fn remove_record(&self, local_id: &LocalId) -> Result<(), ParleyError> {
        self.apply_changes(&[RecordChange::Remove(local_id.clone())]).await
    }

    async fn apply_changes(&self, changes: &[RecordChange]) -> Result<(), ParleyError> {
        self.begin_write()?;
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        let mut records = self.records.lock().await;
        let mut staged = records.clone();
        for change in changes {
            apply_one(&mut staged, change)?;
        }
        *records = staged;
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<IdentityRecord>, ParleyError> {
        Ok(self.snapshot().await)
    }

    async fn max_counter_value(&self) -> Result<Option<u64>, ParleyError> {
        Ok(self.arrivals.lock().await.iter().map(|a| a.counter).max())
    }

    async fn record_arrival(&self, arrival: &Arrival) -> Result<(), ParleyError> {
        self.begin_write()?;
        self.arrivals.lock().await.push(arrival.clone());
        Ok(())
    }
}

/// A `CounterCheckpoint` that keeps the value in memory and logs every write.
#[derive(Default)]
pub struct MemoryCheckpoint {
    value: Mutex<Option<u64>>,
    writes: Mutex<Vec<u64>>,
}

impl MemoryCheckpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: u64) -> Self {
        Self {
            value: Mutex::new(Some(value)),
            writes: Mutex::new(Vec::new()),
        }
    }

    pub async fn value(&self) -> Option<u64> {
        *self.value.lock().await
    }

    /// Every value passed to `store`, in call order.
    pub async fn writes(&self) -> Vec<u64> {
        self.writes.lock().await.clone()
    }
}

#[async_trait]
impl PluginAdapter for MemoryCheckpoint {
    fn name(&self) -> &str {
        "memory-checkpoint"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Checkpoint
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl CounterCheckpoint for MemoryCheckpoint {
    async fn load(&self) -> Result<Option<u64>, ParleyError> {
        Ok(self.value().await)
    }

    async fn store(&self, value: u64) -> Result<(), ParleyError> {
        self.writes.lock().await.push(value);
        *self.value.lock().await = Some(value);
        Ok(())
    }
}
