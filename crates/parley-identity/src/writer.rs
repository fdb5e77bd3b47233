// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-writer gate over the identity directory.
//!
//! Every mutation takes the directory lock, lets the resolver decide against
//! the current indices, and persists the resulting changes before releasing
//! the lock. Durable writes therefore land in the same order the in-memory
//! mutations happened, which keeps the store's UNIQUE constraints satisfied.
//! A failed write rolls the touched records back, so memory never runs ahead
//! of the store.

use std::sync::Arc;

use parley_core::types::{AccountId, IdentityRecord, LocalId, PhoneNumber};
use parley_core::{ParleyError, StorageAdapter};
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::directory::IdentityDirectory;
use crate::resolver::{MergeOutcome, MergeResolver};

/// Shared handle that serializes directory mutations and their persistence.
#[derive(Clone)]
pub struct DirectoryWriter {
    directory: Arc<Mutex<IdentityDirectory>>,
    resolver: MergeResolver,
    storage: Arc<dyn StorageAdapter>,
}

impl DirectoryWriter {
    pub fn new(
        directory: IdentityDirectory,
        resolver: MergeResolver,
        storage: Arc<dyn StorageAdapter>,
    ) -> Self {
        Self {
            directory: Arc::new(Mutex::new(directory)),
            resolver,
            storage,
        }
    }

    /// Load every persisted record into a fresh directory.
    pub async fn load(
        resolver: MergeResolver,
        storage: Arc<dyn StorageAdapter>,
    ) -> Result<Self, ParleyError> {
        let records = storage.list_records().await?;
        let count = records.len();
        let directory = IdentityDirectory::from_records(records)?;
        debug!(count, "identity directory loaded");
        Ok(Self::new(directory, resolver, storage))
    }

    /// Reconcile one observation and persist the outcome.
    pub async fn observe(
        &self,
        phone: Option<&PhoneNumber>,
        account: Option<&AccountId>,
        secondary_id: Option<&str>,
    ) -> Result<MergeOutcome, ParleyError> {
        let mut directory = self.directory.lock().await;
        let prior = capture(&directory, phone, account);
        let outcome = self.resolver.resolve(&mut directory, phone, account, secondary_id)?;
        self.persist(&mut directory, &outcome, prior).await?;
        Ok(outcome)
    }

    /// Apply a verified "no account" answer and persist the outcome.
    pub async fn mark_unregistered(
        &self,
        phone: &PhoneNumber,
        verified_account: Option<&AccountId>,
    ) -> Result<MergeOutcome, ParleyError> {
        let mut directory = self.directory.lock().await;
        let prior = capture(&directory, Some(phone), None);
        let outcome = self
            .resolver
            .mark_unregistered(&mut directory, phone, verified_account)?;
        self.persist(&mut directory, &outcome, prior).await?;
        Ok(outcome)
    }

    /// Write `outcome` to the store, undoing it in memory if the write fails.
    async fn persist(
        &self,
        directory: &mut IdentityDirectory,
        outcome: &MergeOutcome,
        prior: Vec<IdentityRecord>,
    ) -> Result<(), ParleyError> {
        if outcome.changes.is_empty() {
            return Ok(());
        }
        let Err(e) = self.storage.apply_changes(&outcome.changes).await else {
            return Ok(());
        };
        error!(error = %e, kind = ?outcome.kind, "failed to persist identity changes, rolling back");
        if let Err(rollback) = rollback(directory, outcome, prior) {
            error!(error = %rollback, "identity rollback failed, directory may differ from store");
        }
        Err(e)
    }

    pub async fn find_by_phone_number(&self, phone: &PhoneNumber) -> Option<IdentityRecord> {
        self.directory.lock().await.find_by_phone_number(phone).cloned()
    }

    pub async fn find_by_account_id(&self, account: &AccountId) -> Option<IdentityRecord> {
        self.directory.lock().await.find_by_account_id(account).cloned()
    }

    pub async fn find_by_local_id(&self, local_id: &LocalId) -> Option<IdentityRecord> {
        self.directory.lock().await.find_by_local_id(local_id).cloned()
    }

    /// Snapshot of all records, sorted by phone number then local id.
    pub async fn records(&self) -> Vec<IdentityRecord> {
        let mut records: Vec<_> = self.directory.lock().await.records().cloned().collect();
        records.sort_by(|a, b| {
            a.phone_number
                .cmp(&b.phone_number)
                .then_with(|| a.local_id.cmp(&b.local_id))
        });
        records
    }

    pub async fn len(&self) -> usize {
        self.directory.lock().await.len()
    }
}

/// Records the resolver can touch for this observation, taken before it runs.
///
/// The resolver only ever rewrites the holder of the phone number and the
/// holder of the account id; anything else it writes is newly created.
fn capture(
    directory: &IdentityDirectory,
    phone: Option<&PhoneNumber>,
    account: Option<&AccountId>,
) -> Vec<IdentityRecord> {
    let by_phone = phone.and_then(|p| directory.find_by_phone_number(p));
    let by_account = account.and_then(|a| directory.find_by_account_id(a));

    let mut prior: Vec<IdentityRecord> = Vec::with_capacity(2);
    for record in by_phone.into_iter().chain(by_account) {
        if !prior.iter().any(|r| r.local_id == record.local_id) {
            prior.push(record.clone());
        }
    }
    prior
}

/// Restore the pre-resolve state of every record `outcome` touched.
///
/// All touched records are retired before any prior version is reinserted,
/// so the reinserts never collide with a half-applied merge.
fn rollback(
    directory: &mut IdentityDirectory,
    outcome: &MergeOutcome,
    prior: Vec<IdentityRecord>,
) -> Result<(), ParleyError> {
    for change in &outcome.changes {
        directory.retire(change.local_id());
    }
    for record in &prior {
        directory.retire(&record.local_id);
    }
    for record in prior {
        directory.upsert(record)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::SystemClock;
    use parley_test_utils::MemoryStorage;

    fn phone(raw: &str) -> PhoneNumber {
        PhoneNumber::parse(raw).unwrap()
    }

    fn account(raw: &str) -> AccountId {
        AccountId::parse(raw).unwrap()
    }

    fn resolver() -> MergeResolver {
        MergeResolver::new(Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn merge_is_persisted_in_constraint_safe_order() {
        let p = phone("+13215559876");
        let a = IdentityRecord::new(Some(p.clone()), Some(account("other")), chrono::Utc::now());
        let b = IdentityRecord::new(None, Some(account("u1")), chrono::Utc::now());
        let storage = Arc::new(MemoryStorage::with_records([a.clone(), b.clone()]));
        let writer = DirectoryWriter::load(resolver(), storage.clone()).await.unwrap();

        writer.observe(Some(&p), Some(&account("u1")), None).await.unwrap();

        let persisted = storage.get_record(&b.local_id).await.unwrap().unwrap();
        assert_eq!(persisted.phone_number, Some(p));
        let stripped = storage.get_record(&a.local_id).await.unwrap().unwrap();
        assert!(stripped.phone_number.is_none());
    }

    #[tokio::test]
    async fn retired_records_are_deleted_from_storage() {
        let p = phone("+13215559876");
        let a = IdentityRecord::new(Some(p.clone()), None, chrono::Utc::now());
        let b = IdentityRecord::new(None, Some(account("u1")), chrono::Utc::now());
        let storage = Arc::new(MemoryStorage::with_records([a.clone(), b.clone()]));
        let writer = DirectoryWriter::load(resolver(), storage.clone()).await.unwrap();

        writer.observe(Some(&p), Some(&account("u1")), None).await.unwrap();

        assert!(storage.get_record(&a.local_id).await.unwrap().is_none());
        assert_eq!(storage.snapshot().await.len(), 1);
        assert_eq!(writer.len().await, 1);
    }

    #[tokio::test]
    async fn unchanged_outcomes_do_not_write() {
        let storage = Arc::new(MemoryStorage::new());
        let writer = DirectoryWriter::load(resolver(), storage.clone()).await.unwrap();
        let p = phone("+13215559876");

        writer.observe(Some(&p), None, None).await.unwrap();
        writer.observe(Some(&p), None, None).await.unwrap();
        assert_eq!(storage.write_calls(), 1);
    }

    #[tokio::test]
    async fn storage_failure_propagates() {
        let storage = Arc::new(MemoryStorage::new());
        let writer = DirectoryWriter::load(resolver(), storage.clone()).await.unwrap();
        storage.fail_writes(true);
        let result = writer.observe(Some(&phone("+13215559876")), None, None).await;
        assert!(matches!(result, Err(ParleyError::Storage { .. })));
    }

    #[tokio::test]
    async fn failed_merge_write_leaves_memory_matching_storage() {
        let p = phone("+13215559876");
        let u = account("u1");
        let a = IdentityRecord::new(Some(p.clone()), None, chrono::Utc::now());
        let b = IdentityRecord::new(None, Some(u.clone()), chrono::Utc::now());
        let storage = Arc::new(MemoryStorage::with_records([a.clone(), b.clone()]));
        let writer = DirectoryWriter::load(resolver(), storage.clone()).await.unwrap();

        storage.fail_writes(true);
        let failed = writer.observe(Some(&p), Some(&u), None).await;
        assert!(matches!(failed, Err(ParleyError::Storage { .. })));
        assert_eq!(writer.find_by_local_id(&a.local_id).await, Some(a.clone()));
        assert_eq!(writer.find_by_local_id(&b.local_id).await, Some(b.clone()));

        storage.fail_writes(false);
        let retried = writer.observe(Some(&p), Some(&u), None).await.unwrap();
        assert_eq!(retried.kind, crate::resolver::MergeKind::Merged);

        let mut in_memory = writer.records().await;
        let mut on_disk = storage.snapshot().await;
        in_memory.sort_by(|x, y| x.local_id.cmp(&y.local_id));
        on_disk.sort_by(|x, y| x.local_id.cmp(&y.local_id));
        assert_eq!(in_memory, on_disk);
        assert!(storage.get_record(&a.local_id).await.unwrap().is_none());

        // The moved phone number can still be written afterwards.
        writer.mark_unregistered(&p, Some(&u)).await.unwrap();
    }

    #[tokio::test]
    async fn failed_create_is_not_kept_in_memory() {
        let storage = Arc::new(MemoryStorage::new());
        let writer = DirectoryWriter::load(resolver(), storage.clone()).await.unwrap();
        storage.fail_writes(true);

        let p = phone("+13215559876");
        assert!(writer.observe(Some(&p), None, None).await.is_err());
        assert_eq!(writer.len().await, 0);

        storage.fail_writes(false);
        let created = writer.observe(Some(&p), None, None).await.unwrap();
        assert_eq!(created.kind, crate::resolver::MergeKind::Created);
        assert_eq!(storage.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn load_rejects_conflicting_persisted_records() {
        let p = phone("+13215559876");
        let storage = Arc::new(MemoryStorage::with_records([
            IdentityRecord::new(Some(p.clone()), None, chrono::Utc::now()),
            IdentityRecord::new(Some(p), Some(account("u1")), chrono::Utc::now()),
        ]));
        let result = DirectoryWriter::load(resolver(), storage).await;
        assert!(matches!(result, Err(ParleyError::ConflictingIndex { .. })));
    }
}
