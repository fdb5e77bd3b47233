// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory identity directory.
//!
//! Records live in one map keyed by local id. Two index maps point from phone
//! number and account id back to the owning local id. Records never carry back
//! references; the indices are the only link.

use std::collections::HashMap;

use parley_core::types::{AccountId, IdentityRecord, IndexField, LocalId, PhoneNumber};
use parley_core::ParleyError;

/// The set of known identity records, indexed by each identifier.
///
/// Every mutation either updates the record map and both indices, or
/// changes nothing.
#[derive(Debug, Default, Clone)]
pub struct IdentityDirectory {
    records: HashMap<LocalId, IdentityRecord>,
    by_phone: HashMap<PhoneNumber, LocalId>,
    by_account: HashMap<AccountId, LocalId>,
}

impl IdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from persisted records.
    ///
    /// Each record goes through [`upsert`](Self::upsert), so conflicting
    /// persisted state is rejected rather than silently indexed.
    pub fn from_records(
        records: impl IntoIterator<Item = IdentityRecord>,
    ) -> Result<Self, ParleyError> {
        let mut directory = Self::new();
        for record in records {
            directory.upsert(record)?;
        }
        Ok(directory)
    }

    pub fn find_by_phone_number(&self, phone: &PhoneNumber) -> Option<&IdentityRecord> {
        self.by_phone.get(phone).and_then(|id| self.records.get(id))
    }

    pub fn find_by_account_id(&self, account: &AccountId) -> Option<&IdentityRecord> {
        self.by_account.get(account).and_then(|id| self.records.get(id))
    }

    pub fn find_by_local_id(&self, local_id: &LocalId) -> Option<&IdentityRecord> {
        self.records.get(local_id)
    }

    /// Insert a record or replace the stored version with the same local id.
    ///
    /// Fails with [`ParleyError::ConflictingIndex`] when another record
    /// already holds the phone number or account id. A record holding
    /// neither identifier is dropped instead of stored.
    pub fn upsert(&mut self, record: IdentityRecord) -> Result<(), ParleyError> {
        if record.is_empty() {
            self.retire(&record.local_id);
            return Ok(());
        }

        if let Some(phone) = &record.phone_number
            && let Some(holder) = self.by_phone.get(phone)
            && *holder != record.local_id
        {
            return Err(ParleyError::ConflictingIndex {
                field: IndexField::PhoneNumber,
                value: phone.to_string(),
                existing: holder.clone(),
                incoming: record.local_id.clone(),
            });
        }
        if let Some(account) = &record.account_id
            && let Some(holder) = self.by_account.get(account)
            && *holder != record.local_id
        {
            return Err(ParleyError::ConflictingIndex {
                field: IndexField::AccountId,
                value: account.to_string(),
                existing: holder.clone(),
                incoming: record.local_id.clone(),
            });
        }

        // Checks passed; nothing below can fail.
        if let Some(previous) = self.records.get(&record.local_id) {
            if previous.phone_number != record.phone_number
                && let Some(old) = &previous.phone_number
            {
                self.by_phone.remove(old);
            }
            if previous.account_id != record.account_id
                && let Some(old) = &previous.account_id
            {
                self.by_account.remove(old);
            }
        }
        if let Some(phone) = &record.phone_number {
            self.by_phone.insert(phone.clone(), record.local_id.clone());
        }
        if let Some(account) = &record.account_id {
            self.by_account.insert(account.clone(), record.local_id.clone());
        }
        self.records.insert(record.local_id.clone(), record);
        Ok(())
    }

    /// Remove a record and its index entries, returning it if it was present.
    pub fn retire(&mut self, local_id: &LocalId) -> Option<IdentityRecord> {
        let record = self.records.remove(local_id)?;
        if let Some(phone) = &record.phone_number {
            self.by_phone.remove(phone);
        }
        if let Some(account) = &record.account_id {
            self.by_account.remove(account);
        }
        Some(record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over all records in unspecified order.
    pub fn records(&self) -> impl Iterator<Item = &IdentityRecord> {
        self.records.values()
    }

    /// Panics if an index entry and its record disagree.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        for (phone, id) in &self.by_phone {
            let record = &self.records[id];
            assert_eq!(record.phone_number.as_ref(), Some(phone));
        }
        for (account, id) in &self.by_account {
            let record = &self.records[id];
            assert_eq!(record.account_id.as_ref(), Some(account));
        }
        for record in self.records.values() {
            assert!(!record.is_empty(), "empty record {} retained", record.local_id);
            if let Some(phone) = &record.phone_number {
                assert_eq!(self.by_phone.get(phone), Some(&record.local_id));
            }
            if let Some(account) = &record.account_id {
                assert_eq!(self.by_account.get(account), Some(&record.local_id));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn phone(raw: &str) -> PhoneNumber {
        PhoneNumber::parse(raw).unwrap()
    }

    fn account(raw: &str) -> AccountId {
        AccountId::parse(raw).unwrap()
    }

    fn record(p: Option<&str>, a: Option<&str>) -> IdentityRecord {
        IdentityRecord::new(p.map(phone), a.map(account), Utc::now())
    }

    #[test]
    fn finds_by_every_key() {
        let mut dir = IdentityDirectory::new();
        let r = record(Some("+13215559876"), Some("u1"));
        dir.upsert(r.clone()).unwrap();

        assert_eq!(dir.find_by_phone_number(&phone("+13215559876")), Some(&r));
        assert_eq!(dir.find_by_account_id(&account("U1")), Some(&r));
        assert_eq!(dir.find_by_local_id(&r.local_id), Some(&r));
        assert_eq!(dir.len(), 1);
        dir.assert_consistent();
    }

    #[test]
    fn upsert_in_place_moves_index_entries() {
        let mut dir = IdentityDirectory::new();
        let mut r = record(Some("+13215559876"), Some("u1"));
        dir.upsert(r.clone()).unwrap();

        r.phone_number = Some(phone("+16545559876"));
        r.account_id = None;
        dir.upsert(r.clone()).unwrap();

        assert!(dir.find_by_phone_number(&phone("+13215559876")).is_none());
        assert!(dir.find_by_account_id(&account("u1")).is_none());
        assert_eq!(dir.find_by_phone_number(&phone("+16545559876")), Some(&r));
        dir.assert_consistent();
    }

    #[test]
    fn conflicting_phone_is_rejected_without_side_effects() {
        let mut dir = IdentityDirectory::new();
        let a = record(Some("+13215559876"), None);
        dir.upsert(a.clone()).unwrap();

        let b = record(Some("+13215559876"), Some("u2"));
        let err = dir.upsert(b.clone()).unwrap_err();
        match err {
            ParleyError::ConflictingIndex {
                field,
                existing,
                incoming,
                ..
            } => {
                assert_eq!(field, IndexField::PhoneNumber);
                assert_eq!(existing, a.local_id);
                assert_eq!(incoming, b.local_id);
            }
            other => panic!("unexpected error: {other}"),
        }
        // The account index must not have been touched by the failed upsert.
        assert!(dir.find_by_account_id(&account("u2")).is_none());
        assert_eq!(dir.len(), 1);
        dir.assert_consistent();
    }

    #[test]
    fn conflicting_account_is_rejected() {
        let mut dir = IdentityDirectory::new();
        dir.upsert(record(None, Some("u1"))).unwrap();
        let err = dir.upsert(record(Some("+13215559876"), Some("u1"))).unwrap_err();
        assert!(matches!(
            err,
            ParleyError::ConflictingIndex {
                field: IndexField::AccountId,
                ..
            }
        ));
    }

    #[test]
    fn empty_record_is_dropped() {
        let mut dir = IdentityDirectory::new();
        let mut r = record(Some("+13215559876"), None);
        dir.upsert(r.clone()).unwrap();

        r.phone_number = None;
        dir.upsert(r.clone()).unwrap();
        assert!(dir.is_empty());
        assert!(dir.find_by_phone_number(&phone("+13215559876")).is_none());

        dir.upsert(record(None, None)).unwrap();
        assert!(dir.is_empty());
    }

    #[test]
    fn retire_clears_indices() {
        let mut dir = IdentityDirectory::new();
        let r = record(Some("+13215559876"), Some("u1"));
        dir.upsert(r.clone()).unwrap();

        assert_eq!(dir.retire(&r.local_id), Some(r.clone()));
        assert!(dir.retire(&r.local_id).is_none());
        assert!(dir.find_by_phone_number(&phone("+13215559876")).is_none());
        assert!(dir.find_by_account_id(&account("u1")).is_none());
        dir.assert_consistent();
    }

    #[test]
    fn from_records_rejects_conflicting_state() {
        let ok = IdentityDirectory::from_records([
            record(Some("+13215559876"), None),
            record(None, Some("u1")),
        ])
        .unwrap();
        assert_eq!(ok.records().count(), 2);

        let clash = IdentityDirectory::from_records([
            record(Some("+13215559876"), None),
            record(Some("+13215559876"), Some("u1")),
        ]);
        assert!(clash.is_err());
    }
}
