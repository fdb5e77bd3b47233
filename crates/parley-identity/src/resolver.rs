// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Merge resolver: reconciles one `(phone, account)` observation against the
//! directory.
//!
//! Decision table, checked in order, for an observation carrying both a phone
//! number P and an account id U:
//!
//! | record for P | record for U | outcome                                   |
//! |--------------|--------------|-------------------------------------------|
//! | none         | none         | create a record holding P and U           |
//! | A            | none         | attach U to A, clear `unregistered_at`    |
//! | none         | B            | attach P to B                             |
//! | A == B       |              | no-op                                     |
//! | A != B       |              | strip P from A, attach P to B, B survives |
//!
//! Every decision is applied to the directory before returning, so callers
//! holding the directory lock never act on a stale view.

use std::sync::Arc;

use parley_core::types::{AccountId, IdentityRecord, LocalId, PhoneNumber, RecordChange};
use parley_core::{Clock, ParleyError};
use tracing::{debug, info};

use crate::directory::IdentityDirectory;

/// Which branch of the decision table an observation took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeKind {
    /// A new record was created.
    Created,
    /// An account id was attached to the record holding the phone number.
    AttachedAccount,
    /// A phone number was attached to the record holding the account id.
    AttachedPhone,
    /// Two records were merged into the account holder.
    Merged,
    /// The phone number's record was marked unregistered.
    Unregistered,
    /// Nothing changed.
    Unchanged,
}

/// Result of one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub kind: MergeKind,
    /// The record now holding the observed identity, if any. After a merge
    /// this is the account holder; references to retired ids should be
    /// redirected here.
    pub survivor: Option<LocalId>,
    /// Writes to persist, in the order they were applied.
    pub changes: Vec<RecordChange>,
}

impl MergeOutcome {
    fn unchanged(survivor: Option<LocalId>) -> Self {
        Self {
            kind: MergeKind::Unchanged,
            survivor,
            changes: Vec::new(),
        }
    }

    pub fn is_unchanged(&self) -> bool {
        self.changes.is_empty()
    }

    /// Records written by this outcome.
    pub fn changed(&self) -> impl Iterator<Item = &IdentityRecord> {
        self.changes.iter().filter_map(|c| match c {
            RecordChange::Put(record) => Some(record),
            RecordChange::Remove(_) => None,
        })
    }

    /// Local ids retired by this outcome.
    pub fn retired(&self) -> impl Iterator<Item = &LocalId> {
        self.changes.iter().filter_map(|c| match c {
            RecordChange::Remove(id) => Some(id),
            RecordChange::Put(_) => None,
        })
    }
}

/// Applies the reconciliation rules to an [`IdentityDirectory`].
#[derive(Clone)]
pub struct MergeResolver {
    clock: Arc<dyn Clock>,
}

impl MergeResolver {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Reconcile an observation of `phone` and/or `account`.
    ///
    /// `secondary_id`, when given, replaces the stored secondary id of the
    /// record that ends up holding the identity. An observation with neither
    /// identifier is rejected.
    pub fn resolve(
        &self,
        directory: &mut IdentityDirectory,
        phone: Option<&PhoneNumber>,
        account: Option<&AccountId>,
        secondary_id: Option<&str>,
    ) -> Result<MergeOutcome, ParleyError> {
        match (phone, account) {
            (Some(p), Some(a)) => self.resolve_pair(directory, p, a, secondary_id),
            (Some(p), None) => self.resolve_phone_only(directory, p),
            (None, Some(a)) => self.resolve_account_only(directory, a, secondary_id),
            (None, None) => Err(ParleyError::InvalidIdentifier(
                "observation carries neither a phone number nor an account id".into(),
            )),
        }
    }

    /// Handle an explicit "no account exists" answer for `phone`.
    ///
    /// `verified_account` is the account id the record held when the
    /// existence check was issued. If the record has changed since, the
    /// answer is stale and ignored.
    pub fn mark_unregistered(
        &self,
        directory: &mut IdentityDirectory,
        phone: &PhoneNumber,
        verified_account: Option<&AccountId>,
    ) -> Result<MergeOutcome, ParleyError> {
        let Some(existing) = directory.find_by_phone_number(phone) else {
            return Ok(MergeOutcome::unchanged(None));
        };
        if existing.account_id.as_ref() != verified_account {
            debug!(
                phone = %phone,
                local_id = %existing.local_id,
                "ignoring stale unregistration: account changed since the check"
            );
            return Ok(MergeOutcome::unchanged(Some(existing.local_id.clone())));
        }

        let mut record = existing.clone();
        let now = self.clock.now();
        record.account_id = None;
        record.unregistered_at = Some(now);
        record.updated_at = now;
        info!(phone = %phone, local_id = %record.local_id, "marked unregistered");

        let survivor = record.local_id.clone();
        directory.upsert(record.clone())?;
        Ok(MergeOutcome {
            kind: MergeKind::Unregistered,
            survivor: Some(survivor),
            changes: vec![RecordChange::Put(record)],
        })
    }

    fn resolve_pair(
        &self,
        directory: &mut IdentityDirectory,
        phone: &PhoneNumber,
        account: &AccountId,
        secondary_id: Option<&str>,
    ) -> Result<MergeOutcome, ParleyError> {
        let by_phone = directory.find_by_phone_number(phone).cloned();
        let by_account = directory.find_by_account_id(account).cloned();
        let now = self.clock.now();

        match (by_phone, by_account) {
            (None, None) => {
                let mut record = IdentityRecord::new(Some(phone.clone()), Some(account.clone()), now);
                record.secondary_id = secondary_id.map(str::to_string);
                self.commit(directory, MergeKind::Created, vec![record], None)
            }
            (Some(mut a), None) => {
                if let Some(previous) = &a.account_id {
                    debug!(phone = %phone, old = %previous, new = %account, "replacing account id");
                }
                a.account_id = Some(account.clone());
                a.unregistered_at = None;
                apply_secondary(&mut a, secondary_id);
                a.updated_at = now;
                self.commit(directory, MergeKind::AttachedAccount, vec![a], None)
            }
            (None, Some(mut b)) => {
                b.phone_number = Some(phone.clone());
                b.unregistered_at = None;
                apply_secondary(&mut b, secondary_id);
                b.updated_at = now;
                self.commit(directory, MergeKind::AttachedPhone, vec![b], None)
            }
            (Some(a), Some(mut b)) if a.local_id == b.local_id => {
                let before = b.clone();
                b.unregistered_at = None;
                apply_secondary(&mut b, secondary_id);
                if b == before {
                    return Ok(MergeOutcome::unchanged(Some(b.local_id)));
                }
                b.updated_at = now;
                self.commit(directory, MergeKind::Unchanged, vec![b], None)
            }
            (Some(mut a), Some(mut b)) => {
                a.phone_number = None;
                a.updated_at = now;
                b.phone_number = Some(phone.clone());
                b.unregistered_at = None;
                apply_secondary(&mut b, secondary_id);
                b.updated_at = now;
                info!(
                    phone = %phone,
                    account = %account,
                    subsumed = %a.local_id,
                    survivor = %b.local_id,
                    "merging identity records"
                );
                if a.is_empty() {
                    let retired = a.local_id.clone();
                    self.commit(directory, MergeKind::Merged, vec![b], Some(retired))
                } else {
                    // A keeps its own account id; only the phone number moves.
                    self.commit(directory, MergeKind::Merged, vec![a, b], None)
                }
            }
        }
    }

    fn resolve_phone_only(
        &self,
        directory: &mut IdentityDirectory,
        phone: &PhoneNumber,
    ) -> Result<MergeOutcome, ParleyError> {
        if let Some(existing) = directory.find_by_phone_number(phone) {
            return Ok(MergeOutcome::unchanged(Some(existing.local_id.clone())));
        }
        let record = IdentityRecord::new(Some(phone.clone()), None, self.clock.now());
        self.commit(directory, MergeKind::Created, vec![record], None)
    }

    fn resolve_account_only(
        &self,
        directory: &mut IdentityDirectory,
        account: &AccountId,
        secondary_id: Option<&str>,
    ) -> Result<MergeOutcome, ParleyError> {
        let now = self.clock.now();
        match directory.find_by_account_id(account).cloned() {
            Some(mut existing) => {
                let before = existing.clone();
                apply_secondary(&mut existing, secondary_id);
                if existing == before {
                    return Ok(MergeOutcome::unchanged(Some(existing.local_id)));
                }
                existing.updated_at = now;
                self.commit(directory, MergeKind::Unchanged, vec![existing], None)
            }
            None => {
                let mut record = IdentityRecord::new(None, Some(account.clone()), now);
                record.secondary_id = secondary_id.map(str::to_string);
                self.commit(directory, MergeKind::Created, vec![record], None)
            }
        }
    }

    /// Retire first, then upsert in order. The last record written survives.
    fn commit(
        &self,
        directory: &mut IdentityDirectory,
        kind: MergeKind,
        writes: Vec<IdentityRecord>,
        retire: Option<LocalId>,
    ) -> Result<MergeOutcome, ParleyError> {
        let mut changes = Vec::with_capacity(writes.len() + 1);
        if let Some(id) = retire {
            directory.retire(&id);
            changes.push(RecordChange::Remove(id));
        }
        let survivor = writes.last().map(|r| r.local_id.clone());
        for record in writes {
            directory.upsert(record.clone())?;
            changes.push(RecordChange::Put(record));
        }
        Ok(MergeOutcome {
            kind,
            survivor,
            changes,
        })
    }
}

fn apply_secondary(record: &mut IdentityRecord, secondary_id: Option<&str>) {
    if let Some(secondary) = secondary_id {
        record.secondary_id = Some(secondary.to_string());
    }
}
