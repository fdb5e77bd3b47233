// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batch lookup coordinator.
//!
//! Refreshes a set of candidates against the remote directory:
//!
//! 1. drop candidates without a phone number and collapse duplicates;
//! 2. split the rest into batches and look them up, several at a time;
//! 3. route every hit through the resolver;
//! 4. for every miss with a local record, ask the authoritative existence
//!    check and unregister only on an explicit `false`.
//!
//! Remote failures are logged and counted, never returned. The next refresh
//! simply retries the affected numbers.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use parley_config::model::LookupConfig;
use parley_core::types::{AccountSubject, IdentityRecord, PhoneNumber};
use parley_core::{DirectoryAdapter, ParleyError};
use tracing::{debug, info, warn};

use crate::resolver::{MergeKind, MergeOutcome};
use crate::writer::DirectoryWriter;

/// One number to refresh, taken from a record or given bare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub phone_number: Option<PhoneNumber>,
}

impl Candidate {
    pub fn phone(phone: PhoneNumber) -> Self {
        Self {
            phone_number: Some(phone),
        }
    }
}

impl From<&IdentityRecord> for Candidate {
    fn from(record: &IdentityRecord) -> Self {
        Self {
            phone_number: record.phone_number.clone(),
        }
    }
}

impl From<PhoneNumber> for Candidate {
    fn from(phone: PhoneNumber) -> Self {
        Self::phone(phone)
    }
}

/// Summary of one refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Distinct phone numbers sent to the directory.
    pub looked_up: usize,
    /// Numbers whose lookup returned an account id.
    pub resolved: usize,
    /// Records marked unregistered.
    pub unregistered: usize,
    pub failed_batches: usize,
    pub failed_existence_checks: usize,
    /// Every outcome that changed the directory, in application order.
    pub outcomes: Vec<MergeOutcome>,
}

impl ReconcileReport {
    fn record(&mut self, outcome: MergeOutcome) {
        if !outcome.is_unchanged() {
            self.outcomes.push(outcome);
        }
    }
}

/// Drives batched lookups and feeds their results to the directory writer.
#[derive(Clone)]
pub struct BatchLookupCoordinator {
    writer: DirectoryWriter,
    directory: Arc<dyn DirectoryAdapter>,
    max_batch_size: usize,
    max_concurrent_batches: usize,
}

impl BatchLookupCoordinator {
    pub fn new(
        writer: DirectoryWriter,
        directory: Arc<dyn DirectoryAdapter>,
        config: &LookupConfig,
    ) -> Self {
        Self {
            writer,
            directory,
            max_batch_size: config.max_batch_size.max(1),
            max_concurrent_batches: config.max_concurrent_batches.max(1),
        }
    }

    /// Refresh `candidates`.
    ///
    /// Only errors that mean the directory or the store is inconsistent
    /// (`ConflictingIndex`, storage failures) are returned.
    pub async fn reconcile(
        &self,
        candidates: impl IntoIterator<Item = Candidate>,
    ) -> Result<ReconcileReport, ParleyError> {
        let mut seen = HashSet::new();
        let phones: Vec<PhoneNumber> = candidates
            .into_iter()
            .filter_map(|c| c.phone_number)
            .filter(|p| seen.insert(p.clone()))
            .collect();

        let mut report = ReconcileReport::default();
        if phones.is_empty() {
            debug!("no candidates with a phone number, skipping lookup");
            return Ok(report);
        }
        report.looked_up = phones.len();

        let batches: Vec<Vec<PhoneNumber>> =
            phones.chunks(self.max_batch_size).map(<[_]>::to_vec).collect();
        debug!(
            numbers = phones.len(),
            batches = batches.len(),
            "starting directory refresh"
        );

        // Drain every lookup before taking the writer lock, so applying one
        // batch never stalls the lookups still in flight.
        let directory = &self.directory;
        let responses: Vec<_> = stream::iter(batches)
            .map(|batch| async move {
                let result = directory.lookup(&batch).await;
                (batch, result)
            })
            .buffer_unordered(self.max_concurrent_batches)
            .collect()
            .await;

        let mut misses = Vec::new();
        for (batch, result) in responses {
            let mut results = match result {
                Ok(results) => results,
                Err(e) => {
                    warn!(error = %e, size = batch.len(), "directory lookup batch failed");
                    report.failed_batches += 1;
                    continue;
                }
            };
            for phone in batch {
                match results.remove(&phone) {
                    Some(hit) => {
                        let outcome = self
                            .writer
                            .observe(
                                Some(&phone),
                                Some(&hit.account_id),
                                hit.secondary_id.as_deref(),
                            )
                            .await?;
                        report.resolved += 1;
                        report.record(outcome);
                    }
                    None => misses.push(phone),
                }
            }
        }

        for phone in misses {
            self.check_unregistered(&phone, &mut report).await?;
        }

        info!(
            looked_up = report.looked_up,
            resolved = report.resolved,
            unregistered = report.unregistered,
            failed_batches = report.failed_batches,
            failed_existence_checks = report.failed_existence_checks,
            "directory refresh finished"
        );
        Ok(report)
    }

    /// Existence check for a number the lookup omitted.
    ///
    /// The subject is the record's account id when it has one, otherwise the
    /// phone number itself. Numbers without a local record are skipped.
    async fn check_unregistered(
        &self,
        phone: &PhoneNumber,
        report: &mut ReconcileReport,
    ) -> Result<(), ParleyError> {
        let Some(record) = self.writer.find_by_phone_number(phone).await else {
            return Ok(());
        };
        let verified = record.account_id.clone();
        let subject = match &verified {
            Some(account) => AccountSubject::Account(account.clone()),
            None => AccountSubject::PhoneNumber(phone.clone()),
        };

        match self.directory.exists(&subject).await {
            Ok(true) => {
                debug!(%subject, "lookup omitted number but account exists");
                Ok(())
            }
            Ok(false) => {
                let outcome = self.writer.mark_unregistered(phone, verified.as_ref()).await?;
                if outcome.kind == MergeKind::Unregistered {
                    report.unregistered += 1;
                }
                report.record(outcome);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, %subject, "existence check failed, leaving record unchanged");
                report.failed_existence_checks += 1;
                Ok(())
            }
        }
    }
}
