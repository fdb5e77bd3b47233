// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity service facade.
//!
//! Wires the counter, directory writer and lookup coordinator to concrete
//! adapters and exposes the operations the rest of the client calls.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use parley_config::model::ParleyConfig;
use parley_core::types::{AccountId, Arrival, IdentityRecord, LocalId, PhoneNumber};
use parley_core::{Clock, CounterCheckpoint, DirectoryAdapter, ParleyError, StorageAdapter};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::coordinator::{BatchLookupCoordinator, Candidate, ReconcileReport};
use crate::counter::CounterStore;
use crate::resolver::{MergeOutcome, MergeResolver};
use crate::writer::DirectoryWriter;

struct Inner {
    writer: DirectoryWriter,
    coordinator: BatchLookupCoordinator,
    counter: CounterStore,
    storage: Arc<dyn StorageAdapter>,
    clock: Arc<dyn Clock>,
    /// Numbers with a background refresh in flight.
    refreshing: Mutex<HashSet<PhoneNumber>>,
    tasks: TaskTracker,
}

/// Entry point for identity lookups and ordering values.
///
/// Cheap to clone; all clones share one directory, counter and task set.
#[derive(Clone)]
pub struct IdentityService {
    inner: Arc<Inner>,
}

impl IdentityService {
    /// Load persisted records and initialize the ordering counter.
    ///
    /// `storage` must already be initialized.
    pub async fn open(
        config: &ParleyConfig,
        storage: Arc<dyn StorageAdapter>,
        directory: Arc<dyn DirectoryAdapter>,
        checkpoint: Arc<dyn CounterCheckpoint>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ParleyError> {
        let resolver = MergeResolver::new(Arc::clone(&clock));
        let writer = DirectoryWriter::load(resolver, Arc::clone(&storage)).await?;
        let coordinator = BatchLookupCoordinator::new(writer.clone(), directory, &config.lookup);
        let counter = CounterStore::new(
            &config.counter,
            checkpoint,
            Arc::clone(&storage),
            Arc::clone(&clock),
        );
        counter.initialize().await?;
        info!(records = writer.len().await, "identity service ready");

        Ok(Self {
            inner: Arc::new(Inner {
                writer,
                coordinator,
                counter,
                storage,
                clock,
                refreshing: Mutex::new(HashSet::new()),
                tasks: TaskTracker::new(),
            }),
        })
    }

    /// Current account id for `phone`, answered from local knowledge.
    ///
    /// When the number is unresolved a background refresh is started, unless
    /// one is already running for it. Call again once it completes to see
    /// the result.
    pub async fn check_identity(
        &self,
        phone: &PhoneNumber,
    ) -> Result<Option<AccountId>, ParleyError> {
        let known = self
            .inner
            .writer
            .find_by_phone_number(phone)
            .await
            .and_then(|r| r.account_id);
        if known.is_none() {
            self.spawn_refresh(phone.clone());
        }
        Ok(known)
    }

    fn spawn_refresh(&self, phone: PhoneNumber) {
        let Some(claim) = self.claim_refresh(&phone) else {
            debug!(phone = %phone, "refresh already in flight");
            return;
        };

        let service = self.clone();
        self.inner.tasks.spawn(async move {
            let _claim = claim;
            if let Err(e) = service.refresh([Candidate::phone(phone.clone())]).await {
                warn!(phone = %phone, error = %e, "background identity refresh failed");
            }
        });
    }

    /// Mark `phone` as being refreshed, or `None` if a refresh already owns it.
    fn claim_refresh(&self, phone: &PhoneNumber) -> Option<RefreshClaim> {
        let mut refreshing = self
            .inner
            .refreshing
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        refreshing.insert(phone.clone()).then(|| RefreshClaim {
            inner: Arc::clone(&self.inner),
            phone: phone.clone(),
        })
    }

    /// Wait until every background refresh started so far has finished.
    pub async fn wait_for_refreshes(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
    }

    /// Reconcile a locally observed identity (incoming message, manual add).
    pub async fn observe(
        &self,
        phone: Option<&PhoneNumber>,
        account: Option<&AccountId>,
    ) -> Result<MergeOutcome, ParleyError> {
        self.inner.writer.observe(phone, account, None).await
    }

    /// Run a directory refresh for `candidates` and persist the results.
    pub async fn refresh(
        &self,
        candidates: impl IntoIterator<Item = Candidate>,
    ) -> Result<ReconcileReport, ParleyError> {
        self.inner.coordinator.reconcile(candidates).await
    }

    /// Refresh every record that has a phone number.
    pub async fn refresh_all(&self) -> Result<ReconcileReport, ParleyError> {
        let records = self.inner.writer.records().await;
        self.refresh(records.iter().map(Candidate::from)).await
    }

    pub fn next_ordering_value(&self) -> Result<u64, ParleyError> {
        self.inner.counter.next()
    }

    /// Stamp a new ordering value onto an arrival from `local_id` and persist it.
    pub async fn admit_arrival(&self, local_id: &LocalId) -> Result<Arrival, ParleyError> {
        let arrival = Arrival {
            id: uuid::Uuid::new_v4().to_string(),
            local_id: local_id.clone(),
            counter: self.inner.counter.next()?,
            received_at: self.inner.clock.now(),
        };
        self.inner.storage.record_arrival(&arrival).await?;
        debug!(id = %arrival.id, counter = arrival.counter, "arrival admitted");
        Ok(arrival)
    }

    pub async fn find_by_phone_number(&self, phone: &PhoneNumber) -> Option<IdentityRecord> {
        self.inner.writer.find_by_phone_number(phone).await
    }

    pub async fn find_by_account_id(&self, account: &AccountId) -> Option<IdentityRecord> {
        self.inner.writer.find_by_account_id(account).await
    }

    pub async fn find_by_local_id(&self, local_id: &LocalId) -> Option<IdentityRecord> {
        self.inner.writer.find_by_local_id(local_id).await
    }

    pub async fn records(&self) -> Vec<IdentityRecord> {
        self.inner.writer.records().await
    }

    /// Wait for background refreshes, flush the counter and close storage.
    pub async fn shutdown(&self) -> Result<(), ParleyError> {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.counter.shutdown().await?;
        self.inner.storage.close().await?;
        info!("identity service shut down");
        Ok(())
    }
}

/// Ownership of one in-flight refresh. Dropping it, on any exit path of the
/// refresh task, releases the number.
struct RefreshClaim {
    inner: Arc<Inner>,
    phone: PhoneNumber,
}

impl Drop for RefreshClaim {
    fn drop(&mut self) {
        self.inner
            .refreshing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.phone);
    }
}
