// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock directory adapter for deterministic testing.
//!
//! `MockDirectory` answers lookups from a scripted result table and existence
//! checks from a scripted answer table. Every call is captured so tests can
//! assert on batching, deduplication and concurrency.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use parley_core::types::{
    AccountId, AccountSubject, AdapterType, HealthStatus, LookupResult, PhoneNumber,
};
use parley_core::{DirectoryAdapter, ParleyError, PluginAdapter};

/// Scripted answer for one existence check subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Existence {
    Exists,
    Missing,
    /// The check itself fails (network error, 5xx).
    Error,
}

/// A directory adapter with pre-configured answers.
///
/// Numbers without a scripted result are omitted from lookup responses.
/// Subjects without a scripted existence answer are reported as existing.
pub struct MockDirectory {
    results: Mutex<HashMap<PhoneNumber, LookupResult>>,
    failing_numbers: Mutex<HashSet<PhoneNumber>>,
    existence: Mutex<HashMap<AccountSubject, Existence>>,
    lookup_calls: Mutex<Vec<Vec<PhoneNumber>>>,
    exists_calls: Mutex<Vec<AccountSubject>>,
    lookup_delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    unhealthy: AtomicBool,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(HashMap::new()),
            failing_numbers: Mutex::new(HashSet::new()),
            existence: Mutex::new(HashMap::new()),
            lookup_calls: Mutex::new(Vec::new()),
            exists_calls: Mutex::new(Vec::new()),
            lookup_delay: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            unhealthy: AtomicBool::new(false),
        }
    }

    /// Script a lookup hit for `phone`.
    pub fn with_result(mut self, phone: &PhoneNumber, account: &AccountId) -> Self {
        self.results.get_mut().insert(
            phone.clone(),
            LookupResult {
                account_id: account.clone(),
                secondary_id: None,
            },
        );
        self
    }

    /// Script a lookup hit carrying a secondary id.
    pub fn with_secondary_result(
        mut self,
        phone: &PhoneNumber,
        account: &AccountId,
        secondary_id: &str,
    ) -> Self {
        self.results.get_mut().insert(
            phone.clone(),
            LookupResult {
                account_id: account.clone(),
                secondary_id: Some(secondary_id.to_string()),
            },
        );
        self
    }

    /// Any batch containing `phone` fails with `LookupFailed`.
    pub fn with_failing_number(mut self, phone: &PhoneNumber) -> Self {
        self.failing_numbers.get_mut().insert(phone.clone());
        self
    }

    pub fn with_existence(mut self, subject: AccountSubject, answer: Existence) -> Self {
        self.existence.get_mut().insert(subject, answer);
        self
    }

    /// Hold each lookup for `delay` before answering.
    pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
        *self.lookup_delay.get_mut() = Some(delay);
        self
    }

    pub async fn set_result(&self, phone: &PhoneNumber, account: &AccountId) {
        self.results.lock().await.insert(
            phone.clone(),
            LookupResult {
                account_id: account.clone(),
                secondary_id: None,
            },
        );
    }

    pub async fn clear_result(&self, phone: &PhoneNumber) {
        self.results.lock().await.remove(phone);
    }

    pub async fn set_existence(&self, subject: AccountSubject, answer: Existence) {
        self.existence.lock().await.insert(subject, answer);
    }

    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.unhealthy.store(unhealthy, Ordering::SeqCst);
    }

    /// Every lookup batch received, in arrival order.
    pub async fn lookup_calls(&self) -> Vec<Vec<PhoneNumber>> {
        self.lookup_calls.lock().await.clone()
    }

    /// Every existence check subject received, in arrival order.
    pub async fn exists_calls(&self) -> Vec<AccountSubject> {
        self.exists_calls.lock().await.clone()
    }

    /// Highest number of lookups observed in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockDirectory {
    fn name(&self) -> &str {
        "mock-directory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Directory
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        if self.unhealthy.load(Ordering::SeqCst) {
            Ok(HealthStatus::Unhealthy("scripted outage".into()))
        } else {
            Ok(HealthStatus::Healthy)
        }
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl DirectoryAdapter for MockDirectory {
    async fn lookup(
        &self,
        phone_numbers: &[PhoneNumber],
    ) -> Result<HashMap<PhoneNumber, LookupResult>, ParleyError> {
        self.lookup_calls.lock().await.push(phone_numbers.to_vec());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = *self.lookup_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failing = self.failing_numbers.lock().await;
        if let Some(bad) = phone_numbers.iter().find(|p| failing.contains(*p)) {
            return Err(ParleyError::LookupFailed {
                message: format!("scripted failure for batch containing {bad}"),
                source: None,
            });
        }
        drop(failing);

        let results = self.results.lock().await;
        Ok(phone_numbers
            .iter()
            .filter_map(|p| results.get(p).map(|r| (p.clone(), r.clone())))
            .collect())
    }

    async fn exists(&self, subject: &AccountSubject) -> Result<bool, ParleyError> {
        self.exists_calls.lock().await.push(subject.clone());
        match self.existence.lock().await.get(subject).copied() {
            Some(Existence::Missing) => Ok(false),
            Some(Existence::Error) => Err(ParleyError::ExistenceCheckFailed {
                message: format!("scripted failure for {subject}"),
                source: None,
            }),
            Some(Existence::Exists) | None => Ok(true),
        }
    }
}
