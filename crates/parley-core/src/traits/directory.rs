// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Directory adapter trait for the remote account directory service.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{AccountSubject, LookupResult, PhoneNumber};

/// Adapter for the remote directory: batched lookups plus authoritative
/// existence checks.
#[async_trait]
pub trait DirectoryAdapter: PluginAdapter {
    /// Look up a batch of phone numbers.
    ///
    /// Numbers with no account are omitted from the returned map. Omission is
    /// not proof of deregistration.
    async fn lookup(
        &self,
        phone_numbers: &[PhoneNumber],
    ) -> Result<HashMap<PhoneNumber, LookupResult>, ParleyError>;

    /// Ask whether an account currently exists for the subject.
    async fn exists(&self, subject: &AccountSubject) -> Result<bool, ParleyError>;
}
