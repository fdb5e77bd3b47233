// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Counter checkpoint trait: the small persisted scalar kept outside the
//! main durable store.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;

#[async_trait]
pub trait CounterCheckpoint: PluginAdapter {
    /// Last persisted counter value, or `None` if nothing was ever written.
    async fn load(&self) -> Result<Option<u64>, ParleyError>;

    async fn store(&self, value: u64) -> Result<(), ParleyError>;
}
