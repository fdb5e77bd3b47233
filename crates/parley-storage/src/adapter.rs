// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use parley_config::model::StorageConfig;
use parley_core::types::{Arrival, IdentityRecord, LocalId, RecordChange};
use parley_core::{AdapterType, HealthStatus, ParleyError, PluginAdapter, StorageAdapter};

use crate::database::{map_tr_err, Database};
use crate::queries;

/// SQLite-backed identity store.
///
/// The database is opened on the first call to [`StorageAdapter::initialize`];
/// every other operation fails with a storage error until then.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, ParleyError> {
        self.db.get().ok_or_else(|| ParleyError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        self.db()?
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), ParleyError> {
        let path = &self.config.database_path;
        let db = Database::open_with(path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| ParleyError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ParleyError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    async fn get_record(&self, local_id: &LocalId) -> Result<Option<IdentityRecord>, ParleyError> {
        queries::records::get_record(self.db()?, local_id).await
    }

    async fn put_record(&self, record: &IdentityRecord) -> Result<(), ParleyError> {
        queries::records::upsert_record(self.db()?, record).await
    }

    async fn remove_record(&self, local_id: &LocalId) -> Result<(), ParleyError> {
        queries::records::remove_record(self.db()?, local_id).await
    }

    async fn apply_changes(&self, changes: &[RecordChange]) -> Result<(), ParleyError> {
        queries::records::apply_changes(self.db()?, changes).await
    }

    async fn list_records(&self) -> Result<Vec<IdentityRecord>, ParleyError> {
        queries::records::list_records(self.db()?).await
    }

    async fn max_counter_value(&self) -> Result<Option<u64>, ParleyError> {
        queries::arrivals::max_counter(self.db()?).await
    }

    async fn record_arrival(&self, arrival: &Arrival) -> Result<(), ParleyError> {
        queries::arrivals::insert_arrival(self.db()?, arrival).await
    }
}
