// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;

use parley_core::ParleyError;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::migrations;

/// Convert tokio-rusqlite errors into [`ParleyError::Storage`].
pub fn map_tr_err(e: tokio_rusqlite::Error) -> ParleyError {
    ParleyError::Storage {
        source: Box::new(e),
    }
}

/// Handle to the single SQLite connection.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path` in WAL mode and run migrations.
    pub async fn open(path: &str) -> Result<Self, ParleyError> {
        Self::open_with(path, true).await
    }

    /// Open the database with an explicit journal mode choice.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, ParleyError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ParleyError::Storage {
                    source: Box::new(e),
                })?;
        }

        let conn = Connection::open(path)
            .await
            .map_err(|e| map_tr_err(e.into()))?;
        let db = Self { conn };
        db.prepare(wal_mode).await?;
        debug!(path, wal_mode, "database opened");
        Ok(db)
    }

    /// Open a private in-memory database (tests, dry runs).
    pub async fn open_in_memory() -> Result<Self, ParleyError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| map_tr_err(e.into()))?;
        let db = Self { conn };
        db.prepare(false).await?;
        Ok(db)
    }

    async fn prepare(&self, wal_mode: bool) -> Result<(), ParleyError> {
        let journal = if wal_mode { "WAL" } else { "DELETE" };
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch(&format!(
                    "PRAGMA journal_mode = {journal};
                     PRAGMA synchronous = NORMAL;
                     PRAGMA busy_timeout = 5000;"
                ))?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        self.conn
            .call(|conn| -> Result<Result<(), ParleyError>, rusqlite::Error> {
                Ok(migrations::run_migrations(conn))
            })
            .await
            .map_err(map_tr_err)?
    }

    /// The underlying connection. Query modules call through it.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoint the WAL into the main database file.
    pub async fn checkpoint(&self) -> Result<(), ParleyError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint and close the connection.
    pub async fn close(self) -> Result<(), ParleyError> {
        self.checkpoint().await?;
        self.conn.close().await.map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_file_and_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("parley.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        assert!(path.exists());

        let tables = db
            .connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .unwrap();
        assert!(tables.contains(&"identity_records".to_string()));
        assert!(tables.contains(&"arrivals".to_string()));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_does_not_rerun_migrations() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reopen.db");
        let path = path.to_str().unwrap();

        Database::open(path).await.unwrap().close().await.unwrap();
        let db = Database::open(path).await.unwrap();
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn in_memory_database_has_schema() {
        let db = Database::open_in_memory().await.unwrap();
        let count = db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT COUNT(*) FROM identity_records", [], |row| row.get(0))
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
