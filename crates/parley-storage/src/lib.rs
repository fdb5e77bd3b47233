// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Parley identity subsystem.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, typed queries for identity records
//! and timeline arrivals, and a file-backed counter checkpoint.

pub mod adapter;
pub mod checkpoint;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteStorage;
pub use checkpoint::FileCheckpoint;
pub use database::Database;
