// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Parley tests.
//!
//! Provides in-process stand-ins for every external collaborator so the
//! reconciliation engine can be exercised without a network or a disk.
//!
//! # Components
//!
//! - [`MockDirectory`] - scripted lookup results and existence answers, with call capture
//! - [`MemoryStorage`] - `StorageAdapter` over a `HashMap`
//! - [`MemoryCheckpoint`] - `CounterCheckpoint` that records every write
//! - [`ManualClock`] - a clock that only moves when told to

pub mod clock;
pub mod memory;
pub mod mock_directory;

pub use clock::ManualClock;
pub use memory::{MemoryCheckpoint, MemoryStorage};
pub use mock_directory::{Existence, MockDirectory};
