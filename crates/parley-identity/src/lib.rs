// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity reconciliation engine for the Parley messaging client.
//!
//! Keeps the mapping between phone numbers and server-issued account ids
//! consistent under partial information, concurrent updates and unreliable
//! remote answers, and issues a monotonic ordering counter for the timeline.
//!
//! ## Architecture
//!
//! - **CounterStore**: process-wide ordering counter with debounced checkpoints
//! - **IdentityDirectory**: in-memory record set indexed by phone number and account id
//! - **MergeResolver**: decides and applies reconciliation of one observation
//! - **DirectoryWriter**: single-writer gate that applies and persists resolver outcomes
//! - **BatchLookupCoordinator**: batched remote lookups and unregistered detection
//! - **IdentityService**: the facade other subsystems call

pub mod coordinator;
pub mod counter;
pub mod directory;
pub mod resolver;
pub mod service;
pub mod writer;

pub use coordinator::{BatchLookupCoordinator, Candidate, ReconcileReport};
pub use counter::CounterStore;
pub use directory::IdentityDirectory;
pub use resolver::{MergeKind, MergeOutcome, MergeResolver};
pub use service::IdentityService;
pub use writer::DirectoryWriter;
