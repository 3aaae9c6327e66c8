//! Archive vault abstraction for coldmirror.
//!
//! This module provides a trait-based interface for cold-storage archive
//! vaults, the inventory document format they report their contents in,
//! and two implementations:
//! - `LocalArchiveClient`: a vault kept in a local directory, with inventory
//!   jobs that only complete after a configurable delay
//! - `MemoryArchiveClient`: an in-memory vault that records every call, for tests
//!
//! # Design Principles
//! - Archives are immutable and addressed by opaque ids
//! - Listing is asynchronous: request a job, poll it, fetch its output later
//! - Unified error semantics: transient create failures surface as `Error::Upload`

pub mod client;
pub mod inventory;
pub mod local;
pub mod memory;

pub use client::{ArchiveClient, JobStatus};
pub use inventory::{ArchiveDescriptor, InventoryReport};
pub use local::LocalArchiveClient;
pub use memory::{ClientCall, MemoryArchiveClient};
