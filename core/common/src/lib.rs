//! Common utilities and types shared across coldmirror crates.
//!
//! This module provides the error taxonomy used by every layer of the
//! mirror and the opaque identifier types handed out by archive vaults.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{ArchiveId, JobId};
