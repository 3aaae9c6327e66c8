//! Archive client trait definition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use coldmirror_common::{ArchiveId, JobId, Result};

/// Completion state of an inventory job as reported by the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Job being described.
    pub job_id: JobId,
    /// Whether the job output can be fetched.
    pub completed: bool,
}

/// Client for a single cold-storage archive vault.
///
/// Archives are immutable: changing one means deleting it and creating a
/// new one. Listing the vault is only possible through an inventory job,
/// which the vault completes asynchronously (typically hours later).
/// Implementations must handle their own authentication and rate limiting.
#[async_trait]
pub trait ArchiveClient: Send + Sync {
    /// Get the client name (e.g., "local", "memory").
    fn name(&self) -> &str;

    /// Resource name of the vault, recorded in the catalog after uploads.
    fn vault_arn(&self) -> String;

    /// Ask the vault to start enumerating its archives.
    ///
    /// # Postconditions
    /// - Returns the id of a newly created job; the job is not complete yet
    async fn request_inventory_job(&self) -> Result<JobId>;

    /// Check whether a previously requested job has completed.
    ///
    /// # Errors
    /// - Job not found (expired or never requested)
    /// - Network/I/O errors
    async fn poll_job(&self, job_id: &JobId) -> Result<JobStatus>;

    /// Fetch the raw output of a completed inventory job.
    ///
    /// The output is an inventory document; see [`crate::InventoryReport`].
    ///
    /// # Preconditions
    /// - Job must be complete
    async fn fetch_job_output(&self, job_id: &JobId) -> Result<Vec<u8>>;

    /// Upload a local file as a new archive.
    ///
    /// # Postconditions
    /// - Returns the id of the created archive
    ///
    /// # Errors
    /// - `Error::Upload` on transient failure; the caller may retry or skip
    async fn create_archive(&self, path: &Path, description: &str) -> Result<ArchiveId>;

    /// Delete an archive.
    ///
    /// # Errors
    /// - Archive not found
    /// - Network/I/O errors
    async fn delete_archive(&self, archive_id: &ArchiveId) -> Result<()>;
}
