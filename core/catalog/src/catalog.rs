//! Catalog trait definition.

use serde::{Deserialize, Serialize};

use coldmirror_common::{ArchiveId, Result};

/// Audit record written after a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// Catalog filename.
    pub filename: String,
    /// Archive the file was uploaded as.
    pub archive_id: ArchiveId,
    /// Vault holding the archive.
    pub vault_arn: String,
    /// When the upload was recorded (epoch seconds).
    pub archived_at: i64,
}

/// Source of filenames to mirror and sink for upload results.
pub trait Catalog {
    /// List every filename to mirror.
    ///
    /// Ordering is defined by the catalog and not guaranteed to be stable
    /// across calls. Empty names are never returned.
    fn list_filenames(&self) -> Result<Vec<String>>;

    /// Record an upload.
    ///
    /// # Postconditions
    /// - On success the record is committed
    /// - On failure nothing is committed
    ///
    /// # Errors
    /// - `Error::Catalog` if the write could not be committed
    fn record_upload(&mut self, record: &CatalogRecord) -> Result<()>;
}
