//! Sync driver that mirrors catalog files into the vault.

use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use coldmirror_catalog::{Catalog, CatalogRecord};
use coldmirror_common::{ArchiveId, Error, JobId, Result};
use coldmirror_storage::ArchiveClient;

use crate::inventory::{ImportOutcome, InventoryImporter};
use crate::manifest::{is_trackable, Manifest, ManifestEntry, ManifestStore};
use crate::reconcile::{reconcile, Action, LocalState};
use crate::retry::{RetryConfig, RetryExecutor};
use crate::stats::RunStats;

/// Configuration for the sync driver.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SyncConfig {
    /// Maximum number of retries for a failed create or delete.
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each further one.
    pub retry_initial_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_initial_delay_ms: 1000,
        }
    }
}

impl SyncConfig {
    /// Retry policy for vault mutations.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_retries)
            .with_initial_delay(Duration::from_millis(self.retry_initial_delay_ms))
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// An inventory job was requested; re-run once it completes.
    InventoryRequested(JobId),
    /// The inventory job has not completed yet.
    InventoryPending(JobId),
    /// Every directory was reconciled.
    Synced,
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub files_uploaded: u64,
    pub bytes_transferred: u64,
    pub elapsed: Duration,
    pub unchanged: u64,
    pub missing_local: u64,
    pub upload_failures: u64,
    pub delete_failures: u64,
    pub catalog_failures: u64,
}

impl RunReport {
    fn new(outcome: RunOutcome, stats: &RunStats) -> Self {
        Self {
            outcome,
            files_uploaded: stats.files_uploaded,
            bytes_transferred: stats.bytes_transferred,
            elapsed: stats.elapsed(),
            unchanged: stats.unchanged,
            missing_local: stats.missing_local,
            upload_failures: stats.upload_failures,
            delete_failures: stats.delete_failures,
            catalog_failures: stats.catalog_failures,
        }
    }
}

/// Mirrors the catalog's files into one vault.
///
/// Work is strictly sequential: one directory, one file, one remote call at
/// a time. The manifest is saved after every remote mutation, so an
/// interrupted run loses at most the file in flight.
pub struct SyncDriver<C: ArchiveClient + ?Sized, K: Catalog> {
    /// Durable manifest location.
    store: ManifestStore,
    /// Vault being mirrored into.
    client: Arc<C>,
    /// Filenames to mirror and upload audit trail. Closed when the driver drops.
    catalog: K,
    /// Retry policy for creates and deletes.
    retry: RetryExecutor,
}

impl<C: ArchiveClient + ?Sized, K: Catalog> SyncDriver<C, K> {
    /// Create a new sync driver.
    pub fn new(store: ManifestStore, client: Arc<C>, catalog: K, config: SyncConfig) -> Self {
        Self {
            store,
            client,
            catalog,
            retry: RetryExecutor::new(config.retry_config()),
        }
    }

    /// Get a reference to the catalog.
    pub fn catalog(&self) -> &K {
        &self.catalog
    }

    /// Get a mutable reference to the catalog.
    pub fn catalog_mut(&mut self) -> &mut K {
        &mut self.catalog
    }

    /// Get the manifest store.
    pub fn store(&self) -> &ManifestStore {
        &self.store
    }

    /// Run one sync pass.
    ///
    /// The summary is logged on every path, including fatal errors.
    ///
    /// # Errors
    /// - `Error::InventoryParse` if the inventory output is malformed
    /// - Remote errors while advancing the inventory import
    /// - Catalog listing errors
    /// - Manifest save errors
    pub async fn run(&mut self, manifest: &mut Manifest) -> Result<RunReport> {
        let mut stats = RunStats::start();
        let result = self.run_inner(manifest, &mut stats).await;

        if let Err(e) = &result {
            error!("Sync aborted: {}", e);
        }
        stats.log_summary();

        result.map(|outcome| RunReport::new(outcome, &stats))
    }

    async fn run_inner(&mut self, manifest: &mut Manifest, stats: &mut RunStats) -> Result<RunOutcome> {
        let vault_arn = self.client.vault_arn();
        info!("Beginning job on {} ({} vault)", vault_arn, self.client.name());

        let importer = InventoryImporter::new(self.client.as_ref());
        match importer.advance(manifest, &self.store).await? {
            ImportOutcome::Requested(job_id) => return Ok(RunOutcome::InventoryRequested(job_id)),
            ImportOutcome::StillWaiting(job_id) => return Ok(RunOutcome::InventoryPending(job_id)),
            ImportOutcome::Imported { .. } | ImportOutcome::AlreadyImported => {}
        }

        for dir in manifest.sync_directories.clone() {
            info!("Syncing {}", dir.display());
            let filenames = self.catalog.list_filenames()?;
            debug!("Catalog lists {} files", filenames.len());

            for filename in filenames {
                self.sync_file(manifest, &dir, &filename, &vault_arn, stats)
                    .await?;
            }
        }

        Ok(RunOutcome::Synced)
    }

    /// Reconcile and mirror one file.
    ///
    /// Only manifest save failures are returned; every other fault is
    /// logged, counted and skipped.
    async fn sync_file(
        &mut self,
        manifest: &mut Manifest,
        dir: &Path,
        filename: &str,
        vault_arn: &str,
        stats: &mut RunStats,
    ) -> Result<()> {
        if !is_trackable(filename) {
            warn!("{:?} cannot be tracked in the manifest, skipping", filename);
            return Ok(());
        }

        let path = dir.join(filename);
        let local = match LocalState::probe(&path).await {
            Ok(local) => local,
            Err(e) => {
                warn!("Cannot read {}: {}", path.display(), e);
                return Ok(());
            }
        };

        let replacing = match reconcile(&local, manifest.get(filename)) {
            Action::MissingLocal => {
                warn!("'{}' does not exist", path.display());
                stats.missing_local += 1;
                return Ok(());
            }
            Action::NotRegularFile => return Ok(()),
            Action::Unchanged => {
                stats.unchanged += 1;
                return Ok(());
            }
            Action::Create => false,
            Action::Replace { old_archive_id } => {
                match self.delete_archive(&old_archive_id).await {
                    Ok(()) => {}
                    // Deleted by an earlier attempt whose response was lost
                    Err(Error::NotFound(_)) => {
                        warn!("{}: archive {} already gone from the vault", filename, old_archive_id);
                    }
                    Err(e) => {
                        error!("{}: failed to delete archive {}: {}", filename, old_archive_id, e);
                        stats.delete_failures += 1;
                        return Ok(());
                    }
                }
                // Persist before uploading so the manifest never names a deleted archive
                manifest.remove(filename);
                self.store.save(manifest).await?;
                true
            }
        };

        let Some(file) = local.file() else {
            return Ok(());
        };

        info!("{}: uploading...", filename);
        let archive_id = match self.create_archive(&file.path, filename).await {
            Ok(id) => id,
            Err(e) => {
                error!("{}: FAILED TO UPLOAD: {}", filename, e);
                stats.upload_failures += 1;
                return Ok(());
            }
        };

        manifest.insert(ManifestEntry {
            filename: filename.to_string(),
            archive_id: archive_id.clone(),
            size_bytes: file.size_bytes,
            last_modified: file.last_modified,
            hash: None,
        });
        self.store.save(manifest).await?;
        stats.record_upload(file.size_bytes);
        info!("{}: {}", filename, if replacing { "updated." } else { "done." });

        let record = CatalogRecord {
            filename: filename.to_string(),
            archive_id,
            vault_arn: vault_arn.to_string(),
            archived_at: Utc::now().timestamp(),
        };
        match self.catalog.record_upload(&record) {
            Ok(()) => debug!("{}: catalog updated", filename),
            Err(e) => {
                warn!("{}: catalog update failed: {}", filename, e);
                stats.catalog_failures += 1;
            }
        }

        Ok(())
    }

    async fn create_archive(&self, path: &Path, description: &str) -> Result<ArchiveId> {
        let client = self.client.as_ref();
        let label = format!("create {}", description);
        self.retry
            .execute(&label, || client.create_archive(path, description))
            .await
    }

    async fn delete_archive(&self, archive_id: &ArchiveId) -> Result<()> {
        let client = self.client.as_ref();
        let label = format!("delete {}", archive_id);
        self.retry
            .execute(&label, || client.delete_archive(archive_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.max_retries, 2);

        let retry = config.retry_config();
        assert_eq!(retry.max_retries, 2);
        assert_eq!(retry.initial_delay, Duration::from_millis(1000));
        assert!(retry.jitter);
    }

    #[test]
    fn test_config_serialization() {
        let config = SyncConfig {
            max_retries: 5,
            retry_initial_delay_ms: 10,
        };
        let json = serde_json::to_string(&config).unwrap();
        let restored: SyncConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }
}
