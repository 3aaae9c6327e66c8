//! Inventory import state machine.
//!
//! Listing a vault takes hours, so the import is spread over several runs:
//!
//! ```text
//! NoJob --request--> JobPending --poll: complete--> (fetch, parse) --> Imported
//!                        |                              |
//!                        +-- poll: incomplete (stay) ---+-- parse error (stay)
//! ```
//!
//! Each run advances at most one step before the sync loop may proceed; the
//! run ends instead of waiting for the vault.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use coldmirror_common::{ArchiveId, Error, JobId, Result};
use coldmirror_storage::{ArchiveClient, InventoryReport};

use crate::manifest::{is_trackable, Manifest, ManifestEntry, ManifestStore};

/// Where a manifest stands in the import protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryState {
    NoJob,
    JobPending(JobId),
    Imported,
}

impl InventoryState {
    /// Derive the state from a manifest.
    pub fn of(manifest: &Manifest) -> Self {
        if manifest.inventory_imported {
            InventoryState::Imported
        } else {
            match &manifest.pending_job {
                Some(job) => InventoryState::JobPending(job.clone()),
                None => InventoryState::NoJob,
            }
        }
    }
}

/// Result of advancing the import by one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// A job was requested; the run should end.
    Requested(JobId),
    /// The recorded job is still running; the run should end.
    StillWaiting(JobId),
    /// The inventory was imported during this step.
    Imported { archives: usize },
    /// Nothing to do.
    AlreadyImported,
}

impl ImportOutcome {
    /// Whether the manifest can be trusted for reconciliation.
    pub fn is_ready(&self) -> bool {
        matches!(
            self,
            ImportOutcome::Imported { .. } | ImportOutcome::AlreadyImported
        )
    }
}

/// Drives the inventory import for one vault.
pub struct InventoryImporter<'a, C: ArchiveClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: ArchiveClient + ?Sized> InventoryImporter<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Advance the import by one step, persisting every state change.
    ///
    /// Never requests a job while one is recorded.
    ///
    /// # Errors
    /// - `Error::InventoryParse` if the job output is malformed; the job id
    ///   stays recorded so the next run parses the same output again
    /// - Remote errors from the vault
    pub async fn advance(
        &self,
        manifest: &mut Manifest,
        store: &ManifestStore,
    ) -> Result<ImportOutcome> {
        let job_id = match InventoryState::of(manifest) {
            InventoryState::Imported => return Ok(ImportOutcome::AlreadyImported),
            InventoryState::NoJob => {
                let job_id = self.client.request_inventory_job().await?;
                manifest.pending_job = Some(job_id.clone());
                store.save(manifest).await?;
                info!("Requested an inventory (job {}). This usually takes about four hours.", job_id);
                return Ok(ImportOutcome::Requested(job_id));
            }
            InventoryState::JobPending(job_id) => job_id,
        };

        let status = self.client.poll_job(&job_id).await?;
        if !status.completed {
            info!("Waiting for inventory job {}. This usually takes about four hours.", job_id);
            return Ok(ImportOutcome::StillWaiting(job_id));
        }

        let output = self.client.fetch_job_output(&job_id).await?;
        let entries = entries_from_output(&output)?;
        let archives = entries.len();

        manifest.replace_entries(entries);
        manifest.pending_job = None;
        manifest.inventory_imported = true;
        store.save(manifest).await?;

        info!("Imported an inventory of {} archives (job {})", archives, job_id);
        Ok(ImportOutcome::Imported { archives })
    }
}

/// Convert raw job output into manifest entries keyed by archive description.
///
/// Archives whose description cannot be tracked are left out. When several
/// archives share a description, the last one listed wins.
pub fn entries_from_output(output: &[u8]) -> Result<Vec<ManifestEntry>> {
    let report = InventoryReport::from_slice(output)?;
    let mut entries: BTreeMap<String, ManifestEntry> = BTreeMap::new();

    for archive in report.archive_list {
        if !is_trackable(&archive.archive_description) {
            warn!(
                "Skipping archive {} with untrackable description {:?}",
                archive.archive_id, archive.archive_description
            );
            continue;
        }

        let last_modified = archive.creation_epoch()?;
        let archive_id = ArchiveId::new(archive.archive_id.as_str())
            .map_err(|e| Error::InventoryParse(e.to_string()))?;
        let hash = Some(archive.sha256_tree_hash).filter(|h| is_trackable(h));

        let entry = ManifestEntry {
            filename: archive.archive_description,
            archive_id,
            size_bytes: archive.size,
            last_modified,
            hash,
        };

        if let Some(previous) = entries.insert(entry.filename.clone(), entry) {
            warn!(
                "Vault holds several archives for {}; keeping the later one, {} is untracked",
                previous.filename, previous.archive_id
            );
        }
    }

    debug!("Inventory lists {} trackable archives", entries.len());
    Ok(entries.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use coldmirror_storage::{ClientCall, MemoryArchiveClient};
    use tempfile::TempDir;

    fn setup(temp: &TempDir) -> (Manifest, ManifestStore) {
        let store = ManifestStore::new(temp.path().join("manifest.txt"));
        let manifest = Manifest::new("Docs", "eu-west-1", vec![temp.path().to_path_buf()]);
        (manifest, store)
    }

    #[tokio::test]
    async fn test_full_import_cycle() {
        let temp = TempDir::new().unwrap();
        let (mut manifest, store) = setup(&temp);
        let client = MemoryArchiveClient::new("docs");
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let id = client.seed_archive("a.txt", 100, created).unwrap();
        let importer = InventoryImporter::new(&client);

        let job = match importer.advance(&mut manifest, &store).await.unwrap() {
            ImportOutcome::Requested(job) => job,
            other => panic!("expected request, got {:?}", other),
        };
        assert_eq!(store.load().await.unwrap().pending_job, Some(job.clone()));

        assert_eq!(
            importer.advance(&mut manifest, &store).await.unwrap(),
            ImportOutcome::StillWaiting(job.clone())
        );
        assert_eq!(manifest.pending_job, Some(job.clone()));

        client.complete_job(&job);
        assert_eq!(
            importer.advance(&mut manifest, &store).await.unwrap(),
            ImportOutcome::Imported { archives: 1 }
        );

        let persisted = store.load().await.unwrap();
        assert!(persisted.inventory_imported);
        assert!(persisted.pending_job.is_none());
        let entry = persisted.get("a.txt").unwrap();
        assert_eq!(entry.archive_id, id);
        assert_eq!(entry.size_bytes, 100);
        assert_eq!(entry.last_modified, 1_704_067_200);
        assert!(entry.hash.is_some());

        assert_eq!(
            importer.advance(&mut manifest, &store).await.unwrap(),
            ImportOutcome::AlreadyImported
        );
    }

    #[tokio::test]
    async fn test_never_requests_second_job() {
        let temp = TempDir::new().unwrap();
        let (mut manifest, store) = setup(&temp);
        let client = MemoryArchiveClient::new("docs");
        let importer = InventoryImporter::new(&client);

        importer.advance(&mut manifest, &store).await.unwrap();
        for _ in 0..3 {
            importer.advance(&mut manifest, &store).await.unwrap();
        }

        let requests = client
            .calls()
            .into_iter()
            .filter(|c| *c == ClientCall::RequestInventory)
            .count();
        assert_eq!(requests, 1);
    }

    #[tokio::test]
    async fn test_parse_failure_keeps_job() {
        let temp = TempDir::new().unwrap();
        let (mut manifest, store) = setup(&temp);
        let client = MemoryArchiveClient::new("docs");
        let importer = InventoryImporter::new(&client);

        let ImportOutcome::Requested(job) = importer.advance(&mut manifest, &store).await.unwrap()
        else {
            panic!("expected a job request");
        };
        client.complete_job(&job);
        client.set_job_output(&job, b"not json".to_vec());

        let err = importer.advance(&mut manifest, &store).await.unwrap_err();
        assert!(matches!(err, Error::InventoryParse(_)));

        let persisted = store.load().await.unwrap();
        assert_eq!(persisted.pending_job, Some(job.clone()));
        assert!(!persisted.inventory_imported);

        // The next run retries the same job instead of requesting another
        client.clear_calls();
        let _ = importer.advance(&mut manifest, &store).await;
        assert_eq!(
            client.calls(),
            vec![ClientCall::PollJob(job.clone()), ClientCall::FetchOutput(job)]
        );
    }

    #[test]
    fn test_entries_from_output() {
        let output = br#"{
            "ArchiveList": [
                {"ArchiveId": "old", "ArchiveDescription": "a.txt",
                 "CreationDate": "2024-01-01T00:00:00Z", "Size": 1, "SHA256TreeHash": "h1"},
                {"ArchiveId": "new", "ArchiveDescription": "a.txt",
                 "CreationDate": "2024-01-02T00:00:00Z", "Size": 2, "SHA256TreeHash": "h2"},
                {"ArchiveId": "odd", "ArchiveDescription": "x|y",
                 "CreationDate": "2024-01-02T00:00:00Z", "Size": 3, "SHA256TreeHash": "h3"}
            ]
        }"#;

        let entries = entries_from_output(output).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].archive_id.as_str(), "new");
        assert_eq!(entries[0].size_bytes, 2);
        assert_eq!(entries[0].hash.as_deref(), Some("h2"));
    }

    #[test]
    fn test_bad_creation_date_is_parse_error() {
        let output = br#"{"ArchiveList": [
            {"ArchiveId": "id", "ArchiveDescription": "a.txt",
             "CreationDate": "last tuesday", "Size": 1, "SHA256TreeHash": "h"}
        ]}"#;
        assert!(matches!(
            entries_from_output(output),
            Err(Error::InventoryParse(_))
        ));
    }

    #[test]
    fn test_state_of_manifest() {
        let mut manifest = Manifest::new("Docs", "eu-west-1", Vec::new());
        assert_eq!(InventoryState::of(&manifest), InventoryState::NoJob);

        let job = JobId::new("job").unwrap();
        manifest.pending_job = Some(job.clone());
        assert_eq!(InventoryState::of(&manifest), InventoryState::JobPending(job));

        manifest.pending_job = None;
        manifest.inventory_imported = true;
        assert_eq!(InventoryState::of(&manifest), InventoryState::Imported);

        manifest.reset_inventory();
        assert_eq!(InventoryState::of(&manifest), InventoryState::NoJob);

        // A stale job id is dropped as well
        manifest.pending_job = Some(JobId::new("expired").unwrap());
        manifest.reset_inventory();
        assert!(manifest.pending_job.is_none());
        assert_eq!(InventoryState::of(&manifest), InventoryState::NoJob);
    }

    #[tokio::test]
    async fn test_reset_recovers_from_expired_job() {
        let temp = TempDir::new().unwrap();
        let (mut manifest, store) = setup(&temp);
        let client = MemoryArchiveClient::new("docs");
        let importer = InventoryImporter::new(&client);

        manifest.pending_job = Some(JobId::new("expired").unwrap());
        assert!(matches!(
            importer.advance(&mut manifest, &store).await,
            Err(Error::NotFound(_))
        ));

        manifest.reset_inventory();
        let outcome = importer.advance(&mut manifest, &store).await.unwrap();
        let ImportOutcome::Requested(job) = outcome else {
            panic!("expected a fresh request, got {:?}", outcome);
        };
        assert_ne!(job.as_str(), "expired");
        assert_eq!(store.load().await.unwrap().pending_job, Some(job));
    }
}
