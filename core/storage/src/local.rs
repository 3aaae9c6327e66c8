//! Local directory archive client.

use async_trait::async_trait;
use blake2::{Blake2s256, Digest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use coldmirror_common::{ArchiveId, Error, JobId, Result};

use crate::client::{ArchiveClient, JobStatus};
use crate::inventory::{format_timestamp, ArchiveDescriptor, InventoryReport};

/// Sidecar stored next to every archive body.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArchiveRecord {
    description: String,
    created_at: DateTime<Utc>,
    size: u64,
    hash: String,
}

/// Persisted inventory job.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobRecord {
    requested_at: DateTime<Utc>,
}

/// Archive vault kept in a local directory.
///
/// Layout under the root:
/// - `archives/<id>.bin` archive body, `archives/<id>.json` sidecar
/// - `jobs/<id>.json` inventory job, complete once `job_delay` has elapsed
///
/// Jobs survive process restarts, so the two-phase inventory protocol can be
/// exercised end to end from the command line.
pub struct LocalArchiveClient {
    root: PathBuf,
    vault_name: String,
    region: String,
    job_delay: Duration,
}

impl LocalArchiveClient {
    /// Create a client for the vault rooted at `root`.
    ///
    /// # Postconditions
    /// - `archives/` and `jobs/` exist under the root
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(
        root: impl AsRef<Path>,
        vault_name: impl Into<String>,
        region: impl Into<String>,
        job_delay: Duration,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        // Sync for constructor
        std::fs::create_dir_all(root.join("archives"))?;
        std::fs::create_dir_all(root.join("jobs"))?;

        Ok(Self {
            root,
            vault_name: vault_name.into(),
            region: region.into(),
            job_delay,
        })
    }

    fn body_path(&self, id: &ArchiveId) -> PathBuf {
        self.root.join("archives").join(format!("{}.bin", id))
    }

    fn record_path(&self, id: &ArchiveId) -> PathBuf {
        self.root.join("archives").join(format!("{}.json", id))
    }

    /// Write an archive body, then the sidecar that makes it visible to
    /// inventory jobs. A failed sidecar write removes the body again.
    async fn store_archive(&self, id: &ArchiveId, data: &[u8], record: &[u8]) -> Result<()> {
        let body_path = self.body_path(id);
        fs::write(&body_path, data)
            .await
            .map_err(|e| Error::Upload(format!("Cannot store archive {}: {}", id, e)))?;

        if let Err(e) = fs::write(self.record_path(id), record).await {
            if let Err(cleanup) = fs::remove_file(&body_path).await {
                warn!("Cannot remove orphaned body {}: {}", body_path.display(), cleanup);
            }
            return Err(Error::Upload(format!("Cannot store archive {}: {}", id, e)));
        }
        Ok(())
    }

    fn job_path(&self, id: &JobId) -> PathBuf {
        self.root.join("jobs").join(format!("{}.json", id))
    }

    async fn read_job(&self, job_id: &JobId) -> Result<JobRecord> {
        let path = self.job_path(job_id);
        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("Job not found: {}", job_id)));
            }
            Err(e) => return Err(Error::Io(e)),
        };
        serde_json::from_slice(&content).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn is_complete(&self, job: &JobRecord) -> bool {
        let elapsed = Utc::now().signed_duration_since(job.requested_at);
        elapsed.to_std().map(|e| e >= self.job_delay).unwrap_or(false)
    }

    async fn list_archives(&self) -> Result<Vec<ArchiveDescriptor>> {
        let mut archives = Vec::new();
        let mut entries = fs::read_dir(self.root.join("archives")).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let content = fs::read(&path).await?;
            let record: ArchiveRecord = serde_json::from_slice(&content)
                .map_err(|e| Error::Serialization(format!("{}: {}", path.display(), e)))?;

            archives.push(ArchiveDescriptor {
                archive_id: id.to_string(),
                archive_description: record.description,
                creation_date: format_timestamp(record.created_at),
                size: record.size,
                sha256_tree_hash: record.hash,
            });
        }

        archives.sort_by(|a, b| {
            a.creation_date
                .cmp(&b.creation_date)
                .then_with(|| a.archive_id.cmp(&b.archive_id))
        });
        Ok(archives)
    }
}

#[async_trait]
impl ArchiveClient for LocalArchiveClient {
    fn name(&self) -> &str {
        "local"
    }

    fn vault_arn(&self) -> String {
        format!(
            "arn:coldmirror:{}:local:vaults/{}",
            self.region, self.vault_name
        )
    }

    async fn request_inventory_job(&self) -> Result<JobId> {
        let job_id = JobId::new(Uuid::new_v4().simple().to_string())?;
        let record = JobRecord {
            requested_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        fs::write(self.job_path(&job_id), json).await?;

        debug!("Requested inventory job {}", job_id);
        Ok(job_id)
    }

    async fn poll_job(&self, job_id: &JobId) -> Result<JobStatus> {
        let job = self.read_job(job_id).await?;
        Ok(JobStatus {
            job_id: job_id.clone(),
            completed: self.is_complete(&job),
        })
    }

    async fn fetch_job_output(&self, job_id: &JobId) -> Result<Vec<u8>> {
        let job = self.read_job(job_id).await?;
        if !self.is_complete(&job) {
            return Err(Error::Remote(format!("Job {} is not complete", job_id)));
        }

        let archives = self.list_archives().await?;
        InventoryReport::new(self.vault_arn(), archives).to_vec()
    }

    async fn create_archive(&self, path: &Path, description: &str) -> Result<ArchiveId> {
        let data = fs::read(path)
            .await
            .map_err(|e| Error::Upload(format!("Cannot read {}: {}", path.display(), e)))?;

        let id = ArchiveId::new(Uuid::new_v4().simple().to_string())?;
        let record = ArchiveRecord {
            description: description.to_string(),
            created_at: Utc::now(),
            size: data.len() as u64,
            hash: format!("{:x}", Blake2s256::digest(&data)),
        };
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| Error::Serialization(e.to_string()))?;

        self.store_archive(&id, &data, &json).await?;
        Ok(id)
    }

    async fn delete_archive(&self, archive_id: &ArchiveId) -> Result<()> {
        let record_path = self.record_path(archive_id);
        if !record_path.exists() {
            return Err(Error::NotFound(format!("Archive not found: {}", archive_id)));
        }

        fs::remove_file(&record_path).await?;
        let body_path = self.body_path(archive_id);
        if body_path.exists() {
            fs::remove_file(&body_path).await?;
        }
        Ok(())
    }
}
