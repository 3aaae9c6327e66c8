//! In-memory archive client for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tokio::fs;
use uuid::Uuid;

use coldmirror_common::{ArchiveId, Error, JobId, Result};

use crate::client::{ArchiveClient, JobStatus};
use crate::inventory::{format_timestamp, ArchiveDescriptor, InventoryReport};

/// A remote call observed by the memory client, in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCall {
    RequestInventory,
    PollJob(JobId),
    FetchOutput(JobId),
    Create { description: String },
    Delete(ArchiveId),
}

#[derive(Debug, Clone)]
struct StoredArchive {
    description: String,
    size: u64,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct MemoryJob {
    completed: bool,
    output: Option<Vec<u8>>,
}

#[derive(Default)]
struct State {
    archives: HashMap<ArchiveId, StoredArchive>,
    jobs: HashMap<JobId, MemoryJob>,
    calls: Vec<ClientCall>,
    failing_uploads: HashSet<String>,
    failing_deletes: bool,
}

/// In-memory archive client.
///
/// Useful for testing. Jobs stay pending until [`MemoryArchiveClient::complete_job`]
/// is called, uploads can be made to fail per description, and every call
/// is recorded so tests can assert on ordering.
pub struct MemoryArchiveClient {
    vault_name: String,
    state: Mutex<State>,
}

impl MemoryArchiveClient {
    /// Create an empty vault.
    pub fn new(vault_name: impl Into<String>) -> Self {
        Self {
            vault_name: vault_name.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Place an archive in the vault without recording a call.
    pub fn seed_archive(
        &self,
        description: impl Into<String>,
        size: u64,
        created_at: DateTime<Utc>,
    ) -> Result<ArchiveId> {
        let id = new_archive_id()?;
        self.state().archives.insert(
            id.clone(),
            StoredArchive {
                description: description.into(),
                size,
                created_at,
            },
        );
        Ok(id)
    }

    /// Mark a job as complete.
    pub fn complete_job(&self, job_id: &JobId) {
        self.state().jobs.entry(job_id.clone()).or_default().completed = true;
    }

    /// Override the output a job will return (e.g. to simulate corruption).
    pub fn set_job_output(&self, job_id: &JobId, output: Vec<u8>) {
        self.state().jobs.entry(job_id.clone()).or_default().output = Some(output);
    }

    /// Make every upload with this description fail.
    pub fn fail_uploads_for(&self, description: impl Into<String>) {
        self.state().failing_uploads.insert(description.into());
    }

    /// Let uploads with this description succeed again.
    pub fn clear_upload_failure(&self, description: &str) {
        self.state().failing_uploads.remove(description);
    }

    /// Make every delete fail.
    pub fn fail_deletes(&self, fail: bool) {
        self.state().failing_deletes = fail;
    }

    /// Calls recorded so far.
    pub fn calls(&self) -> Vec<ClientCall> {
        self.state().calls.clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Whether an archive is currently stored.
    pub fn contains(&self, archive_id: &ArchiveId) -> bool {
        self.state().archives.contains_key(archive_id)
    }

    /// Number of stored archives.
    pub fn archive_count(&self) -> usize {
        self.state().archives.len()
    }

    /// Ids of archives carrying the given description.
    pub fn archives_described(&self, description: &str) -> Vec<ArchiveId> {
        self.state()
            .archives
            .iter()
            .filter(|(_, archive)| archive.description == description)
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn render_inventory(&self, state: &State) -> Result<Vec<u8>> {
        let archive_list = state
            .archives
            .iter()
            .map(|(id, archive)| ArchiveDescriptor {
                archive_id: id.to_string(),
                archive_description: archive.description.clone(),
                creation_date: format_timestamp(archive.created_at),
                size: archive.size,
                sha256_tree_hash: format!("mem-{}", id),
            })
            .collect();
        InventoryReport::new(self.vault_arn(), archive_list).to_vec()
    }
}

fn new_archive_id() -> Result<ArchiveId> {
    ArchiveId::new(Uuid::new_v4().simple().to_string())
}

#[async_trait]
impl ArchiveClient for MemoryArchiveClient {
    fn name(&self) -> &str {
        "memory"
    }

    fn vault_arn(&self) -> String {
        format!("arn:coldmirror:memory:vaults/{}", self.vault_name)
    }

    async fn request_inventory_job(&self) -> Result<JobId> {
        let job_id = JobId::new(Uuid::new_v4().simple().to_string())?;
        let mut state = self.state();
        state.calls.push(ClientCall::RequestInventory);
        state.jobs.insert(job_id.clone(), MemoryJob::default());
        Ok(job_id)
    }

    async fn poll_job(&self, job_id: &JobId) -> Result<JobStatus> {
        let mut state = self.state();
        state.calls.push(ClientCall::PollJob(job_id.clone()));
        let job = state
            .jobs
            .get(job_id)
            .ok_or_else(|| Error::NotFound(format!("Job not found: {}", job_id)))?;
        Ok(JobStatus {
            job_id: job_id.clone(),
            completed: job.completed,
        })
    }

    async fn fetch_job_output(&self, job_id: &JobId) -> Result<Vec<u8>> {
        let mut state = self.state();
        state.calls.push(ClientCall::FetchOutput(job_id.clone()));
        let job = state
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Job not found: {}", job_id)))?;

        if !job.completed {
            return Err(Error::Remote(format!("Job {} is not complete", job_id)));
        }

        match job.output {
            Some(output) => Ok(output),
            None => self.render_inventory(&state),
        }
    }

    async fn create_archive(&self, path: &Path, description: &str) -> Result<ArchiveId> {
        {
            let mut state = self.state();
            state.calls.push(ClientCall::Create {
                description: description.to_string(),
            });
            if state.failing_uploads.contains(description) {
                return Err(Error::Upload(format!(
                    "Simulated failure uploading {}",
                    description
                )));
            }
        }

        let size = fs::metadata(path)
            .await
            .map_err(|e| Error::Upload(format!("Cannot read {}: {}", path.display(), e)))?
            .len();

        let id = new_archive_id()?;
        self.state().archives.insert(
            id.clone(),
            StoredArchive {
                description: description.to_string(),
                size,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn delete_archive(&self, archive_id: &ArchiveId) -> Result<()> {
        let mut state = self.state();
        state.calls.push(ClientCall::Delete(archive_id.clone()));
        if state.failing_deletes {
            return Err(Error::Remote(format!(
                "Simulated failure deleting {}",
                archive_id
            )));
        }
        state
            .archives
            .remove(archive_id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("Archive not found: {}", archive_id)))
    }
}
