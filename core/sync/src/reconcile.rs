//! Per-file decision between skipping, creating and replacing an archive.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;

use coldmirror_common::{ArchiveId, Result};

use crate::manifest::ManifestEntry;

/// A regular file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Modification time truncated to whole epoch seconds.
    pub last_modified: i64,
}

/// What a catalog filename resolves to on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalState {
    Missing,
    NotRegularFile,
    File(LocalFile),
}

impl LocalState {
    /// Stat a path, following symlinks.
    ///
    /// # Errors
    /// - Any I/O error other than the path not existing
    pub async fn probe(path: &Path) -> Result<Self> {
        let metadata = match fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LocalState::Missing),
            Err(e) => return Err(e.into()),
        };

        if !metadata.is_file() {
            return Ok(LocalState::NotRegularFile);
        }

        Ok(LocalState::File(LocalFile {
            path: path.to_path_buf(),
            size_bytes: metadata.len(),
            last_modified: epoch_seconds(metadata.modified()?),
        }))
    }

    /// The file, if this is a regular file.
    pub fn file(&self) -> Option<&LocalFile> {
        match self {
            LocalState::File(file) => Some(file),
            _ => None,
        }
    }
}

fn epoch_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

/// Action the sync driver takes for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Listed in the catalog but absent on disk; reported and skipped.
    MissingLocal,
    /// Present but not a plain file; skipped silently.
    NotRegularFile,
    /// Archive is current.
    Unchanged,
    /// No archive yet.
    Create,
    /// Archive is stale: delete it, then create a new one.
    Replace { old_archive_id: ArchiveId },
}

/// Decide what to do with one file.
///
/// A file is unchanged when the recorded size matches and the recorded
/// modification time is not older than the local one. Anything else with an
/// existing entry is a replace, including a size change with an older local
/// timestamp. Content is never compared.
pub fn reconcile(local: &LocalState, entry: Option<&ManifestEntry>) -> Action {
    let file = match local {
        LocalState::Missing => return Action::MissingLocal,
        LocalState::NotRegularFile => return Action::NotRegularFile,
        LocalState::File(file) => file,
    };

    match entry {
        Some(entry)
            if entry.last_modified >= file.last_modified
                && entry.size_bytes == file.size_bytes =>
        {
            Action::Unchanged
        }
        Some(entry) => Action::Replace {
            old_archive_id: entry.archive_id.clone(),
        },
        None => Action::Create,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn local(size: u64, mtime: i64) -> LocalState {
        LocalState::File(LocalFile {
            path: PathBuf::from("/srv/b.txt"),
            size_bytes: size,
            last_modified: mtime,
        })
    }

    fn entry(size: u64, mtime: i64) -> ManifestEntry {
        ManifestEntry {
            filename: "b.txt".to_string(),
            archive_id: ArchiveId::new("old-id").unwrap(),
            size_bytes: size,
            last_modified: mtime,
            hash: None,
        }
    }

    fn replace() -> Action {
        Action::Replace {
            old_archive_id: ArchiveId::new("old-id").unwrap(),
        }
    }

    #[test]
    fn test_missing_and_irregular() {
        assert_eq!(reconcile(&LocalState::Missing, None), Action::MissingLocal);
        assert_eq!(
            reconcile(&LocalState::Missing, Some(&entry(1, 1))),
            Action::MissingLocal
        );
        assert_eq!(
            reconcile(&LocalState::NotRegularFile, Some(&entry(1, 1))),
            Action::NotRegularFile
        );
    }

    #[test]
    fn test_decision_table() {
        // (entry size, entry mtime, local size, local mtime, expected)
        let cases = [
            (50, 1000, 50, 1000, Action::Unchanged),
            (50, 1000, 50, 900, Action::Unchanged),
            (50, 1000, 50, 1001, replace()),
            (50, 1000, 75, 1000, replace()),
            (50, 1000, 75, 900, replace()),
            (50, 1000, 75, 1001, replace()),
        ];

        for (entry_size, entry_mtime, local_size, local_mtime, expected) in cases {
            let entry = entry(entry_size, entry_mtime);
            assert_eq!(
                reconcile(&local(local_size, local_mtime), Some(&entry)),
                expected,
                "entry ({}, {}) vs local ({}, {})",
                entry_size,
                entry_mtime,
                local_size,
                local_mtime
            );
        }
    }

    #[test]
    fn test_no_entry_creates_regardless_of_metadata() {
        for (size, mtime) in [(0, 0), (100, 1000), (75, -1)] {
            assert_eq!(reconcile(&local(size, mtime), None), Action::Create);
        }
    }

    #[tokio::test]
    async fn test_probe() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.txt");
        std::fs::write(&file, vec![7u8; 100]).unwrap();

        let state = LocalState::probe(&file).await.unwrap();
        let found = state.file().unwrap();
        assert_eq!(found.size_bytes, 100);
        assert!(found.last_modified > 0);

        assert_eq!(
            LocalState::probe(temp.path()).await.unwrap(),
            LocalState::NotRegularFile
        );
        assert_eq!(
            LocalState::probe(&temp.path().join("missing")).await.unwrap(),
            LocalState::Missing
        );
    }
}
