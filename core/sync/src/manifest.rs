//! Manifest of archived files and its on-disk store.
//!
//! The manifest is a line-oriented, pipe-delimited text file:
//!
//! ```text
//! vaultName|region
//! dir1|dir2|...
//! pendingInventoryJobId        (may be empty)
//! -                            (if the inventory was imported, else empty)
//! filename|archiveId|lastModifiedEpoch|sizeBytes[|hash]
//! ...
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use coldmirror_common::{ArchiveId, Error, JobId, Result};

/// Field separator of the manifest format.
pub const DELIMITER: char = '|';

const IMPORTED_MARKER: &str = "-";
const HEADER_LINES: usize = 4;

/// Last known remote state of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Catalog filename; unique key.
    pub filename: String,
    /// Archive currently holding the file.
    pub archive_id: ArchiveId,
    /// Size at upload time.
    pub size_bytes: u64,
    /// Modification time at upload time (epoch seconds).
    pub last_modified: i64,
    /// Hash reported by an inventory import. Never verified.
    pub hash: Option<String>,
}

/// Whether a name can be written into the manifest without breaking its format.
pub fn is_trackable(value: &str) -> bool {
    !value.is_empty() && !value.contains([DELIMITER, '\n', '\r'])
}

/// Local record of what the vault holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub vault_name: String,
    pub region: String,
    /// Directories mirrored, in order.
    pub sync_directories: Vec<PathBuf>,
    /// Inventory job requested but not imported yet.
    pub pending_job: Option<JobId>,
    /// False only until the first inventory import succeeds.
    pub inventory_imported: bool,
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    /// Create a manifest for a vault that was never inventoried.
    pub fn new(
        vault_name: impl Into<String>,
        region: impl Into<String>,
        sync_directories: Vec<PathBuf>,
    ) -> Self {
        Self {
            vault_name: vault_name.into(),
            region: region.into(),
            sync_directories,
            pending_job: None,
            inventory_imported: false,
            entries: BTreeMap::new(),
        }
    }

    /// Get the entry for a filename.
    pub fn get(&self, filename: &str) -> Option<&ManifestEntry> {
        self.entries.get(filename)
    }

    /// Insert or update an entry, returning the previous one.
    pub fn insert(&mut self, entry: ManifestEntry) -> Option<ManifestEntry> {
        self.entries.insert(entry.filename.clone(), entry)
    }

    /// Remove an entry.
    pub fn remove(&mut self, filename: &str) -> Option<ManifestEntry> {
        self.entries.remove(filename)
    }

    /// Get all entries, ordered by filename.
    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace every entry at once.
    pub fn replace_entries(&mut self, entries: impl IntoIterator<Item = ManifestEntry>) {
        self.entries = entries
            .into_iter()
            .map(|entry| (entry.filename.clone(), entry))
            .collect();
    }

    /// Forget the inventory state so the next run requests a new job.
    ///
    /// A recorded job id is dropped too, since it may have expired in the
    /// vault. Entries are kept until the new inventory replaces them.
    pub fn reset_inventory(&mut self) {
        self.inventory_imported = false;
        self.pending_job = None;
    }

    /// Check the fields that must hold before any remote call.
    ///
    /// # Errors
    /// - `Error::Configuration` if the vault name or region is empty, no
    ///   directory is listed, or a listed directory does not exist
    pub fn validate(&self) -> Result<()> {
        if self.vault_name.is_empty() || self.region.is_empty() {
            return Err(Error::Configuration(
                "The first line of the manifest must give a vault name and region, e.g. `MyVault|us-west-1`"
                    .to_string(),
            ));
        }

        if self.sync_directories.is_empty() {
            return Err(Error::Configuration(
                "The second line of the manifest must list the folders to sync, e.g. `/srv/backups|/srv/scans`"
                    .to_string(),
            ));
        }

        for dir in &self.sync_directories {
            if !dir.exists() {
                return Err(Error::Configuration(format!(
                    "Sync directory not found: {}",
                    dir.display()
                )));
            }
            if !dir.is_dir() {
                return Err(Error::Configuration(format!(
                    "Sync directory is not a directory: {}",
                    dir.display()
                )));
            }
        }

        Ok(())
    }

    /// Parse the persisted text form.
    ///
    /// Missing header lines read as empty. Blank entry lines are ignored.
    /// Header values are taken verbatim, surrounding whitespace included.
    ///
    /// # Errors
    /// - `Error::ManifestParse` naming the first malformed line
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines();
        let mut header = || lines.next().unwrap_or("");

        let (vault_name, region) = parse_vault_line(header())?;
        let sync_directories = parse_directory_line(header())?;
        let pending_job = parse_job_line(header())?;
        let inventory_imported = parse_imported_line(header())?;

        let mut manifest = Self {
            vault_name,
            region,
            sync_directories,
            pending_job,
            inventory_imported,
            entries: BTreeMap::new(),
        };

        for (index, line) in text.lines().enumerate().skip(HEADER_LINES) {
            if line.trim().is_empty() {
                continue;
            }
            let number = index + 1;
            let entry = parse_entry_line(number, line)?;
            if manifest.entries.contains_key(&entry.filename) {
                return Err(parse_error(
                    number,
                    format!("duplicate entry for {}", entry.filename),
                ));
            }
            manifest.insert(entry);
        }

        Ok(manifest)
    }

    /// Render the persisted text form.
    ///
    /// # Errors
    /// - `Error::InvalidInput` if a value would not survive a reload
    pub fn to_text(&self) -> Result<String> {
        for value in [&self.vault_name, &self.region] {
            if value.contains([DELIMITER, '\n', '\r']) {
                return Err(Error::InvalidInput(format!(
                    "Vault name and region cannot contain '|': {}",
                    value
                )));
            }
        }

        let mut dirs = Vec::with_capacity(self.sync_directories.len());
        for dir in &self.sync_directories {
            match dir.to_str() {
                Some(s) if is_trackable(s) => dirs.push(s),
                _ => {
                    return Err(Error::InvalidInput(format!(
                        "Sync directory cannot be stored in the manifest: {}",
                        dir.display()
                    )));
                }
            }
        }

        let mut out = String::new();
        out.push_str(&format!("{}{}{}\n", self.vault_name, DELIMITER, self.region));
        out.push_str(&dirs.join("|"));
        out.push('\n');
        if let Some(job) = &self.pending_job {
            out.push_str(job.as_str());
        }
        out.push('\n');
        if self.inventory_imported {
            out.push_str(IMPORTED_MARKER);
        }
        out.push('\n');

        for entry in self.entries.values() {
            if !is_trackable(&entry.filename) {
                return Err(Error::InvalidInput(format!(
                    "Filename cannot be stored in the manifest: {:?}",
                    entry.filename
                )));
            }
            out.push_str(&format!(
                "{}|{}|{}|{}",
                entry.filename, entry.archive_id, entry.last_modified, entry.size_bytes
            ));
            if let Some(hash) = entry.hash.as_deref().filter(|h| !h.is_empty()) {
                if !is_trackable(hash) {
                    return Err(Error::InvalidInput(format!(
                        "Hash of {} cannot be stored in the manifest",
                        entry.filename
                    )));
                }
                out.push(DELIMITER);
                out.push_str(hash);
            }
            out.push('\n');
        }

        Ok(out)
    }
}

fn parse_error(line: usize, reason: impl Into<String>) -> Error {
    Error::ManifestParse {
        line,
        reason: reason.into(),
    }
}

fn parse_vault_line(line: &str) -> Result<(String, String)> {
    if line.is_empty() {
        return Ok((String::new(), String::new()));
    }
    let fields: Vec<&str> = line.split(DELIMITER).collect();
    match fields.as_slice() {
        [name, region] => Ok((name.to_string(), region.to_string())),
        _ => Err(parse_error(
            1,
            format!("expected vaultName|region, found {} fields", fields.len()),
        )),
    }
}

fn parse_directory_line(line: &str) -> Result<Vec<PathBuf>> {
    if line.is_empty() {
        return Ok(Vec::new());
    }
    line.split(DELIMITER)
        .map(|dir| {
            if dir.is_empty() {
                Err(parse_error(2, "empty directory in list"))
            } else {
                Ok(PathBuf::from(dir))
            }
        })
        .collect()
}

fn parse_job_line(line: &str) -> Result<Option<JobId>> {
    if line.is_empty() {
        return Ok(None);
    }
    JobId::new(line)
        .map(Some)
        .map_err(|e| parse_error(3, e.to_string()))
}

fn parse_imported_line(line: &str) -> Result<bool> {
    match line {
        "" => Ok(false),
        IMPORTED_MARKER => Ok(true),
        other => Err(parse_error(
            4,
            format!("expected '-' or an empty line, found {:?}", other),
        )),
    }
}

fn parse_entry_line(number: usize, line: &str) -> Result<ManifestEntry> {
    let fields: Vec<&str> = line.split(DELIMITER).collect();
    let (filename, archive_id, last_modified, size, hash) = match fields.as_slice() {
        [f, a, m, s] => (*f, *a, *m, *s, None),
        [f, a, m, s, h] => (*f, *a, *m, *s, Some(*h)),
        _ => {
            return Err(parse_error(
                number,
                format!("expected 4 or 5 fields, found {}", fields.len()),
            ));
        }
    };

    if filename.is_empty() {
        return Err(parse_error(number, "empty filename"));
    }
    let archive_id = ArchiveId::new(archive_id).map_err(|e| parse_error(number, e.to_string()))?;
    let last_modified = last_modified.trim().parse::<i64>().map_err(|e| {
        parse_error(number, format!("invalid lastModified {:?}: {}", last_modified, e))
    })?;
    let size_bytes = size
        .trim()
        .parse::<u64>()
        .map_err(|e| parse_error(number, format!("invalid size {:?}: {}", size, e)))?;

    Ok(ManifestEntry {
        filename: filename.to_string(),
        archive_id,
        size_bytes,
        last_modified,
        hash: hash.filter(|h| !h.is_empty()).map(String::from),
    })
}

/// Durable home of a manifest.
///
/// Holds no lock: two processes sharing a manifest may corrupt it.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    /// Bind a store to a manifest path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the manifest file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "manifest".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Load and validate the manifest.
    ///
    /// # Errors
    /// - `Error::Configuration` if the file is missing or its settings are unusable
    /// - `Error::ManifestParse` if a line is malformed
    pub async fn load(&self) -> Result<Manifest> {
        if !self.path.is_file() {
            return Err(Error::Configuration(format!(
                "Manifest not found: {}",
                self.path.display()
            )));
        }

        let text = fs::read_to_string(&self.path).await?;
        let manifest = Manifest::parse(&text)?;
        manifest.validate()?;

        debug!(
            "Loaded manifest {} with {} entries",
            self.path.display(),
            manifest.len()
        );
        Ok(manifest)
    }

    /// Persist the manifest atomically.
    ///
    /// The new contents are written and synced to a sibling temporary file,
    /// which then replaces the manifest. A crash leaves either the old or the
    /// new file in place.
    pub async fn save(&self, manifest: &Manifest) -> Result<()> {
        let text = manifest.to_text()?;
        let temp_path = self.temp_path();

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(text.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}
