//! In-memory catalog for testing.

use std::collections::HashMap;

use coldmirror_common::{Error, Result};

use crate::catalog::{Catalog, CatalogRecord};

/// In-memory catalog.
///
/// Lists filenames in insertion order. Writes can be made to fail to
/// exercise the driver's recovery path.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    filenames: Vec<String>,
    records: HashMap<String, CatalogRecord>,
    fail_writes: bool,
}

impl MemoryCatalog {
    /// Create a catalog listing the given filenames.
    pub fn new<I, S>(filenames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            filenames: filenames.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Last committed record for a filename.
    pub fn record(&self, filename: &str) -> Option<&CatalogRecord> {
        self.records.get(filename)
    }

    /// Number of filenames with a committed record.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

impl Catalog for MemoryCatalog {
    fn list_filenames(&self) -> Result<Vec<String>> {
        Ok(self
            .filenames
            .iter()
            .filter(|name| !name.is_empty())
            .cloned()
            .collect())
    }

    fn record_upload(&mut self, record: &CatalogRecord) -> Result<()> {
        if self.fail_writes {
            return Err(Error::Catalog(format!(
                "Simulated failure recording {}",
                record.filename
            )));
        }
        self.records.insert(record.filename.clone(), record.clone());
        Ok(())
    }
}
