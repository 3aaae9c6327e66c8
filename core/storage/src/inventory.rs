//! Inventory document exchanged between the vault and the importer.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use coldmirror_common::{Error, Result};

/// One archive as listed by an inventory job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ArchiveDescriptor {
    /// Opaque archive id.
    pub archive_id: String,
    /// Description given at upload time; the logical filename.
    pub archive_description: String,
    /// RFC 3339 creation timestamp.
    pub creation_date: String,
    /// Archive size in bytes.
    pub size: u64,
    /// Tree hash computed by the vault.
    #[serde(rename = "SHA256TreeHash")]
    pub sha256_tree_hash: String,
}

impl ArchiveDescriptor {
    /// Creation date as whole epoch seconds (UTC).
    pub fn creation_epoch(&self) -> Result<i64> {
        DateTime::parse_from_rfc3339(&self.creation_date)
            .map(|dt| dt.timestamp())
            .map_err(|e| {
                Error::InventoryParse(format!(
                    "invalid CreationDate '{}' for archive {}: {}",
                    self.creation_date, self.archive_id, e
                ))
            })
    }
}

/// Full output of an inventory job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryReport {
    #[serde(rename = "VaultARN", default)]
    pub vault_arn: String,
    #[serde(rename = "InventoryDate", default)]
    pub inventory_date: String,
    #[serde(rename = "ArchiveList")]
    pub archive_list: Vec<ArchiveDescriptor>,
}

impl InventoryReport {
    /// Build a report stamped with the current time.
    pub fn new(vault_arn: impl Into<String>, archive_list: Vec<ArchiveDescriptor>) -> Self {
        Self {
            vault_arn: vault_arn.into(),
            inventory_date: format_timestamp(Utc::now()),
            archive_list,
        }
    }

    /// Parse raw job output.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| Error::InventoryParse(e.to_string()))
    }

    /// Serialize for delivery as job output.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Render a timestamp the way inventory documents carry them.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "VaultARN": "arn:coldmirror:eu-west-1:local:vaults/docs",
        "InventoryDate": "2024-03-01T08:00:00Z",
        "ArchiveList": [
            {
                "ArchiveId": "id-1",
                "ArchiveDescription": "a.txt",
                "CreationDate": "2024-02-28T12:30:00Z",
                "Size": 100,
                "SHA256TreeHash": "beef"
            }
        ]
    }"#;

    #[test]
    fn test_parse_inventory_document() {
        let report = InventoryReport::from_slice(SAMPLE.as_bytes()).unwrap();
        assert_eq!(report.archive_list.len(), 1);

        let archive = &report.archive_list[0];
        assert_eq!(archive.archive_description, "a.txt");
        assert_eq!(archive.size, 100);
        assert_eq!(archive.sha256_tree_hash, "beef");
        assert_eq!(archive.creation_epoch().unwrap(), 1709123400);
    }

    #[test]
    fn test_offset_dates_convert_to_utc() {
        let archive = ArchiveDescriptor {
            archive_id: "id".to_string(),
            archive_description: "x".to_string(),
            creation_date: "1970-01-01T01:00:00+01:00".to_string(),
            size: 0,
            sha256_tree_hash: String::new(),
        };
        assert_eq!(archive.creation_epoch().unwrap(), 0);
    }

    #[test]
    fn test_malformed_output_is_inventory_error() {
        let err = InventoryReport::from_slice(b"<html>oops</html>").unwrap_err();
        assert!(matches!(err, Error::InventoryParse(_)));

        let err = InventoryReport::from_slice(br#"{"ArchiveList": [{"ArchiveId": 1}]}"#)
            .unwrap_err();
        assert!(matches!(err, Error::InventoryParse(_)));
    }
}
