//! Common types used throughout coldmirror.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of an archive stored in a vault.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArchiveId(String);

impl ArchiveId {
    /// Create a new ArchiveId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty or contains a manifest delimiter
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        validate_token("ArchiveId", &id)?;
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an asynchronous inventory retrieval job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Create a new JobId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty or contains a manifest delimiter
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        validate_token("JobId", &id)?;
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Ids are written verbatim into the line-oriented manifest.
fn validate_token(kind: &str, value: &str) -> crate::Result<()> {
    if value.is_empty() {
        return Err(crate::Error::InvalidInput(format!("{} cannot be empty", kind)));
    }
    if value.contains(['|', '\n', '\r']) {
        return Err(crate::Error::InvalidInput(format!(
            "{} cannot contain '|' or line breaks",
            kind
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_id_creation() {
        let id = ArchiveId::new("abc-123").unwrap();
        assert_eq!(id.as_str(), "abc-123");
        assert_eq!(id.to_string(), "abc-123");
    }

    #[test]
    fn test_archive_id_empty_fails() {
        assert!(ArchiveId::new("").is_err());
    }

    #[test]
    fn test_ids_reject_delimiters() {
        assert!(ArchiveId::new("a|b").is_err());
        assert!(JobId::new("job\n2").is_err());
    }

    #[test]
    fn test_job_id_creation() {
        let id = JobId::new("job-1").unwrap();
        assert_eq!(id.as_str(), "job-1");
    }
}
