//! Common error types for coldmirror.

use thiserror::Error;

/// Top-level error type for coldmirror operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Manifest contents or sync directories are unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A manifest line does not match the expected schema.
    #[error("Manifest parse error at line {line}: {reason}")]
    ManifestParse { line: usize, reason: String },

    /// Inventory job output could not be interpreted.
    #[error("Inventory parse error: {0}")]
    InventoryParse(String),

    /// Archive creation failed.
    #[error("Upload error: {0}")]
    Upload(String),

    /// Any other remote vault operation failed.
    #[error("Remote error: {0}")]
    Remote(String),

    /// Catalog read or write failed.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Whether the error originates from a transient remote condition.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Upload(_) | Error::Remote(_))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
