//! Document catalog for coldmirror.
//!
//! The catalog is the authoritative list of filenames to mirror and the
//! audit trail of where each one was archived. It is a separate store from
//! the manifest and only best-effort consistent with it.

pub mod catalog;
pub mod memory;
pub mod sqlite;

pub use catalog::{Catalog, CatalogRecord};
pub use memory::MemoryCatalog;
pub use sqlite::SqliteCatalog;
