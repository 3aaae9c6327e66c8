//! SQLite-backed document catalog.

use rusqlite::{params, Connection};
use std::path::Path;
use tracing::{debug, info};

use coldmirror_common::{Error, Result};

use crate::catalog::{Catalog, CatalogRecord};

fn catalog_err(e: rusqlite::Error) -> Error {
    Error::Catalog(e.to_string())
}

/// Stored archive details of a catalog document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRow {
    pub name: String,
    pub archive_id: Option<String>,
    pub archive_vault: Option<String>,
    pub archived_at: Option<i64>,
}

/// Document catalog in a SQLite database.
///
/// The connection is owned for the catalog's lifetime and closed on drop.
pub struct SqliteCatalog {
    conn: Connection,
}

impl SqliteCatalog {
    /// Create or open a catalog database.
    ///
    /// # Arguments
    /// - `db_path`: Path to the SQLite database file
    ///
    /// # Errors
    /// - Database creation or schema setup failure
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path).map_err(catalog_err)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                name TEXT PRIMARY KEY,
                archive_id TEXT,
                archive_vault TEXT,
                archived_at INTEGER
            );
            "#,
        )
        .map_err(catalog_err)?;

        info!("Catalog opened successfully");
        Ok(Self { conn })
    }

    /// Create an in-memory catalog (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Register a document to be mirrored.
    pub fn add_document(&self, name: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO documents (name) VALUES (?1)",
                params![name],
            )
            .map_err(catalog_err)?;
        Ok(())
    }

    /// Get a document by name.
    pub fn document(&self, name: &str) -> Result<Option<DocumentRow>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT name, archive_id, archive_vault, archived_at
                FROM documents WHERE name = ?1
                "#,
            )
            .map_err(catalog_err)?;

        let row = stmt.query_row([name], |row| {
            Ok(DocumentRow {
                name: row.get(0)?,
                archive_id: row.get(1)?,
                archive_vault: row.get(2)?,
                archived_at: row.get(3)?,
            })
        });

        match row {
            Ok(r) => Ok(Some(r)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(catalog_err(e)),
        }
    }
}

impl Catalog for SqliteCatalog {
    fn list_filenames(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM documents WHERE name IS NOT NULL AND name != ''")
            .map_err(catalog_err)?;

        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(catalog_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(catalog_err)?;

        debug!("Catalog lists {} documents", names.len());
        Ok(names)
    }

    fn record_upload(&mut self, record: &CatalogRecord) -> Result<()> {
        // Dropping an uncommitted transaction rolls it back
        let tx = self.conn.transaction().map_err(catalog_err)?;

        let updated = tx
            .execute(
                r#"
                UPDATE documents
                SET archive_id = ?1, archive_vault = ?2, archived_at = ?3
                WHERE name = ?4
                "#,
                params![
                    record.archive_id.as_str(),
                    record.vault_arn,
                    record.archived_at,
                    record.filename,
                ],
            )
            .map_err(catalog_err)?;

        if updated == 0 {
            return Err(Error::Catalog(format!(
                "No catalog document named {}",
                record.filename
            )));
        }

        tx.commit().map_err(catalog_err)
    }
}
