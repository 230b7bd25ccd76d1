// src/db/mod.rs

//! Scratch database layer
//!
//! Large Contents indices are spilled into a private SQLite database that
//! lives in a uniquely named temporary file. This module handles:
//! - Creating the scratch file and opening the connection
//! - Schema creation
//! - Transaction handling
//!
//! The file is removed when the `ScratchDb` is dropped, on success or failure.

pub mod models;
pub mod schema;

use crate::error::Result;
use rusqlite::{Connection, Transaction};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// A private SQLite database backed by a temporary file
pub struct ScratchDb {
    // Field order matters: the connection closes before the file is unlinked
    conn: Connection,
    file: NamedTempFile,
}

impl ScratchDb {
    /// Create a fresh scratch database with the contents schema applied
    pub fn create() -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("archive-man-")
            .suffix(".db")
            .tempfile()?;
        debug!("Creating scratch database at: {}", file.path().display());

        let conn = Connection::open(file.path())?;

        // Nothing here needs to survive a crash
        conn.execute_batch(
            "
            PRAGMA journal_mode = MEMORY;
            PRAGMA synchronous = OFF;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        schema::migrate(&conn)?;
        Ok(Self { conn, file })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl Drop for ScratchDb {
    fn drop(&mut self) {
        debug!("Releasing scratch database {}", self.file.path().display());
    }
}

/// Run `f` inside a transaction, committing on success
///
/// The transaction is rolled back when `f` returns an error.
pub fn transaction<T, F>(conn: &Connection, f: F) -> Result<T>
where
    F: FnOnce(&Transaction) -> Result<T>,
{
    let tx = conn.unchecked_transaction()?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_scratch_file_removed_on_drop() {
        let db = ScratchDb::create().unwrap();
        let path = db.path().to_path_buf();
        assert!(path.exists());
        drop(db);
        assert!(!path.exists());
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = ScratchDb::create().unwrap();
        let result: Result<()> = transaction(db.conn(), |tx| {
            tx.execute(
                "INSERT INTO contents (file, package_name, package) VALUES ('a', 'b', 'c/b')",
                [],
            )?;
            Err(Error::Unsupported("abort".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM contents", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
