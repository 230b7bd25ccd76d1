// src/db/schema.rs

//! Schema definitions for the scratch database
//!
//! Scratch databases never outlive a run, but the version table keeps the
//! layout explicit and lets `migrate` stay idempotent.

use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::debug;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Apply all pending migrations
pub fn migrate(conn: &Connection) -> Result<()> {
    let current = get_schema_version(conn)?;

    for version in (current + 1)..=SCHEMA_VERSION {
        debug!("Applying scratch schema version {}", version);
        apply_migration(conn, version)?;
        conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    }
    Ok(())
}

fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        _ => Err(Error::Unsupported(format!(
            "unknown scratch schema version {}",
            version
        ))),
    }
}

/// Version 1: one row per (file, package) pair of a Contents index
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE contents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file TEXT NOT NULL,
            package_name TEXT NOT NULL,
            package TEXT NOT NULL,
            UNIQUE(file, package)
        );

        CREATE INDEX idx_contents_file ON contents(file);
        CREATE INDEX idx_contents_package_name ON contents(package_name);
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }
}
