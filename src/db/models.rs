// src/db/models.rs

//! Row model for the scratch contents table

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

/// One file of one package, as listed in a Contents index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRow {
    pub file: String,
    /// Base package name (`busybox`)
    pub package_name: String,
    /// Qualified package entry (`utils/busybox`)
    pub package: String,
}

impl ContentRow {
    pub fn new(file: &str, package: &str) -> Self {
        Self {
            file: file.to_string(),
            package_name: package_name(package).to_string(),
            package: package.to_string(),
        }
    }

    /// Insert this row; duplicates of (file, package) are ignored
    pub fn insert(&self, conn: &Connection) -> Result<bool> {
        let changed = conn.execute(
            "INSERT OR IGNORE INTO contents (file, package_name, package) VALUES (?1, ?2, ?3)",
            params![&self.file, &self.package_name, &self.package],
        )?;
        Ok(changed > 0)
    }

    /// Files of a package, sorted
    pub fn files_of(conn: &Connection, package_name: &str) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT file FROM contents WHERE package_name = ?1 ORDER BY file",
        )?;
        let rows = stmt
            .query_map([package_name], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
    }

    /// Qualified package entries listing a file, sorted
    pub fn packages_of(conn: &Connection, file: &str) -> Result<Vec<String>> {
        let mut stmt =
            conn.prepare("SELECT package FROM contents WHERE file = ?1 ORDER BY package")?;
        let rows = stmt
            .query_map([file], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
    }

    /// Most recently inserted qualified entry for a base package name
    pub fn fullname_of(conn: &Connection, package_name: &str) -> Result<Option<String>> {
        let fullname = conn
            .query_row(
                "SELECT package FROM contents WHERE package_name = ?1 ORDER BY id DESC LIMIT 1",
                [package_name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(fullname)
    }

    pub fn delete_by_package_name(conn: &Connection, package_name: &str) -> Result<usize> {
        Ok(conn.execute(
            "DELETE FROM contents WHERE package_name = ?1",
            [package_name],
        )?)
    }

    pub fn delete_by_file(conn: &Connection, file: &str) -> Result<usize> {
        Ok(conn.execute("DELETE FROM contents WHERE file = ?1", [file])?)
    }

    /// All rows ordered by file, then package
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT file, package_name, package FROM contents ORDER BY file, package",
        )?;
        let rows = stmt
            .query_map([], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Number of distinct files
    pub fn count_files(conn: &Connection) -> Result<usize> {
        let count: i64 =
            conn.query_row("SELECT COUNT(DISTINCT file) FROM contents", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            file: row.get(0)?,
            package_name: row.get(1)?,
            package: row.get(2)?,
        })
    }
}

/// Base name of a qualified package entry (`admin/utils/busybox` → `busybox`)
pub fn package_name(package: &str) -> &str {
    package.rsplit('/').next().unwrap_or(package)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::migrate(&conn).unwrap();
        conn
    }

    #[test]
    fn test_package_name() {
        assert_eq!(package_name("utils/busybox"), "busybox");
        assert_eq!(package_name("non-free/net/foo"), "foo");
        assert_eq!(package_name("bare"), "bare");
    }

    #[test]
    fn test_insert_and_query() {
        let conn = conn();
        assert!(ContentRow::new("bin/busybox", "utils/busybox").insert(&conn).unwrap());
        assert!(!ContentRow::new("bin/busybox", "utils/busybox").insert(&conn).unwrap());
        ContentRow::new("bin/sh", "utils/busybox").insert(&conn).unwrap();
        ContentRow::new("bin/sh", "shells/dash").insert(&conn).unwrap();

        assert_eq!(
            ContentRow::files_of(&conn, "busybox").unwrap(),
            vec!["bin/busybox", "bin/sh"]
        );
        assert_eq!(
            ContentRow::packages_of(&conn, "bin/sh").unwrap(),
            vec!["shells/dash", "utils/busybox"]
        );
        assert_eq!(
            ContentRow::fullname_of(&conn, "dash").unwrap().as_deref(),
            Some("shells/dash")
        );
        assert_eq!(ContentRow::count_files(&conn).unwrap(), 2);

        assert_eq!(ContentRow::delete_by_file(&conn, "bin/sh").unwrap(), 2);
        assert!(ContentRow::fullname_of(&conn, "dash").unwrap().is_none());
        assert_eq!(ContentRow::list_all(&conn).unwrap().len(), 1);
    }
}
