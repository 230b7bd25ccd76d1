// src/repository/contents/disk.rs

use super::{ContentMapping, for_each_line, package_name};
use crate::db::models::ContentRow;
use crate::db::{ScratchDb, transaction};
use crate::error::Result;
use crate::repository::Location;
use crate::repository::index::index_arch;
use std::io::BufRead;
use tracing::debug;

/// Contents mapping spilled into a scratch SQLite database
///
/// The database file belongs to this value and is removed when it drops.
pub struct DiskContents {
    location: Location,
    arch: String,
    db: ScratchDb,
}

impl DiskContents {
    pub fn new(location: Location) -> Result<Self> {
        let location = location.without_gz();
        let arch = index_arch(&location.to_string());
        let db = ScratchDb::create()?;
        debug!("Contents store for {} at {}", location, db.path().display());
        Ok(Self { location, arch, db })
    }
}

impl ContentMapping for DiskContents {
    fn location(&self) -> &Location {
        &self.location
    }

    fn arch(&self) -> &str {
        &self.arch
    }

    fn add_entry(&mut self, file: &str, package: &str) -> Result<()> {
        ContentRow::new(file, package).insert(self.db.conn())?;
        Ok(())
    }

    fn add_package(&mut self, package: &str, files: &[String]) -> Result<()> {
        transaction(self.db.conn(), |tx| {
            ContentRow::delete_by_package_name(tx, package_name(package))?;
            for file in files {
                ContentRow::new(file, package).insert(tx)?;
            }
            Ok(())
        })
    }

    fn remove_package(&mut self, name: &str) -> Result<bool> {
        Ok(ContentRow::delete_by_package_name(self.db.conn(), name)? > 0)
    }

    fn remove_file(&mut self, file: &str) -> Result<bool> {
        Ok(ContentRow::delete_by_file(self.db.conn(), file)? > 0)
    }

    fn files_of_package(&self, name: &str) -> Result<Vec<String>> {
        ContentRow::files_of(self.db.conn(), name)
    }

    fn packages_of_file(&self, file: &str) -> Result<Vec<String>> {
        ContentRow::packages_of(self.db.conn(), file)
    }

    fn package_fullname(&self, name: &str) -> Result<Option<String>> {
        ContentRow::fullname_of(self.db.conn(), name)
    }

    fn entries(&self) -> Result<Vec<(String, Vec<String>)>> {
        let mut out: Vec<(String, Vec<String>)> = Vec::new();
        for row in ContentRow::list_all(self.db.conn())? {
            match out.last_mut() {
                Some((file, packages)) if *file == row.file => packages.push(row.package),
                _ => out.push((row.file, vec![row.package])),
            }
        }
        Ok(out)
    }

    fn len(&self) -> Result<usize> {
        ContentRow::count_files(self.db.conn())
    }

    /// Bulk load inside a single transaction
    fn load_lines(&mut self, reader: &mut dyn BufRead) -> Result<usize> {
        transaction(self.db.conn(), |tx| {
            for_each_line(reader, |file, packages| {
                for package in packages {
                    ContentRow::new(file, package).insert(tx)?;
                }
                Ok(())
            })
        })
    }
}
