// src/repository/contents/mod.rs

//! Contents indices: a bidirectional file ↔ package mapping
//!
//! Each Contents file lists one line per distinct file with a comma separated
//! list of qualified package entries (`section/name`). Two stores implement the
//! same `ContentMapping` interface:
//! - `MemoryContents` keeps both directions in ordered maps
//! - `DiskContents` spills rows into a scratch SQLite database
//!
//! Both keep the invariant that `packages_of_file(f)` contains `P` exactly when
//! `files_of_package(package_name(P))` contains `f`.

mod disk;
mod memory;

pub use crate::db::models::package_name;
pub use disk::DiskContents;
pub use memory::MemoryContents;

use super::{Location, RepositoryClient};
use crate::config::ContentsSection;
use crate::error::Result;
use crate::filesystem::write_index_file;
use std::io::BufRead;
use std::path::Path;
use tracing::{debug, info};

/// Column at which the package list starts when writing
const PACKAGE_COLUMN: usize = 60;

/// Common interface of the Contents stores
pub trait ContentMapping {
    /// Location of the index (without `.gz`)
    fn location(&self) -> &Location;

    /// Architecture this Contents file covers
    fn arch(&self) -> &str;

    /// Record that `file` belongs to the qualified package entry `package`
    fn add_entry(&mut self, file: &str, package: &str) -> Result<()>;

    /// Set the file list of a package, replacing whatever it listed before
    fn add_package(&mut self, package: &str, files: &[String]) -> Result<()>;

    /// Drop a package (by base name) from every file it lists
    ///
    /// Files left without any package disappear. Returns false if the package
    /// was unknown.
    fn remove_package(&mut self, name: &str) -> Result<bool>;

    /// Drop a file and its package associations
    fn remove_file(&mut self, file: &str) -> Result<bool>;

    /// Files of a package, by base name, sorted
    fn files_of_package(&self, name: &str) -> Result<Vec<String>>;

    /// Qualified package entries listing `file`, sorted
    fn packages_of_file(&self, file: &str) -> Result<Vec<String>>;

    /// Qualified entry (`utils/busybox`) for a base package name
    fn package_fullname(&self, name: &str) -> Result<Option<String>>;

    /// Every file with its package entries, sorted by file
    fn entries(&self) -> Result<Vec<(String, Vec<String>)>>;

    /// Number of distinct files
    fn len(&self) -> Result<usize>;

    /// Parse Contents lines from `reader`; returns the number of file lines
    fn load_lines(&mut self, reader: &mut dyn BufRead) -> Result<usize> {
        for_each_line(reader, |file, packages| {
            for package in packages {
                self.add_entry(file, package)?;
            }
            Ok(())
        })
    }

    fn load_text(&mut self, text: &str) -> Result<usize> {
        self.load_lines(&mut text.as_bytes())
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Render in Contents format
    fn render(&self) -> Result<String> {
        let mut out = String::new();
        for (file, packages) in self.entries()? {
            out.push_str(&format_line(&file, &packages));
        }
        Ok(out)
    }

    fn write(&self) -> Result<()> {
        let path = self.location().require_local()?.to_path_buf();
        self.write_to(&path)
    }

    fn write_to(&self, path: &Path) -> Result<()> {
        info!("Writing {}", path.display());
        write_index_file(path, self.render()?.as_bytes())
    }
}

fn format_line(file: &str, packages: &[String]) -> String {
    format!(
        "{:<width$} {}\n",
        file,
        packages.join(","),
        width = PACKAGE_COLUMN - 1
    )
}

/// Split one Contents line into the file path and its package entries
///
/// The path may itself contain whitespace, so the split happens at the last
/// whitespace run. Returns None for blank lines and the `FILE LOCATION` header.
pub fn parse_line(line: &str) -> Option<(&str, Vec<&str>)> {
    let line = line.trim_end();
    let (file, packages) = line.rsplit_once(|c: char| c.is_whitespace())?;
    let file = file.trim_end();
    if file.is_empty() || (file == "FILE" && packages == "LOCATION") {
        return None;
    }
    let packages: Vec<&str> = packages.split(',').filter(|p| !p.is_empty()).collect();
    if packages.is_empty() {
        return None;
    }
    Some((file, packages))
}

/// Call `f` for every file line read from `reader`, returning the count
///
/// Invalid UTF-8 is replaced line by line.
pub(crate) fn for_each_line<F>(reader: &mut dyn BufRead, mut f: F) -> Result<usize>
where
    F: FnMut(&str, Vec<&str>) -> Result<()>,
{
    let mut buf = Vec::new();
    let mut lines = 0;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(lines);
        }
        let line = String::from_utf8_lossy(&buf);
        if let Some((file, packages)) = parse_line(&line) {
            f(file, packages)?;
            lines += 1;
        }
    }
}

/// Empty store for `location`, choosing the backing for a file of `size` bytes
pub fn new_store(
    location: Location,
    size: usize,
    config: &ContentsSection,
) -> Result<Box<dyn ContentMapping>> {
    if config.use_disk(size) {
        Ok(Box::new(DiskContents::new(location)?))
    } else {
        Ok(Box::new(MemoryContents::new(location)))
    }
}

/// Stream a Contents file into the configured store
///
/// The backing is chosen from the decoded size before any line is parsed.
pub fn load(
    client: &RepositoryClient,
    location: &Location,
    config: &ContentsSection,
) -> Result<Box<dyn ContentMapping>> {
    let mut opened = client.open_reader(location)?;
    let size = usize::try_from(opened.size).unwrap_or(usize::MAX);
    let mut store = new_store(location.clone(), size, config)?;

    store.load_lines(&mut opened.reader)?;

    debug!("Loaded {} files from {}", store.len()?, store.location());
    Ok(store)
}
