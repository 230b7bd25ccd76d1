// src/repository/index.rs

//! Packages and Sources index files
//!
//! An index keeps at most one live record per package name: while parsing,
//! a record only replaces an earlier one of the same name when it ranks
//! strictly higher (source version, then binary version).

use super::{Location, RepositoryClient};
use crate::error::{Error, Result};
use crate::filesystem::write_index_file;
use crate::packages::control::split_stanzas;
use crate::packages::traits::{IndexRecord, SOURCE_ARCH, rank};
use crate::packages::{BinaryPackage, SourcePackage};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

static BINARY_DIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"binary-([^/]+)/Packages").expect("static regex"));

/// Architecture an index file covers, derived from its path
///
/// `main/binary-amd64/Packages` → `amd64`, `main/source/Sources` → `source`,
/// `main/Contents-arm64` → `arm64`.
pub fn index_arch(path: &str) -> String {
    if let Some(caps) = BINARY_DIR.captures(path) {
        return caps[1].to_string();
    }
    let name = path.rsplit('/').next().unwrap_or(path);
    let name = name.strip_suffix(".gz").unwrap_or(name);
    if name == "Sources" {
        return SOURCE_ARCH.to_string();
    }
    if let Some(arch) = name.strip_prefix("Contents-") {
        return arch.to_string();
    }
    String::new()
}

/// A parsed Packages or Sources file
#[derive(Debug, Clone)]
pub struct Index<R> {
    location: Location,
    arch: String,
    records: BTreeMap<String, R>,
    rejected: usize,
}

pub type BinaryIndex = Index<BinaryPackage>;
pub type SourceIndex = Index<SourcePackage>;

impl<R: IndexRecord> Index<R> {
    /// Empty index at `location` (a trailing `.gz` is dropped)
    pub fn new(location: Location) -> Self {
        let location = location.without_gz();
        let arch = index_arch(&location.to_string());
        Self {
            location,
            arch,
            records: BTreeMap::new(),
            rejected: 0,
        }
    }

    /// Parse index text; malformed stanzas are logged and skipped
    pub fn parse(location: Location, text: &str) -> Self {
        let mut index = Self::new(location);

        for stanza in split_stanzas(text) {
            match R::parse(stanza) {
                Ok(record) => {
                    index.offer(record);
                }
                Err(e) => {
                    index.rejected += 1;
                    warn!("Skipping stanza in {}: {}", index.location, e);
                }
            }
        }

        debug!(
            "Parsed {} records from {} ({} rejected)",
            index.records.len(),
            index.location,
            index.rejected
        );
        index
    }

    /// Fetch and parse an index file
    pub fn load(client: &RepositoryClient, location: &Location) -> Result<Self> {
        let text = client.read_text(location)?;
        Ok(Self::parse(location.clone(), &text))
    }

    /// Keep `record` if it outranks the current one of the same name
    ///
    /// Returns true when the record was stored.
    pub fn offer(&mut self, record: R) -> bool {
        if let Some(existing) = self.records.get(record.name()) {
            if rank(&record, existing) != Ordering::Greater {
                return false;
            }
        }
        self.records.insert(record.name().to_string(), record);
        true
    }

    /// Store `record` unconditionally, replacing any record of the same name
    pub fn insert(&mut self, record: R) -> Option<R> {
        self.records.insert(record.name().to_string(), record)
    }

    pub fn get(&self, name: &str) -> Option<&R> {
        self.records.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut R> {
        self.records.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<R> {
        self.records.remove(name)
    }

    /// Keep only records for which `keep` returns true
    pub fn retain<F: FnMut(&R) -> bool>(&mut self, mut keep: F) {
        self.records.retain(|_, r| keep(r));
    }

    /// Records sorted by name
    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.records.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut R> {
        self.records.values_mut()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of stanzas rejected while parsing
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// Canonical text: records sorted by package name, blank-line separated
    pub fn render(&self) -> String {
        let mut out = String::new();
        for record in self.records.values() {
            out.push_str(record.text());
            out.push_str("\n\n");
        }
        out
    }

    /// Write to the index's own location (plus `.gz` sibling)
    pub fn write(&self) -> Result<()> {
        let path = self.location.require_local()?.to_path_buf();
        self.write_to(&path)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        info!("Writing {} ({} records)", path.display(), self.records.len());
        write_index_file(path, self.render().as_bytes())
    }
}

/// Either kind of index file
#[derive(Debug, Clone)]
pub enum IndexFile {
    Binary(BinaryIndex),
    Source(SourceIndex),
}

impl IndexFile {
    /// Load an index, choosing the record kind from the file name
    pub fn load(client: &RepositoryClient, location: &Location) -> Result<Self> {
        let name = location.without_gz();
        match name.file_name() {
            Some("Packages") => Ok(IndexFile::Binary(Index::load(client, location)?)),
            Some("Sources") => Ok(IndexFile::Source(Index::load(client, location)?)),
            _ => Err(Error::ParseError(format!(
                "{} is neither a Packages nor a Sources file",
                location
            ))),
        }
    }

    pub fn location(&self) -> &Location {
        match self {
            IndexFile::Binary(i) => i.location(),
            IndexFile::Source(i) => i.location(),
        }
    }

    pub fn arch(&self) -> &str {
        match self {
            IndexFile::Binary(i) => i.arch(),
            IndexFile::Source(i) => i.arch(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IndexFile::Binary(i) => i.len(),
            IndexFile::Source(i) => i.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stanzas dropped while parsing
    pub fn rejected(&self) -> usize {
        match self {
            IndexFile::Binary(i) => i.rejected(),
            IndexFile::Source(i) => i.rejected(),
        }
    }

    /// Records of either kind, sorted by name
    pub fn records(&self) -> Box<dyn Iterator<Item = &dyn IndexRecord> + '_> {
        match self {
            IndexFile::Binary(i) => Box::new(i.iter().map(|r| r as &dyn IndexRecord)),
            IndexFile::Source(i) => Box::new(i.iter().map(|r| r as &dyn IndexRecord)),
        }
    }

    pub fn write(&self) -> Result<()> {
        match self {
            IndexFile::Binary(i) => i.write(),
            IndexFile::Source(i) => i.write(),
        }
    }
}
