// src/packages/traits.rs

//! Common interface for index records (binary and source stanzas)

use crate::error::Result;
use crate::packages::control::FileEntry;
use crate::version::{Version, compare};
use std::cmp::Ordering;

/// Architecture label used for source records and Sources indices
pub const SOURCE_ARCH: &str = "source";

/// A record of a Packages or Sources index
pub trait IndexRecord {
    /// Parse one stanza
    fn parse(stanza: &str) -> Result<Self>
    where
        Self: Sized;

    /// Get the package name
    fn name(&self) -> &str;

    /// Get the architecture (`source` for source records)
    fn architecture(&self) -> &str;

    /// Name of the source package this record was built from
    fn source(&self) -> &str;

    /// Version used for ranking (the source version)
    fn version(&self) -> &Version;

    /// Version of the record itself
    fn binary_version(&self) -> &Version;

    /// Pool-relative files with their indexed md5 and size
    fn files(&self) -> Vec<FileEntry>;

    /// Original stanza text
    fn text(&self) -> &str;

    /// Pool-relative paths of all files
    fn paths(&self) -> Vec<String> {
        self.files().into_iter().map(|f| f.path).collect()
    }
}

/// Ranking order between two records: source version, then binary version
pub fn rank(a: &dyn IndexRecord, b: &dyn IndexRecord) -> Ordering {
    compare(a.version(), b.version()).then_with(|| compare(a.binary_version(), b.binary_version()))
}
