// src/repository/release.rs

//! Release files and the indices they reference
//!
//! A `Release` identifies one suite. Its header fields are kept in file order;
//! its hash listing names the Packages, Sources and Contents files of the
//! suite, which are parsed on demand by [`Release::load_index`] and cached.

use super::contents::{self, ContentMapping};
use super::index::{BinaryIndex, SourceIndex};
use super::Location;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::filesystem::atomic_write;
use crate::packages::control::{FileEntry, Fields, parse_file_list};
use crate::repository::publish::RELEASE_FILES;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

static PACKAGES_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Packages(\.gz)?$").expect("static regex"));
static SOURCES_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Sources(\.gz)?$").expect("static regex"));
static CONTENTS_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Contents-\w+(\.gz)?$").expect("static regex"));

/// Multi-line hash listings; everything else is a header field
const HASH_LISTINGS: [&str; 4] = ["MD5Sum", "SHA1", "SHA256", "SHA512"];

/// Header fields merged as space-separated sets rather than overwritten
const SET_FIELDS: [&str; 2] = ["Components", "Architectures"];

/// Kind of index referenced by a Release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Packages,
    Sources,
    Contents,
}

impl IndexKind {
    /// Does a file basename belong to this kind?
    pub fn matches(&self, basename: &str) -> bool {
        match self {
            IndexKind::Packages => PACKAGES_NAME.is_match(basename),
            IndexKind::Sources => SOURCES_NAME.is_match(basename),
            IndexKind::Contents => CONTENTS_NAME.is_match(basename),
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexKind::Packages => "Packages",
            IndexKind::Sources => "Sources",
            IndexKind::Contents => "Contents",
        };
        f.write_str(s)
    }
}

/// One suite: header fields, hash listing, and lazily parsed indices
pub struct Release {
    location: Location,
    fields: Fields,
    files: Vec<FileEntry>,
    packages_files: BTreeMap<String, BinaryIndex>,
    sources_files: BTreeMap<String, SourceIndex>,
    contents_files: BTreeMap<String, Box<dyn ContentMapping>>,
    loaded: HashSet<IndexKind>,
}

impl fmt::Debug for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Release")
            .field("location", &self.location)
            .field("fields", &self.fields)
            .field("files", &self.files.len())
            .field("packages_files", &self.packages_files.keys())
            .field("sources_files", &self.sources_files.keys())
            .field("contents_files", &self.contents_files.keys())
            .finish()
    }
}

impl Release {
    /// Release with no fields and no files at `location`
    pub fn new_empty(location: Location) -> Self {
        Self {
            location,
            fields: Fields::new(),
            files: Vec::new(),
            packages_files: BTreeMap::new(),
            sources_files: BTreeMap::new(),
            contents_files: BTreeMap::new(),
            loaded: HashSet::new(),
        }
    }

    /// Parse Release text read from `location`
    ///
    /// Header fields are every field except the hash listings; the file list
    /// comes from `MD5Sum`, falling back to `SHA256`.
    pub fn parse_text(location: Location, text: &str) -> Result<Self> {
        let mut release = Self::new_empty(location);
        if text.trim().is_empty() {
            return Ok(release);
        }
        let all = Fields::parse(text).map_err(|e| {
            Error::ParseError(format!("Release {}: {}", release.location, e))
        })?;

        for (key, value) in all.iter() {
            if !value.is_empty() && !HASH_LISTINGS.iter().any(|h| h.eq_ignore_ascii_case(key)) {
                release.fields.set(key, value);
            }
        }

        let listing = all.get("MD5Sum").or_else(|| all.get("SHA256")).unwrap_or("");
        release.files = parse_file_list(listing);

        debug!(
            "Release {}: {} header fields, {} files",
            release.location,
            release.fields.len(),
            release.files.len()
        );
        Ok(release)
    }

    /// Read and parse a Release file
    pub fn open(location: &Location, ctx: &Context) -> Result<Self> {
        let text = ctx.client().read_text(location)?;
        Self::parse_text(location.clone(), &text)
    }

    /// Open a suite given either its directory or its Release file
    pub fn open_suite(location: &Location, ctx: &Context) -> Result<Self> {
        let file = if location.file_name() == Some("Release") {
            location.clone()
        } else {
            location.join("Release")
        };
        Self::open(&file, ctx)
    }

    /// Every `<topdir>/<index_dir>/*/Release`, sorted by path
    pub fn discover(topdir: &Path, ctx: &Context) -> Result<Vec<Release>> {
        let index_root = topdir.join(&ctx.config().index_dir);
        if !index_root.is_dir() {
            return Err(Error::MissingArchive(index_root.display().to_string()));
        }

        let pattern = format!(
            "{}/*/Release",
            glob::Pattern::escape(&index_root.to_string_lossy())
        );
        let paths = glob::glob(&pattern)
            .map_err(|e| Error::ParseError(format!("bad glob {}: {}", pattern, e)))?;

        let mut found: Vec<_> = paths
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Skipping unreadable path: {}", e);
                    None
                }
            })
            .collect();
        found.sort();

        let mut releases = Vec::with_capacity(found.len());
        for path in found {
            releases.push(Release::open(&Location::Local(path), ctx)?);
        }
        info!("Found {} releases under {}", releases.len(), index_root.display());
        Ok(releases)
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Directory containing the Release file
    pub fn suite_dir(&self) -> Location {
        self.location.parent()
    }

    /// Suite name: the `Suite` field, else the directory name
    pub fn name(&self) -> String {
        if let Some(suite) = self.field("Suite") {
            return suite.to_string();
        }
        self.suite_dir().file_name().unwrap_or_default().to_string()
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key)
    }

    pub fn set_field(&mut self, key: &str, value: &str) {
        self.fields.set(key, value);
    }

    /// Header fields in file order
    pub fn header(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Hash listing entries
    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    /// Parse every referenced index of `kind` that is not cached yet
    ///
    /// Referenced files that no longer exist are skipped. Repeated calls are
    /// no-ops.
    pub fn load_index(&mut self, kind: IndexKind, ctx: &Context) -> Result<()> {
        if self.loaded.contains(&kind) {
            return Ok(());
        }
        let suite_dir = self.suite_dir();
        let mut loaded = 0;

        let candidates: Vec<String> = self
            .files
            .iter()
            .map(|f| f.path.clone())
            .filter(|path| kind.matches(path.rsplit('/').next().unwrap_or(path)))
            .collect();

        for path in candidates {
            let key = path.strip_suffix(".gz").unwrap_or(&path).to_string();
            if self.is_cached(kind, &key) {
                continue;
            }

            let location = suite_dir.join(&path);
            if !ctx.client().exists(&location) {
                debug!("{} is listed but absent, skipping", location);
                continue;
            }

            let parsed = match kind {
                IndexKind::Packages => BinaryIndex::load(ctx.client(), &location)
                    .map(|i| {
                        self.packages_files.insert(key.clone(), i);
                    }),
                IndexKind::Sources => SourceIndex::load(ctx.client(), &location)
                    .map(|i| {
                        self.sources_files.insert(key.clone(), i);
                    }),
                IndexKind::Contents => {
                    contents::load(ctx.client(), &location, &ctx.config().contents).map(|c| {
                        self.contents_files.insert(key.clone(), c);
                    })
                }
            };

            match parsed {
                Ok(()) => loaded += 1,
                Err(Error::Fetch { url, reason }) => {
                    warn!("Could not fetch {}: {}", url, reason);
                }
                Err(e) => return Err(e),
            }
        }

        debug!("Loaded {} {} files for {}", loaded, kind, self.location);
        self.loaded.insert(kind);
        Ok(())
    }

    fn is_cached(&self, kind: IndexKind, key: &str) -> bool {
        match kind {
            IndexKind::Packages => self.packages_files.contains_key(key),
            IndexKind::Sources => self.sources_files.contains_key(key),
            IndexKind::Contents => self.contents_files.contains_key(key),
        }
    }

    /// Load and return every Packages index, keyed by suite-relative path
    pub fn all_packages(&mut self, ctx: &Context) -> Result<&mut BTreeMap<String, BinaryIndex>> {
        self.load_index(IndexKind::Packages, ctx)?;
        Ok(&mut self.packages_files)
    }

    pub fn all_sources(&mut self, ctx: &Context) -> Result<&mut BTreeMap<String, SourceIndex>> {
        self.load_index(IndexKind::Sources, ctx)?;
        Ok(&mut self.sources_files)
    }

    pub fn all_contents(
        &mut self,
        ctx: &Context,
    ) -> Result<&mut BTreeMap<String, Box<dyn ContentMapping>>> {
        self.load_index(IndexKind::Contents, ctx)?;
        Ok(&mut self.contents_files)
    }

    /// Cached Packages indices (nothing is loaded)
    pub fn packages(&self) -> &BTreeMap<String, BinaryIndex> {
        &self.packages_files
    }

    pub fn sources(&self) -> &BTreeMap<String, SourceIndex> {
        &self.sources_files
    }

    pub fn contents(&self) -> &BTreeMap<String, Box<dyn ContentMapping>> {
        &self.contents_files
    }

    /// Add or replace a Packages index under a suite-relative key
    pub fn insert_packages(&mut self, key: &str, index: BinaryIndex) {
        self.packages_files.insert(key.to_string(), index);
        self.loaded.insert(IndexKind::Packages);
    }

    pub fn insert_sources(&mut self, key: &str, index: SourceIndex) {
        self.sources_files.insert(key.to_string(), index);
        self.loaded.insert(IndexKind::Sources);
    }

    pub fn insert_contents(&mut self, key: &str, contents: Box<dyn ContentMapping>) {
        self.contents_files.insert(key.to_string(), contents);
        self.loaded.insert(IndexKind::Contents);
    }

    /// Fold another release's header into this one
    ///
    /// `Components` and `Architectures` become the union of both token sets;
    /// every other field takes the incoming value.
    pub fn merge_data(&mut self, other: &Release) {
        for (key, value) in other.fields.iter() {
            if SET_FIELDS.iter().any(|f| f.eq_ignore_ascii_case(key)) {
                let mut tokens: Vec<&str> = self
                    .fields
                    .get(key)
                    .map(|v| v.split_whitespace().collect())
                    .unwrap_or_default();
                for token in value.split_whitespace() {
                    if !tokens.contains(&token) {
                        tokens.push(token);
                    }
                }
                let joined = tokens.join(" ");
                self.fields.set(key, &joined);
            } else {
                self.fields.set(key, value);
            }
        }
    }

    /// Regenerate the Release file of a local suite and sign it
    ///
    /// Stale signatures are removed first. Signing failures are logged, the
    /// unsigned Release stays in place.
    pub fn write(&self, ctx: &Context) -> Result<()> {
        let suite_dir = self.suite_dir();
        let dir = suite_dir.require_local()?;

        for name in RELEASE_FILES.iter().filter(|n| **n != "Release") {
            let stale = dir.join(name);
            if stale.exists() {
                fs::remove_file(&stale)?;
            }
        }

        let text = ctx.generator().generate(dir, &self.header())?;
        atomic_write(&dir.join("Release"), text.as_bytes())?;
        info!("Wrote {}", dir.join("Release").display());

        if let Err(e) = ctx.signer().sign(dir) {
            warn!("Signing {} failed: {}", dir.display(), e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::filesystem::write_index_file;

    const RELEASE: &str = "\
Origin: Example
Suite: stable
Components: main contrib
Architectures: amd64
Date: Thu, 01 Jan 1970 00:00:00 UTC
MD5Sum:
 0123456789abcdef0123456789abcdef 100 main/binary-amd64/Packages
 0123456789abcdef0123456789abcdef 50 main/binary-amd64/Packages.gz
 0123456789abcdef0123456789abcdef 80 main/source/Sources.gz
 0123456789abcdef0123456789abcdef 10 main/binary-i386/Packages
 0123456789abcdef0123456789abcdef 10 main/Contents-amd64.gz
SHA256:
 0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef 100 main/binary-amd64/Packages
";

    #[test]
    fn test_parse_header_and_files() {
        let release =
            Release::parse_text(Location::parse("/srv/dists/stable/Release"), RELEASE).unwrap();
        assert_eq!(release.field("Origin"), Some("Example"));
        assert_eq!(release.field("Date"), Some("Thu, 01 Jan 1970 00:00:00 UTC"));
        assert!(release.field("MD5Sum").is_none());
        assert_eq!(release.files().len(), 5);
        assert_eq!(release.name(), "stable");
        let keys: Vec<String> = release.header().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Origin", "Suite", "Components", "Architectures", "Date"]);
    }

    #[test]
    fn test_kind_patterns() {
        assert!(IndexKind::Packages.matches("Packages"));
        assert!(IndexKind::Packages.matches("Packages.gz"));
        assert!(!IndexKind::Packages.matches("Packages.xz"));
        assert!(IndexKind::Sources.matches("Sources.gz"));
        assert!(IndexKind::Contents.matches("Contents-amd64.gz"));
        assert!(!IndexKind::Contents.matches("Contents-udeb-amd64"));
    }

    #[test]
    fn test_merge_data() {
        let mut a = Release::parse_text(Location::parse("a/Release"), RELEASE).unwrap();
        let b = Release::parse_text(
            Location::parse("b/Release"),
            "Origin: Other\nComponents: main non-free\nArchitectures: arm64 amd64\n",
        )
        .unwrap();
        a.merge_data(&b);
        assert_eq!(a.field("Origin"), Some("Other"));
        assert_eq!(a.field("Components"), Some("main contrib non-free"));
        assert_eq!(a.field("Architectures"), Some("amd64 arm64"));
        assert_eq!(a.field("Suite"), Some("stable"));
    }

    #[test]
    fn test_load_index_skips_missing_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let suite = dir.path().join("dists/stable");
        fs::create_dir_all(&suite).unwrap();
        fs::write(suite.join("Release"), RELEASE).unwrap();
        write_index_file(
            &suite.join("main/binary-amd64/Packages"),
            b"Package: a\nVersion: 1.0\nArchitecture: amd64\nFilename: pool/a_1.0_amd64.deb\n",
        )
        .unwrap();

        let ctx = Context::new(Config::default());
        let mut release = Release::open(&Location::Local(suite.join("Release")), &ctx).unwrap();
        {
            let packages = release.all_packages(&ctx).unwrap();
            // binary-i386 is listed but absent
            assert_eq!(packages.len(), 1);
            assert!(packages.contains_key("main/binary-amd64/Packages"));
        }
        fs::remove_file(suite.join("main/binary-amd64/Packages")).unwrap();
        assert_eq!(release.all_packages(&ctx).unwrap().len(), 1);
        assert!(release.all_sources(&ctx).unwrap().is_empty());
        assert!(release.all_contents(&ctx).unwrap().is_empty());
    }

    #[test]
    fn test_discover_and_write() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::new(Config::default());
        assert!(matches!(
            Release::discover(dir.path(), &ctx),
            Err(Error::MissingArchive(_))
        ));

        let suite = dir.path().join("dists/stable");
        fs::create_dir_all(suite.join("main/binary-amd64")).unwrap();
        fs::write(suite.join("Release"), RELEASE).unwrap();
        fs::write(suite.join("InRelease"), "stale").unwrap();
        fs::write(suite.join("main/binary-amd64/Packages"), "").unwrap();

        let releases = Release::discover(dir.path(), &ctx).unwrap();
        assert_eq!(releases.len(), 1);
        releases[0].write(&ctx).unwrap();

        assert!(!suite.join("InRelease").exists());
        let rewritten = Release::open(&Location::Local(suite.join("Release")), &ctx).unwrap();
        assert_eq!(rewritten.field("Origin"), Some("Example"));
        assert_ne!(rewritten.field("Date"), Some("Thu, 01 Jan 1970 00:00:00 UTC"));
        let paths: Vec<&str> = rewritten.files().iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["main/binary-amd64/Packages"]);
    }
}
