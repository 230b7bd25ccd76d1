// src/reconcile/check.rs

//! Pool versus index consistency
//!
//! `check` only reports; `strip` also deletes (or moves to a backup tree) the
//! pool files no index references and, in index mode, prunes index records
//! whose files are gone.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::filesystem::{file_md5, is_symlink, move_to_backup};
use crate::packages::{FileEntry, IndexRecord};
use crate::repository::{Index, Release};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Move unreferenced files under this root instead of deleting them
    pub backup: Option<PathBuf>,
    /// Report only, touch nothing
    pub dry_run: bool,
    /// Also prune index records whose files are missing
    pub index: bool,
    /// Pool-relative paths matching this pattern are never removed or pruned
    pub exclude: Option<Regex>,
    pub verify_md5: bool,
    pub verify_size: bool,
}

impl CheckOptions {
    fn excluded(&self, relative: &str) -> bool {
        self.exclude.as_ref().is_some_and(|re| re.is_match(relative))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// In the pool, referenced by no index
    Unreferenced,
    /// Referenced by an index, absent from the pool
    Missing,
    /// Present, but md5 or size disagree with the index
    Mismatch,
}

impl FindingKind {
    pub fn marker(&self) -> char {
        match self {
            FindingKind::Unreferenced => '+',
            FindingKind::Missing => '-',
            FindingKind::Mismatch => '!',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.marker(), self.path.display())?;
        if let Some(detail) = &self.detail {
            write!(f, " ({})", detail)?;
        }
        Ok(())
    }
}

/// Result of [`check`] and [`strip`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    pub findings: Vec<Finding>,
    /// `index-path: package` records pruned (or prunable) in index mode
    pub pruned: Vec<String>,
    /// Index and Release files rewritten
    pub rewritten: Vec<PathBuf>,
    /// Files deleted or moved
    pub removed: Vec<PathBuf>,
    /// Per-file failures that did not abort the pass
    pub failures: Vec<String>,
}

impl CheckReport {
    pub fn count(&self, kind: FindingKind) -> usize {
        self.findings.iter().filter(|f| f.kind == kind).count()
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for finding in &self.findings {
            writeln!(f, "{}", finding)?;
        }
        for failure in &self.failures {
            writeln!(f, "failed: {}", failure)?;
        }
        Ok(())
    }
}

/// Every file under `topdir` outside the index subtree
fn collect_pool(topdir: &Path, index_root: &Path) -> BTreeSet<PathBuf> {
    let mut pool = BTreeSet::new();
    let walker = WalkDir::new(topdir)
        .into_iter()
        .filter_entry(|e| e.path() != index_root);

    for entry in walker {
        match entry {
            Ok(entry) if !entry.file_type().is_dir() => {
                pool.insert(entry.into_path());
            }
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable entry: {}", e),
        }
    }
    pool
}

/// Compare an existing pool file against its index entry
fn verify(path: &Path, entry: &FileEntry, options: &CheckOptions) -> Option<String> {
    if options.verify_size {
        match fs::metadata(path) {
            Ok(meta) if meta.len() != entry.size => {
                return Some(format!("size {} != indexed {}", meta.len(), entry.size));
            }
            Ok(_) => {}
            Err(e) => return Some(format!("cannot stat: {}", e)),
        }
    }
    if options.verify_md5 && !entry.hash.is_empty() {
        match file_md5(path) {
            Ok(md5) if !md5.eq_ignore_ascii_case(&entry.hash) => {
                return Some(format!("md5 {} != indexed {}", md5, entry.hash));
            }
            Ok(_) => {}
            Err(e) => return Some(format!("cannot hash: {}", e)),
        }
    }
    None
}

struct Scan<'a> {
    topdir: &'a Path,
    options: &'a CheckOptions,
    pool: &'a BTreeSet<PathBuf>,
    keep: BTreeSet<PathBuf>,
    /// Resolved targets of declared symlinks, protected from removal only
    link_targets: BTreeSet<PathBuf>,
    mismatches: BTreeMap<PathBuf, String>,
}

impl Scan<'_> {
    /// Record a declared file; true if the owning record should be pruned
    fn declare(&mut self, entry: &FileEntry) -> bool {
        let path = self.topdir.join(&entry.path);
        let present = self.pool.contains(&path);

        if is_symlink(&path) {
            match fs::canonicalize(&path) {
                Ok(target) => {
                    self.link_targets.insert(target);
                }
                Err(e) => debug!("Dangling link {}: {}", path.display(), e),
            }
        }

        if present && (self.options.verify_md5 || self.options.verify_size) {
            if let Some(detail) = verify(&path, entry, self.options) {
                self.mismatches.insert(path.clone(), detail);
            }
        }
        self.keep.insert(path);

        !present && !self.options.excluded(&entry.path)
    }

    /// Declare every file of a record; true if any file is missing and unprotected
    fn declare_record(&mut self, record: &dyn IndexRecord) -> bool {
        let mut prune = false;
        for entry in record.files() {
            prune |= self.declare(&entry);
        }
        prune
    }
}

/// Declare every record of one index, pruning dead ones in index mode
///
/// Returns true when the index file was rewritten.
fn scan_index<R: IndexRecord>(
    path: &str,
    index: &mut Index<R>,
    scan: &mut Scan<'_>,
    mutate: bool,
    report: &mut CheckReport,
) -> Result<bool> {
    let mut dead = Vec::new();
    for record in index.iter() {
        if scan.declare_record(record) {
            dead.push(record.name().to_string());
        }
    }
    if !scan.options.index || dead.is_empty() {
        return Ok(false);
    }

    for name in &dead {
        debug!("Removing {} from {}", name, path);
        index.remove(name);
        report.pruned.push(format!("{}: {}", path, name));
    }
    if !mutate {
        debug!("Index file needs a rewrite: {}", index.location());
        return Ok(false);
    }
    index.write()?;
    report
        .rewritten
        .push(PathBuf::from(index.location().to_string()));
    Ok(true)
}

/// Report pool/index inconsistencies without changing anything
pub fn check(topdir: &Path, options: &CheckOptions, ctx: &Context) -> Result<CheckReport> {
    run(topdir, options, ctx, false)
}

/// Remove unreferenced pool files and, in index mode, prune dead records
///
/// A failed delete or move is logged and recorded; the pass continues.
pub fn strip(topdir: &Path, options: &CheckOptions, ctx: &Context) -> Result<CheckReport> {
    run(topdir, options, ctx, !options.dry_run)
}

fn run(topdir: &Path, options: &CheckOptions, ctx: &Context, mutate: bool) -> Result<CheckReport> {
    let index_root = topdir.join(&ctx.config().index_dir);
    if !index_root.is_dir() {
        return Err(Error::MissingArchive(index_root.display().to_string()));
    }
    // Symlink targets are canonical, so the pool must be too
    let topdir = fs::canonicalize(topdir)?;
    let index_root = topdir.join(&ctx.config().index_dir);

    if mutate {
        if let Some(backup) = &options.backup {
            fs::create_dir_all(backup)?;
        }
    }

    info!("Collecting pool files under {}", topdir.display());
    let pool = collect_pool(&topdir, &index_root);
    debug!("{} pool files", pool.len());

    let mut report = CheckReport::default();
    let mut scan = Scan {
        topdir: &topdir,
        options,
        pool: &pool,
        keep: BTreeSet::new(),
        link_targets: BTreeSet::new(),
        mismatches: BTreeMap::new(),
    };

    info!("Reading indices");
    for mut release in Release::discover(&topdir, ctx)? {
        let mut release_changed = false;

        for (path, index) in release.all_packages(ctx)?.iter_mut() {
            release_changed |= scan_index(path, index, &mut scan, mutate, &mut report)?;
        }
        for (path, index) in release.all_sources(ctx)?.iter_mut() {
            release_changed |= scan_index(path, index, &mut scan, mutate, &mut report)?;
        }

        if release_changed {
            debug!("Rewriting Release file: {}", release.location());
            release.write(ctx)?;
            report.rewritten.push(PathBuf::from(release.location().to_string()));
        }
    }

    let Scan {
        keep,
        link_targets,
        mismatches,
        ..
    } = scan;

    for path in pool.difference(&keep).filter(|p| !link_targets.contains(*p)) {
        let relative = path.strip_prefix(&topdir).unwrap_or(path);
        if options.excluded(&relative.to_string_lossy()) {
            debug!("Excluded from removal: {}", path.display());
            continue;
        }
        report.findings.push(Finding {
            kind: FindingKind::Unreferenced,
            path: path.clone(),
            detail: None,
        });
    }
    for path in keep.difference(&pool) {
        report.findings.push(Finding {
            kind: FindingKind::Missing,
            path: path.clone(),
            detail: None,
        });
    }
    for (path, detail) in mismatches {
        report.findings.push(Finding {
            kind: FindingKind::Mismatch,
            path,
            detail: Some(detail),
        });
    }

    if mutate {
        remove_unreferenced(&topdir, options, &mut report);
    } else {
        debug!("Report only, no files removed");
    }

    info!(
        "Check finished: {} unreferenced, {} missing, {} mismatched",
        report.count(FindingKind::Unreferenced),
        report.count(FindingKind::Missing),
        report.count(FindingKind::Mismatch)
    );
    Ok(report)
}

fn remove_unreferenced(topdir: &Path, options: &CheckOptions, report: &mut CheckReport) {
    let targets: Vec<PathBuf> = report
        .findings
        .iter()
        .filter(|f| f.kind == FindingKind::Unreferenced)
        .map(|f| f.path.clone())
        .collect();

    for path in targets {
        let result = match &options.backup {
            Some(backup) => move_to_backup(&path, topdir, backup).map(|dest| {
                debug!("Moved {} to {}", path.display(), dest.display());
            }),
            None => fs::remove_file(&path).map_err(Error::from).map(|()| {
                debug!("Removed {}", path.display());
            }),
        };

        match result {
            Ok(()) => report.removed.push(path),
            Err(e) => {
                warn!("Could not remove {}: {}", path.display(), e);
                report.failures.push(format!("{}: {}", path.display(), e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_finding_display() {
        let finding = Finding {
            kind: FindingKind::Mismatch,
            path: PathBuf::from("/srv/pool/a.deb"),
            detail: Some("size 3 != indexed 4".to_string()),
        };
        assert_eq!(finding.to_string(), "! /srv/pool/a.deb (size 3 != indexed 4)");
        assert_eq!(FindingKind::Unreferenced.marker(), '+');
        assert_eq!(FindingKind::Missing.marker(), '-');
    }

    #[test]
    fn test_verify_size_and_md5() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.deb");
        fs::write(&path, b"").unwrap();
        let entry = |hash: &str, size| FileEntry {
            hash: hash.to_string(),
            size,
            path: "a.deb".to_string(),
        };
        let both = CheckOptions {
            verify_md5: true,
            verify_size: true,
            ..Default::default()
        };

        assert_eq!(verify(&path, &entry("d41d8cd98f00b204e9800998ecf8427e", 0), &both), None);
        assert!(verify(&path, &entry("d41d8cd98f00b204e9800998ecf8427e", 4), &both)
            .unwrap()
            .starts_with("size 0"));
        assert!(verify(&path, &entry("0123456789abcdef0123456789abcdef", 0), &both)
            .unwrap()
            .starts_with("md5 "));
        assert_eq!(
            verify(&path, &entry("0123456789abcdef0123456789abcdef", 0), &CheckOptions::default()),
            None
        );
    }

    #[test]
    fn test_collect_pool_skips_index_tree() {
        let dir = tempdir().unwrap();
        let top = dir.path();
        for file in ["pool/main/a.deb", "dists/stable/Release", "README"] {
            let path = top.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"x").unwrap();
        }

        let pool = collect_pool(top, &top.join("dists"));
        let expected: BTreeSet<PathBuf> =
            [top.join("README"), top.join("pool/main/a.deb")].into_iter().collect();
        assert_eq!(pool, expected);
    }

    #[test]
    fn test_exclusion_matches_relative_path() {
        let options = CheckOptions {
            exclude: Some(Regex::new(r"^pool/keep/").unwrap()),
            ..Default::default()
        };
        assert!(options.excluded("pool/keep/a.deb"));
        assert!(!options.excluded("pool/main/a.deb"));
        assert!(!CheckOptions::default().excluded("pool/keep/a.deb"));
    }
}
