// src/reconcile/rename.rs

//! Rewrite pool paths recorded in Packages indices

use crate::context::Context;
use crate::error::{Error, Result};
use crate::filesystem::relocate;
use crate::packages::IndexRecord;
use crate::repository::Release;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Parse `old,new` lines into rename pairs
///
/// Blank lines are ignored; lines without exactly one comma are skipped.
pub fn parse_rename_list(text: &str) -> BTreeMap<String, String> {
    let mut pairs = BTreeMap::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.split(',').map(str::trim).collect::<Vec<_>>().as_slice() {
            [old, new] if !old.is_empty() && !new.is_empty() => {
                pairs.insert(old.to_string(), new.to_string());
            }
            _ => warn!("Skipping malformed rename line {}: {}", number + 1, line),
        }
    }
    pairs
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RenameReport {
    /// `old -> new` for every rewritten record
    pub renamed: Vec<(String, String)>,
    /// Index and Release files rewritten
    pub rewritten: Vec<PathBuf>,
    /// Pool files moved or copied
    pub moved: Vec<PathBuf>,
    /// Relocations that failed, with the reason
    pub failures: Vec<String>,
}

impl fmt::Display for RenameReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (old, new) in &self.renamed {
            writeln!(f, "{} -> {}", old, new)?;
        }
        for failure in &self.failures {
            writeln!(f, "failed: {}", failure)?;
        }
        Ok(())
    }
}

/// Fail if any rename pair names a file listed by a Sources record
fn reject_source_renames(
    releases: &mut [Release],
    pairs: &BTreeMap<String, String>,
    ctx: &Context,
) -> Result<()> {
    for release in releases.iter_mut() {
        for (path, index) in release.all_sources(ctx)?.iter() {
            for record in index.iter() {
                if let Some(file) = record.paths().into_iter().find(|p| pairs.contains_key(p)) {
                    return Err(Error::Unsupported(format!(
                        "renaming source files is not supported: {} ({} in {})",
                        file,
                        record.name(),
                        path
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Apply `pairs` (old pool path → new pool path) to every Packages index
/// under `topdir`, optionally moving the pool files too
///
/// All Sources indices are checked first; a pair naming a source file aborts
/// the run before anything is written. Only pairs some Packages record
/// carries (rewritten now or on an earlier run) are relocated, and a failed
/// relocation is recorded without stopping the others.
pub fn rename(
    topdir: &Path,
    pairs: &BTreeMap<String, String>,
    move_files: bool,
    ctx: &Context,
) -> Result<RenameReport> {
    let mut releases = Release::discover(topdir, ctx)?;
    reject_source_renames(&mut releases, pairs, ctx)?;

    let mut report = RenameReport::default();
    let by_new: HashMap<&str, &str> = pairs
        .iter()
        .map(|(old, new)| (new.as_str(), old.as_str()))
        .collect();
    let mut indexed: BTreeSet<&str> = BTreeSet::new();
    info!("Rewriting {} paths", pairs.len());

    for release in &mut releases {
        let mut release_changed = false;

        for (path, index) in release.all_packages(ctx)?.iter_mut() {
            let mut changed = false;
            for record in index.iter_mut() {
                let old = record.filename().to_string();
                if let Some(&earlier) = by_new.get(old.as_str()) {
                    indexed.insert(earlier);
                }
                let Some((key, new)) = pairs.get_key_value(&old) else {
                    continue;
                };
                if record.rewrite_filename(&old, new) {
                    indexed.insert(key.as_str());
                    debug!("{}: {} -> {}", path, old, new);
                    report.renamed.push((old, new.clone()));
                    changed = true;
                }
            }

            if changed {
                index.write()?;
                report.rewritten.push(PathBuf::from(index.location().to_string()));
                release_changed = true;
            }
        }

        if release_changed {
            debug!("Rewriting Release file: {}", release.location());
            release.write(ctx)?;
            report.rewritten.push(PathBuf::from(release.location().to_string()));
        }
    }

    if move_files {
        for old in indexed {
            let src = topdir.join(old);
            if !src.exists() {
                debug!("Nothing to move at {}", src.display());
                continue;
            }
            let dest = topdir.join(&pairs[old]);
            match relocate(&src, &dest) {
                Ok(true) => {
                    debug!("Moved {} to {}", src.display(), dest.display());
                    report.moved.push(dest);
                }
                Ok(false) => debug!("{} already exists", dest.display()),
                Err(e) => {
                    warn!("Failed to move {}: {}", src.display(), e);
                    report.failures.push(format!("{}: {}", old, e));
                }
            }
        }
    }

    info!("Renamed {} records", report.renamed.len());
    Ok(report)
}
