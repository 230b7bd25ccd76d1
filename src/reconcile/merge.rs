// src/reconcile/merge.rs

//! Merge several suites of one archive into a new suite
//!
//! Phases:
//! 1. per input suite, keep the highest version per merge key
//! 2. across suites, pick one winner per key according to the policy
//! 3. write Packages/Sources (and optionally Contents) holding exactly the winners
//! 4. write a Release whose header is the union of the inputs, `Suite` = target

use crate::context::Context;
use crate::error::{Error, Result};
use crate::packages::IndexRecord;
use crate::repository::contents::{self, ContentMapping};
use crate::repository::index::{BinaryIndex, Index, SourceIndex};
use crate::repository::{IndexKind, Location, Release};
use crate::version::{Version, compare};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// How a winner is chosen among suites sharing a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Earliest suite in the input order
    First,
    /// Latest suite in the input order
    Last,
    /// Highest version, whatever the suite order
    #[default]
    Version,
}

impl FromStr for MergePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "first" => Ok(MergePolicy::First),
            "last" => Ok(MergePolicy::Last),
            "version" => Ok(MergePolicy::Version),
            _ => Err(Error::ParseError(format!("unknown merge policy '{}'", s))),
        }
    }
}

/// What makes two records "the same package"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyMode {
    /// Source package name
    #[default]
    Source,
    /// Binary name, architecture and index architecture
    Binary,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    pub policy: MergePolicy,
    pub key_mode: KeyMode,
    pub with_contents: bool,
    pub force: bool,
}

/// Result of [`merge`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    pub target: String,
    /// Suite-relative index path → records written
    pub indices: BTreeMap<String, usize>,
    /// Contents files written
    pub contents: Vec<String>,
    /// `name:arch` of winners without a Contents entry in their suite
    pub missing_contents: Vec<String>,
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Merged into {}", self.target)?;
        for (path, count) in &self.indices {
            writeln!(f, "  {} ({} records)", path, count)?;
        }
        for path in &self.contents {
            writeln!(f, "  {}", path)?;
        }
        for missing in &self.missing_contents {
            writeln!(f, "  contents not found: {}", missing)?;
        }
        Ok(())
    }
}

/// Versions a record ranks by
///
/// Keyed by source, every record of a source package ranks by the source
/// version alone, so binNMUs and `all` packages tie with their siblings and
/// the Sources record. Keyed by binary, the binary version breaks ties.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Rank {
    version: Version,
    binary: Option<Version>,
}

impl Rank {
    fn of(record: &dyn IndexRecord, mode: KeyMode) -> Self {
        Self {
            version: record.version().clone(),
            binary: match mode {
                KeyMode::Source => None,
                KeyMode::Binary => Some(record.binary_version().clone()),
            },
        }
    }

    fn cmp_rank(&self, other: &Rank) -> Ordering {
        compare(&self.version, &other.version).then_with(|| match (&self.binary, &other.binary) {
            (Some(a), Some(b)) => compare(a, b),
            _ => Ordering::Equal,
        })
    }
}

fn merge_key(record: &dyn IndexRecord, index_arch: &str, mode: KeyMode) -> String {
    match mode {
        KeyMode::Source => record.source().to_string(),
        KeyMode::Binary => format!("{},{},{}", record.name(), record.architecture(), index_arch),
    }
}

/// Every (key, rank) of one suite, binaries and sources together
fn suite_records(release: &Release, mode: KeyMode) -> Vec<(String, Rank)> {
    let mut out = Vec::new();
    for index in release.packages().values() {
        for record in index.iter() {
            out.push((merge_key(record, index.arch(), mode), Rank::of(record, mode)));
        }
    }
    for index in release.sources().values() {
        for record in index.iter() {
            out.push((merge_key(record, index.arch(), mode), Rank::of(record, mode)));
        }
    }
    out
}

/// Phases 1 and 2: winning (suite position, rank) per key
fn select_winners(
    releases: &[Release],
    options: &MergeOptions,
) -> BTreeMap<String, (usize, Rank)> {
    let mut winners: BTreeMap<String, (usize, Rank)> = BTreeMap::new();

    for (pos, release) in releases.iter().enumerate() {
        let mut best: BTreeMap<String, Rank> = BTreeMap::new();
        for (key, rank) in suite_records(release, options.key_mode) {
            match best.get(&key) {
                Some(existing) if rank.cmp_rank(existing) != Ordering::Greater => {}
                _ => {
                    best.insert(key, rank);
                }
            }
        }

        for (key, rank) in best {
            let replace = match (winners.get(&key), options.policy) {
                (None, _) => true,
                (Some(_), MergePolicy::First) => false,
                (Some(_), MergePolicy::Last) => true,
                (Some((_, current)), MergePolicy::Version) => {
                    rank.cmp_rank(current) == Ordering::Greater
                }
            };
            if replace {
                winners.insert(key, (pos, rank));
            }
        }
    }
    winners
}

fn is_winner(
    winners: &BTreeMap<String, (usize, Rank)>,
    key: &str,
    pos: usize,
    record: &dyn IndexRecord,
    mode: KeyMode,
) -> bool {
    matches!(winners.get(key), Some((p, rank)) if *p == pos && rank.cmp_rank(&Rank::of(record, mode)) == Ordering::Equal)
}

/// Contents index of `release` covering a Packages index at `index_path`
fn find_contents<'a>(
    release: &'a Release,
    index_path: &str,
    arch: &str,
) -> Option<(String, &'a dyn ContentMapping)> {
    let component = index_path.split('/').next().unwrap_or("");
    let candidates = [
        format!("{}/Contents-{}", component, arch),
        format!("Contents-{}", arch),
    ];
    candidates.into_iter().find_map(|key| {
        release
            .contents()
            .get(&key)
            .map(|store| (key, store.as_ref()))
    })
}

/// Copy a winner's Contents entry into the merged store; false if it has none
fn carry_contents(
    release: &Release,
    index_path: &str,
    arch: &str,
    record: &dyn IndexRecord,
    new_contents: &mut BTreeMap<String, Box<dyn ContentMapping>>,
) -> Result<bool> {
    let Some((key, store)) = find_contents(release, index_path, arch) else {
        return Ok(false);
    };
    let files = store.files_of_package(record.name())?;
    let Some(fullname) = store.package_fullname(record.name())? else {
        return Ok(false);
    };
    match new_contents.get_mut(&key) {
        Some(target) if !files.is_empty() => {
            target.add_package(&fullname, &files)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Merge `sources` (suite names under `topdir`) into `target`
///
/// Fails with `TargetExists` before touching anything when the target suite
/// directory exists and `force` is not set.
pub fn merge(
    topdir: &Path,
    sources: &[String],
    target: &str,
    options: &MergeOptions,
    ctx: &Context,
) -> Result<MergeReport> {
    let target_dir = topdir.join(target);
    if target_dir.exists() && !options.force {
        return Err(Error::TargetExists(target_dir.display().to_string()));
    }

    let mut releases = Vec::with_capacity(sources.len());
    for suite in sources {
        let mut release = Release::open(&Location::Local(topdir.join(suite).join("Release")), ctx)?;
        release.load_index(IndexKind::Packages, ctx)?;
        release.load_index(IndexKind::Sources, ctx)?;
        if options.with_contents {
            release.load_index(IndexKind::Contents, ctx)?;
        }
        releases.push(release);
    }

    info!("Selecting packages from {} suites", releases.len());
    let winners = select_winners(&releases, options);
    debug!("{} merge keys selected", winners.len());

    info!("Building merged Packages, Sources and Contents");
    let mut report = MergeReport {
        target: target.to_string(),
        ..Default::default()
    };
    let mut new_packages: BTreeMap<String, BinaryIndex> = BTreeMap::new();
    let mut new_sources: BTreeMap<String, SourceIndex> = BTreeMap::new();
    let mut new_contents: BTreeMap<String, Box<dyn ContentMapping>> = BTreeMap::new();

    for release in &releases {
        for path in release.packages().keys() {
            new_packages
                .entry(path.clone())
                .or_insert_with(|| Index::new(Location::Local(target_dir.join(path))));
        }
        for path in release.sources().keys() {
            new_sources
                .entry(path.clone())
                .or_insert_with(|| Index::new(Location::Local(target_dir.join(path))));
        }
        if options.with_contents {
            for path in release.contents().keys() {
                if !new_contents.contains_key(path) {
                    let store = contents::new_store(
                        Location::Local(target_dir.join(path)),
                        0,
                        &ctx.config().contents,
                    )?;
                    new_contents.insert(path.clone(), store);
                }
            }
        }
    }

    for (pos, release) in releases.iter().enumerate() {
        for (path, index) in release.packages() {
            for record in index.iter() {
                let key = merge_key(record, index.arch(), options.key_mode);
                if !is_winner(&winners, &key, pos, record, options.key_mode) {
                    continue;
                }

                if options.with_contents
                    && !carry_contents(release, path, index.arch(), record, &mut new_contents)?
                {
                    let label = format!("{}:{}", record.name(), record.architecture());
                    warn!("Contents of {} not found", label);
                    report.missing_contents.push(label);
                }

                if let Some(out) = new_packages.get_mut(path) {
                    out.offer(record.clone());
                }
            }
        }

        for (path, index) in release.sources() {
            for record in index.iter() {
                let key = merge_key(record, index.arch(), options.key_mode);
                if is_winner(&winners, &key, pos, record, options.key_mode) {
                    if let Some(out) = new_sources.get_mut(path) {
                        out.offer(record.clone());
                    }
                }
            }
        }
    }

    for (path, index) in &new_packages {
        index.write()?;
        report.indices.insert(path.clone(), index.len());
    }
    for (path, index) in &new_sources {
        index.write()?;
        report.indices.insert(path.clone(), index.len());
    }
    for (path, store) in &new_contents {
        store.write()?;
        report.contents.push(path.clone());
    }

    info!("Writing merged Release");
    let mut new_release = Release::new_empty(Location::Local(target_dir.join("Release")));
    for release in &releases {
        new_release.merge_data(release);
    }
    new_release.set_field("Suite", target);
    new_release.write(ctx)?;

    info!("Merge into {} finished", target);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_str() {
        assert_eq!("first".parse::<MergePolicy>().unwrap(), MergePolicy::First);
        assert_eq!("last".parse::<MergePolicy>().unwrap(), MergePolicy::Last);
        assert_eq!("version".parse::<MergePolicy>().unwrap(), MergePolicy::Version);
        assert!("newest".parse::<MergePolicy>().is_err());
    }

    #[test]
    fn test_select_winners_policies() {
        let suite = |name: &str, version: &str| {
            let text = format!(
                "Suite: {name}\nMD5Sum:\n 0123456789abcdef0123456789abcdef 1 main/binary-amd64/Packages\n"
            );
            let mut release =
                Release::parse_text(Location::parse(&format!("{name}/Release")), &text).unwrap();
            let mut index = Index::new(Location::parse(&format!("{name}/main/binary-amd64/Packages")));
            index.insert(
                crate::packages::BinaryPackage::parse(&format!(
                    "Package: foo\nVersion: {version}\nArchitecture: amd64\nFilename: pool/foo_{version}_amd64.deb\n"
                ))
                .unwrap(),
            );
            release.insert_packages("main/binary-amd64/Packages", index);
            release
        };
        let releases = vec![suite("a", "2.0"), suite("b", "1.0"), suite("c", "1.5")];

        let winner = |policy| {
            let options = MergeOptions {
                policy,
                ..Default::default()
            };
            let winners = select_winners(&releases, &options);
            let (pos, rank) = winners.get("foo").cloned().unwrap();
            (pos, rank.version.to_string())
        };
        assert_eq!(winner(MergePolicy::First), (0, "2.0".to_string()));
        assert_eq!(winner(MergePolicy::Last), (2, "1.5".to_string()));
        assert_eq!(winner(MergePolicy::Version), (0, "2.0".to_string()));
    }

    #[test]
    fn test_source_rank_ignores_binary_version() {
        let binnmu = crate::packages::BinaryPackage::parse(
            "Package: libfoo\nSource: foo (1.0-1)\nVersion: 1.0-1+b1\nArchitecture: amd64\nFilename: pool/libfoo.deb",
        )
        .unwrap();
        let data = crate::packages::BinaryPackage::parse(
            "Package: foo-data\nSource: foo\nVersion: 1.0-1\nArchitecture: all\nFilename: pool/foo-data.deb",
        )
        .unwrap();

        let by_source = Rank::of(&binnmu, KeyMode::Source);
        assert_eq!(by_source.cmp_rank(&Rank::of(&data, KeyMode::Source)), Ordering::Equal);

        let by_binary = Rank::of(&binnmu, KeyMode::Binary);
        assert_eq!(by_binary.cmp_rank(&Rank::of(&data, KeyMode::Binary)), Ordering::Greater);
    }
}
