// src/reconcile/diff.rs

//! Cross-suite and cross-archive comparison

use crate::context::Context;
use crate::error::Result;
use crate::packages::IndexRecord;
use crate::repository::{Location, Release};
use crate::version::{Version, compare};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Which records a diff compares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffMethod {
    /// Sources records keyed by name, compared by source version
    Source,
    /// Packages records keyed by name and architecture, compared by binary version
    Binary,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions {
    /// Print pool paths instead of versions
    pub list_files: bool,
    /// Report every common key with `<`, `=` or `>`
    pub compare: bool,
}

/// Best record of one key on one side
#[derive(Debug, Clone)]
struct Pick {
    version: Version,
    tiebreak: Version,
    paths: Vec<String>,
}

impl Pick {
    fn of(record: &dyn IndexRecord, method: DiffMethod) -> Self {
        let (version, tiebreak) = match method {
            DiffMethod::Source => (record.version().clone(), record.binary_version().clone()),
            DiffMethod::Binary => (record.binary_version().clone(), record.version().clone()),
        };
        Self {
            version,
            tiebreak,
            paths: record.paths(),
        }
    }

    fn outranks(&self, other: &Pick) -> bool {
        compare(&self.version, &other.version)
            .then_with(|| compare(&self.tiebreak, &other.tiebreak))
            == Ordering::Greater
    }

    fn render(&self, list_files: bool) -> String {
        if list_files {
            self.paths.join("|")
        } else {
            self.version.to_string()
        }
    }
}

/// One line of a diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffEntry {
    OnlyLeft {
        key: String,
        left: String,
    },
    Differs {
        key: String,
        left: String,
        right: String,
    },
    Compared {
        key: String,
        left: String,
        relation: String,
        right: String,
    },
    OnlyRight {
        key: String,
        right: String,
    },
}

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffEntry::OnlyLeft { key, left } => write!(f, "{} , {}", key, left),
            DiffEntry::Differs { key, left, right } => {
                write!(f, "{} , , {} , {}", key, left, right)
            }
            DiffEntry::Compared {
                key,
                left,
                relation,
                right,
            } => write!(f, "{} , {} , {} , {}", key, left, relation, right),
            DiffEntry::OnlyRight { key, right } => write!(f, "{} , , , {}", key, right),
        }
    }
}

/// Result of [`diff`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiffReport {
    pub entries: Vec<DiffEntry>,
}

impl fmt::Display for DiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{}", entry)?;
        }
        Ok(())
    }
}

fn record_key(record: &dyn IndexRecord, method: DiffMethod) -> String {
    match method {
        DiffMethod::Source => record.name().to_string(),
        DiffMethod::Binary => format!("{}, {}", record.name(), record.architecture()),
    }
}

/// Highest record per key across every index of the method's kind
fn collect(
    release: &mut Release,
    method: DiffMethod,
    ctx: &Context,
) -> Result<BTreeMap<String, Pick>> {
    let mut picks: BTreeMap<String, Pick> = BTreeMap::new();
    let mut offer = |record: &dyn IndexRecord| {
        let key = record_key(record, method);
        let pick = Pick::of(record, method);
        match picks.get(&key) {
            Some(existing) if !pick.outranks(existing) => {}
            _ => {
                picks.insert(key, pick);
            }
        }
    };

    match method {
        DiffMethod::Source => {
            for index in release.all_sources(ctx)?.values() {
                for record in index.iter() {
                    offer(record as &dyn IndexRecord);
                }
            }
        }
        DiffMethod::Binary => {
            for index in release.all_packages(ctx)?.values() {
                for record in index.iter() {
                    offer(record as &dyn IndexRecord);
                }
            }
        }
    }
    Ok(picks)
}

/// Compare the newest records of two suites
///
/// Keys with equal versions on both sides are only reported in compare mode.
pub fn diff(
    source1: &Location,
    source2: &Location,
    method: DiffMethod,
    options: DiffOptions,
    ctx: &Context,
) -> Result<DiffReport> {
    let mut release1 = Release::open_suite(source1, ctx)?;
    let mut release2 = Release::open_suite(source2, ctx)?;

    info!("Collecting package lists");
    let left = collect(&mut release1, method, ctx)?;
    let right = collect(&mut release2, method, ctx)?;
    debug!("{} keys on the left, {} on the right", left.len(), right.len());

    info!("Comparing");
    let mut report = DiffReport::default();

    for (key, pick) in left.iter().filter(|(k, _)| !right.contains_key(*k)) {
        report.entries.push(DiffEntry::OnlyLeft {
            key: key.clone(),
            left: pick.render(options.list_files),
        });
    }

    for (key, l) in &left {
        let Some(r) = right.get(key) else {
            continue;
        };
        let ordering = compare(&l.version, &r.version);
        if options.compare {
            let relation = match ordering {
                Ordering::Less => "<",
                Ordering::Equal => "=",
                Ordering::Greater => ">",
            };
            report.entries.push(DiffEntry::Compared {
                key: key.clone(),
                left: l.render(options.list_files),
                relation: relation.to_string(),
                right: r.render(options.list_files),
            });
        } else if ordering != Ordering::Equal {
            report.entries.push(DiffEntry::Differs {
                key: key.clone(),
                left: l.render(options.list_files),
                right: r.render(options.list_files),
            });
        }
    }

    for (key, pick) in right.iter().filter(|(k, _)| !left.contains_key(*k)) {
        report.entries.push(DiffEntry::OnlyRight {
            key: key.clone(),
            right: pick.render(options.list_files),
        });
    }

    info!("Comparison finished, {} differences", report.entries.len());
    Ok(report)
}

/// A pool path whose indexed md5 differs between two archives
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Md5Mismatch {
    pub path: String,
    pub md5_1: String,
    pub md5_2: String,
}

impl fmt::Display for Md5Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} , {} , {}", self.path, self.md5_1, self.md5_2)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Md5Report {
    pub mismatches: Vec<Md5Mismatch>,
}

impl fmt::Display for Md5Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for m in &self.mismatches {
            writeln!(f, "{}", m)?;
        }
        Ok(())
    }
}

/// Pool path → indexed md5 over every suite of an archive
fn hash_table(topdir: &Path, ctx: &Context) -> Result<BTreeMap<String, String>> {
    let mut table = BTreeMap::new();
    for mut release in Release::discover(topdir, ctx)? {
        for index in release.all_packages(ctx)?.values() {
            for record in index.iter() {
                for file in record.files() {
                    table.insert(file.path, file.hash);
                }
            }
        }
        for index in release.all_sources(ctx)?.values() {
            for record in index.iter() {
                for file in record.files() {
                    table.insert(file.path, file.hash);
                }
            }
        }
    }
    Ok(table)
}

/// Compare indexed md5 sums of the pool paths two archives share
pub fn diff_md5(archive1: &Path, archive2: &Path, ctx: &Context) -> Result<Md5Report> {
    let table1 = hash_table(archive1, ctx)?;
    let table2 = hash_table(archive2, ctx)?;

    let mismatches = table1
        .iter()
        .filter_map(|(path, md5_1)| {
            let md5_2 = table2.get(path)?;
            (md5_1 != md5_2).then(|| Md5Mismatch {
                path: path.clone(),
                md5_1: md5_1.clone(),
                md5_2: md5_2.clone(),
            })
        })
        .collect();
    Ok(Md5Report { mismatches })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_rendering() {
        let entries = [
            DiffEntry::OnlyLeft {
                key: "pkg".into(),
                left: "1.0".into(),
            },
            DiffEntry::Differs {
                key: "pkg, amd64".into(),
                left: "1.0".into(),
                right: "2.0".into(),
            },
            DiffEntry::Compared {
                key: "pkg".into(),
                left: "1.0".into(),
                relation: "<".into(),
                right: "2.0".into(),
            },
            DiffEntry::OnlyRight {
                key: "pkg".into(),
                right: "2.0".into(),
            },
        ];
        let lines: Vec<String> = entries.iter().map(ToString::to_string).collect();
        assert_eq!(
            lines,
            vec![
                "pkg , 1.0",
                "pkg, amd64 , , 1.0 , 2.0",
                "pkg , 1.0 , < , 2.0",
                "pkg , , , 2.0",
            ]
        );
    }

    #[test]
    fn test_pick_outranks() {
        let pick = |v: &str, t: &str| Pick {
            version: Version::new(v),
            tiebreak: Version::new(t),
            paths: Vec::new(),
        };
        assert!(pick("2.0", "1").outranks(&pick("1.0", "9")));
        assert!(pick("1.0", "2").outranks(&pick("1.0", "1")));
        assert!(!pick("1.0", "1").outranks(&pick("1.0", "1")));
        assert!(!pick("1.0~rc1", "1").outranks(&pick("1.0", "1")));
    }
}
