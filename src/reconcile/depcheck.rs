// src/reconcile/depcheck.rs

//! Dependency satisfiability across suites
//!
//! This is a checker, not a solver: every Depends/Pre-Depends group of every
//! binary package in the target suite must be satisfiable by some package
//! (or Provides entry) in the target suite or one of the extra suites.

use crate::context::Context;
use crate::error::Result;
use crate::packages::{BinaryPackage, DependencyAtom, DependencyGroup, IndexRecord};
use crate::repository::{Location, Release};
use crate::version::{Relation, Version};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, Default)]
pub struct DepCheckOptions {
    /// Skip groups none of whose package names exist anywhere
    pub ignore_noexist: bool,
    /// Only report groups that contain a `>=` atom
    pub ge_only: bool,
}

/// A dependency group no provider satisfies
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsatisfiedDependency {
    pub package: String,
    pub arch: String,
    /// Source version, which differs from the binary version for binNMUs
    pub version: String,
    pub source: String,
    pub group: String,
}

impl fmt::Display for UnsatisfiedDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) [{}] from {}: {}",
            self.package, self.version, self.arch, self.source, self.group
        )
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DepCheckReport {
    pub checked: usize,
    pub unsatisfied: Vec<UnsatisfiedDependency>,
}

impl fmt::Display for DepCheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for dep in &self.unsatisfied {
            writeln!(f, "{}", dep)?;
        }
        Ok(())
    }
}

/// Package or virtual name → versions of everything answering to it
#[derive(Debug, Default)]
struct Providers {
    by_name: HashMap<String, Vec<Version>>,
}

impl Providers {
    fn add(&mut self, package: &BinaryPackage) {
        let version = package.binary_version();
        self.by_name
            .entry(package.name().to_string())
            .or_default()
            .push(version.clone());
        for virtual_name in package.provides() {
            self.by_name
                .entry(virtual_name.clone())
                .or_default()
                .push(version.clone());
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    fn satisfies(&self, atom: &DependencyAtom, relation: Option<Relation>) -> bool {
        let Some(candidates) = self.by_name.get(atom.base_name()) else {
            return false;
        };
        match relation {
            None => !candidates.is_empty(),
            Some(relation) => {
                let required = Version::new(&atom.version);
                candidates
                    .iter()
                    .any(|candidate| relation.satisfied_by(candidate, &required))
            }
        }
    }
}

/// Check one group; `Ok(true)` when some alternative holds
///
/// Every versioned operator is validated before any alternative is tried, so a
/// malformed group fails even when an earlier alternative would have matched.
fn group_satisfied(group: &DependencyGroup, providers: &Providers) -> Result<bool> {
    let relations = group
        .atoms()
        .iter()
        .map(|atom| {
            if atom.is_versioned() {
                Relation::parse(&atom.operator).map(Some)
            } else {
                Ok(None)
            }
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(group
        .atoms()
        .iter()
        .zip(relations)
        .any(|(atom, relation)| providers.satisfies(atom, relation)))
}

fn load_providers(release: &mut Release, providers: &mut Providers, ctx: &Context) -> Result<()> {
    for index in release.all_packages(ctx)?.values() {
        for package in index.iter() {
            providers.add(package);
        }
    }
    Ok(())
}

/// Report every dependency group of `suite` that nothing satisfies
///
/// An unknown relational operator aborts the run.
pub fn checkdep(
    suite: &Location,
    extra: &[Location],
    options: DepCheckOptions,
    ctx: &Context,
) -> Result<DepCheckReport> {
    let mut target = Release::open_suite(suite, ctx)?;

    info!("Collecting providers");
    let mut providers = Providers::default();
    load_providers(&mut target, &mut providers, ctx)?;
    for location in extra {
        let mut release = Release::open_suite(location, ctx)?;
        load_providers(&mut release, &mut providers, ctx)?;
    }
    debug!("{} provided names", providers.by_name.len());

    info!("Checking dependencies of {}", target.name());
    let mut report = DepCheckReport::default();
    for index in target.packages().values() {
        for package in index.iter() {
            report.checked += 1;
            for group in package.dependencies() {
                if group_satisfied(group, &providers)? {
                    continue;
                }
                if options.ignore_noexist
                    && !group.atoms().iter().any(|a| providers.contains(a.base_name()))
                {
                    debug!("{}: nothing provides any of {}", package.name(), group);
                    continue;
                }
                if options.ge_only && !group.atoms().iter().any(|a| a.operator == ">=") {
                    continue;
                }

                error!(
                    "{} {} ({}) depends on {} which is not satisfied",
                    package.name(),
                    package.binary_version(),
                    package.architecture(),
                    group
                );
                report.unsatisfied.push(UnsatisfiedDependency {
                    package: package.name().to_string(),
                    arch: package.architecture().to_string(),
                    version: package.version().to_string(),
                    source: package.source().to_string(),
                    group: group.to_string(),
                });
            }
        }
    }

    info!(
        "Checked {} packages, {} unsatisfied groups",
        report.checked,
        report.unsatisfied.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::packages::dependency::parse_dependency_list;

    fn package(text: &str) -> BinaryPackage {
        BinaryPackage::parse(text).unwrap()
    }

    fn providers(stanzas: &[&str]) -> Providers {
        let mut providers = Providers::default();
        for stanza in stanzas {
            providers.add(&package(stanza));
        }
        providers
    }

    const B1: &str = "Package: b\nVersion: 1.0\nArchitecture: amd64\nFilename: pool/b_1.0.deb\nProvides: virt";

    #[test]
    fn test_versioned_atom() {
        let p = providers(&[B1]);
        let group = &parse_dependency_list("b (>= 2.0)")[0];
        assert!(!group_satisfied(group, &p).unwrap());
        let group = &parse_dependency_list("b (>= 1.0)")[0];
        assert!(group_satisfied(group, &p).unwrap());
        let group = &parse_dependency_list("b (<< 1.0~) | b (= 1.0)")[0];
        assert!(group_satisfied(group, &p).unwrap());
    }

    #[test]
    fn test_provides_and_qualifier() {
        let p = providers(&[B1]);
        assert!(group_satisfied(&parse_dependency_list("virt")[0], &p).unwrap());
        assert!(group_satisfied(&parse_dependency_list("b:any")[0], &p).unwrap());
        assert!(!group_satisfied(&parse_dependency_list("c")[0], &p).unwrap());
    }

    #[test]
    fn test_unknown_operator_is_fatal() {
        let p = providers(&[B1]);
        let group = DependencyGroup(vec![
            DependencyAtom::unversioned("b"),
            DependencyAtom::versioned("c", "~=", "1.0"),
        ]);
        let err = group_satisfied(&group, &p).unwrap_err();
        assert!(matches!(err, Error::UnknownRelationalOperator(op) if op == "~="));
    }
}
