// src/packages/binary.rs

//! Binary package records from Packages indices

use crate::error::{Error, Result};
use crate::packages::control::{FileEntry, annotate, fold, from_stanza, non_empty};
use crate::packages::dependency::{DependencyGroup, parse_dependency_list, parse_provides};
use crate::packages::traits::IndexRecord;
use crate::version::Version;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::debug;

/// `Source: name (version)`
static SOURCE_WITH_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+)\s+\((\S+)\)$").expect("static regex"));

/// Fields of a Packages stanza the tools read
///
/// Everything else stays in the raw text and is written back untouched.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BinaryFields {
    package: String,
    version: String,
    architecture: String,
    filename: String,
    #[serde(rename = "MD5sum", default)]
    md5sum: Option<String>,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    provides: Option<String>,
    #[serde(default)]
    depends: Option<String>,
    #[serde(rename = "Pre-Depends", default)]
    pre_depends: Option<String>,
}

/// A stanza of a Packages file
#[derive(Debug, Clone)]
pub struct BinaryPackage {
    text: String,
    name: String,
    architecture: String,
    version: Version,
    source: String,
    source_version: Version,
    filename: String,
    md5sum: String,
    size: u64,
    provides: Vec<String>,
    depends: Vec<DependencyGroup>,
}

impl BinaryPackage {
    /// Pool-relative path of the .deb
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn md5sum(&self) -> &str {
        &self.md5sum
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Virtual package names this package provides
    pub fn provides(&self) -> &[String] {
        &self.provides
    }

    /// Depends followed by Pre-Depends groups
    pub fn dependencies(&self) -> &[DependencyGroup] {
        &self.depends
    }

    /// Replace the `Filename:` line equal to `old` with `new`
    ///
    /// Only the exact field occurrence is touched. Returns false when the
    /// stanza has no such line.
    pub fn rewrite_filename(&mut self, old: &str, new: &str) -> bool {
        let mut replaced = false;
        let lines: Vec<String> = self
            .text
            .lines()
            .map(|line| match line.strip_prefix("Filename:") {
                Some(value) if !replaced && value.trim() == old => {
                    replaced = true;
                    format!("Filename: {}", new)
                }
                _ => line.to_string(),
            })
            .collect();

        if replaced {
            self.text = lines.join("\n");
            self.filename = new.to_string();
        }
        replaced
    }
}

/// Split a `Source:` field into name and version, falling back softly
fn split_source_field(value: &str, binary_version: &Version) -> (String, Version) {
    match SOURCE_WITH_VERSION.captures(value) {
        Some(caps) => (caps[1].to_string(), Version::new(&caps[2])),
        None => {
            if value.contains('(') {
                debug!("Unparsable Source field '{}', using binary version", value);
            }
            (value.to_string(), binary_version.clone())
        }
    }
}

impl IndexRecord for BinaryPackage {
    fn parse(stanza: &str) -> Result<Self> {
        let fields: BinaryFields = from_stanza(stanza)?;

        let name = non_empty(fields.package, "Package")?;
        let with_name = |e: Error| annotate(&name, e);

        let version = Version::new(&non_empty(fields.version, "Version").map_err(with_name)?);
        let architecture = non_empty(fields.architecture, "Architecture").map_err(with_name)?;
        let filename = non_empty(fields.filename, "Filename").map_err(with_name)?;
        let md5sum = fields.md5sum.map(|m| m.trim().to_string()).unwrap_or_default();
        let size = match fields.size.as_deref().map(str::trim) {
            Some(s) => s.parse::<u64>().map_err(|e| {
                Error::MalformedRecord(format!("{}: invalid Size '{}': {}", name, s, e))
            })?,
            None => 0,
        };

        let (source, source_version) = match fields.source.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => split_source_field(value, &version),
            _ => (name.clone(), version.clone()),
        };

        let provides = fields
            .provides
            .map(|p| parse_provides(&fold(&p)))
            .unwrap_or_default();

        let mut depends = Vec::new();
        for value in [fields.depends, fields.pre_depends].into_iter().flatten() {
            depends.extend(parse_dependency_list(&fold(&value)));
        }

        Ok(Self {
            text: stanza.trim_end().to_string(),
            name,
            architecture,
            version,
            source,
            source_version,
            filename,
            md5sum,
            size,
            provides,
            depends,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn architecture(&self) -> &str {
        &self.architecture
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn version(&self) -> &Version {
        &self.source_version
    }

    fn binary_version(&self) -> &Version {
        &self.version
    }

    fn files(&self) -> Vec<FileEntry> {
        vec![FileEntry {
            hash: self.md5sum.clone(),
            size: self.size,
            path: self.filename.clone(),
        }]
    }

    fn text(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STANZA: &str = "Package: libfoo1\n\
Source: foo (1.2-1)\n\
Version: 1.2-1+b1\n\
Architecture: amd64\n\
Provides: libfoo\n\
Depends: libc6 (>= 2.34), libbar1 | libbaz1\n\
Pre-Depends: dpkg (>= 1.19)\n\
Filename: pool/main/f/foo/libfoo1_1.2-1+b1_amd64.deb\n\
Size: 1024\n\
MD5sum: 0123456789abcdef0123456789abcdef\n\
Description: foo library\n .\n more text";

    #[test]
    fn test_parse_binary_package() {
        let pkg = BinaryPackage::parse(STANZA).unwrap();
        assert_eq!(pkg.name(), "libfoo1");
        assert_eq!(pkg.source(), "foo");
        assert_eq!(pkg.version().as_str(), "1.2-1");
        assert_eq!(pkg.binary_version().as_str(), "1.2-1+b1");
        assert_eq!(pkg.architecture(), "amd64");
        assert_eq!(pkg.size(), 1024);
        assert_eq!(pkg.provides(), &["libfoo".to_string()]);
        assert_eq!(pkg.dependencies().len(), 3);
        assert_eq!(pkg.dependencies()[2].atoms()[0].name, "dpkg");
        assert_eq!(pkg.paths(), vec!["pool/main/f/foo/libfoo1_1.2-1+b1_amd64.deb"]);
    }

    #[test]
    fn test_source_defaults() {
        let pkg = BinaryPackage::parse(
            "Package: foo\nVersion: 2.0\nArchitecture: all\nFilename: pool/foo.deb",
        )
        .unwrap();
        assert_eq!(pkg.source(), "foo");
        assert_eq!(pkg.version().as_str(), "2.0");
    }

    #[test]
    fn test_malformed_source_field_fails_soft() {
        let pkg = BinaryPackage::parse(
            "Package: foo\nSource: bar (broken\nVersion: 2.0\nArchitecture: all\nFilename: pool/foo.deb",
        )
        .unwrap();
        assert_eq!(pkg.source(), "bar (broken");
        assert_eq!(pkg.version().as_str(), "2.0");
    }

    #[test]
    fn test_missing_mandatory_field() {
        let result = BinaryPackage::parse("Package: foo\nVersion: 1.0\nArchitecture: all");
        assert!(matches!(result, Err(Error::MalformedRecord(msg)) if msg.contains("Filename")));
    }

    #[test]
    fn test_empty_mandatory_field() {
        let result = BinaryPackage::parse("Package: foo\nVersion:\nArchitecture: all\nFilename: pool/foo.deb");
        assert!(matches!(result, Err(Error::MalformedRecord(msg)) if msg.contains("Version")));
    }

    #[test]
    fn test_folded_depends() {
        let pkg = BinaryPackage::parse(
            "Package: foo\nVersion: 1.0\nArchitecture: all\nDepends: a,\n b (>= 2)\nFilename: pool/foo.deb\nSize: 12",
        )
        .unwrap();
        let names: Vec<&str> = pkg.dependencies().iter().map(|g| g.atoms()[0].name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(pkg.size(), 12);
        assert!(pkg.md5sum().is_empty());
    }

    #[test]
    fn test_rewrite_filename() {
        let mut pkg = BinaryPackage::parse(STANZA).unwrap();
        let old = "pool/main/f/foo/libfoo1_1.2-1+b1_amd64.deb";
        assert!(pkg.rewrite_filename(old, "pool/main/f/foo/renamed.deb"));
        assert_eq!(pkg.filename(), "pool/main/f/foo/renamed.deb");
        assert!(pkg.text().contains("\nFilename: pool/main/f/foo/renamed.deb\n"));
        assert!(!pkg.text().contains(old));
        assert!(!pkg.rewrite_filename(old, "pool/other.deb"));
    }
}
