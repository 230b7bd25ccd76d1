// src/packages/source.rs

//! Source package records from Sources indices

use crate::error::Result;
use crate::packages::control::{FileEntry, annotate, from_stanza, non_empty, parse_file_list};
use crate::packages::traits::{IndexRecord, SOURCE_ARCH};
use crate::version::Version;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SourceFields {
    package: String,
    version: String,
    directory: String,
    #[serde(default)]
    files: Option<String>,
}

/// A stanza of a Sources file
#[derive(Debug, Clone)]
pub struct SourcePackage {
    text: String,
    name: String,
    version: Version,
    directory: String,
    /// `Files:` entries as listed, file names relative to `directory`
    entries: Vec<FileEntry>,
}

impl SourcePackage {
    pub fn directory(&self) -> &str {
        &self.directory
    }

    /// Listed files with names relative to the record's directory
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }
}

impl IndexRecord for SourcePackage {
    fn parse(stanza: &str) -> Result<Self> {
        let fields: SourceFields = from_stanza(stanza)?;

        let name = non_empty(fields.package, "Package")?;
        let version = Version::new(&non_empty(fields.version, "Version").map_err(|e| annotate(&name, e))?);
        let directory = non_empty(fields.directory, "Directory")
            .map_err(|e| annotate(&name, e))?
            .trim_end_matches('/')
            .to_string();
        let entries = fields.files.as_deref().map(parse_file_list).unwrap_or_default();

        Ok(Self {
            text: stanza.trim_end().to_string(),
            name,
            version,
            directory,
            entries,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn architecture(&self) -> &str {
        SOURCE_ARCH
    }

    fn source(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &Version {
        &self.version
    }

    fn binary_version(&self) -> &Version {
        &self.version
    }

    fn files(&self) -> Vec<FileEntry> {
        self.entries
            .iter()
            .map(|entry| FileEntry {
                hash: entry.hash.clone(),
                size: entry.size,
                path: format!("{}/{}", self.directory, entry.path),
            })
            .collect()
    }

    fn text(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    const STANZA: &str = "Package: foo\n\
Binary: libfoo1, foo-utils\n\
Version: 1.2-1\n\
Architecture: any\n\
Directory: pool/main/f/foo\n\
Files:\n \
0123456789abcdef0123456789abcdef 1500 foo_1.2-1.dsc\n \
fedcba9876543210fedcba9876543210 20480 foo_1.2.orig.tar.gz\n\
Checksums-Sha256:\n \
0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef 1500 foo_1.2-1.dsc";

    #[test]
    fn test_parse_source_package() {
        let src = SourcePackage::parse(STANZA).unwrap();
        assert_eq!(src.name(), "foo");
        assert_eq!(src.architecture(), SOURCE_ARCH);
        assert_eq!(src.version().as_str(), "1.2-1");
        assert_eq!(src.entries().len(), 2);
        assert_eq!(
            src.paths(),
            vec!["pool/main/f/foo/foo_1.2-1.dsc", "pool/main/f/foo/foo_1.2.orig.tar.gz"]
        );
        assert_eq!(src.files()[1].size, 20480);
    }

    #[test]
    fn test_missing_directory() {
        let result = SourcePackage::parse("Package: foo\nVersion: 1.0");
        assert!(matches!(result, Err(Error::MalformedRecord(_))));
    }
}
