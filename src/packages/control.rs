// src/packages/control.rs

//! Control-file stanzas shared by Release, Packages and Sources
//!
//! Stanzas are separated by blank lines and deserialized with `rfc822_like`.
//! Packages and Sources records go straight into typed field structs; the
//! Release header goes into [`Fields`], which keeps arbitrary keys in file
//! order. Hash listings (` <md5> <size> <path>`) are read out of their owning
//! field with [`parse_file_list`].

use crate::error::{Error, Result};
use regex::Regex;
use serde::de::{DeserializeOwned, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::LazyLock;

static STANZA_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n\s*").expect("static regex"));

/// Split control-file text into non-empty stanzas
pub fn split_stanzas(text: &str) -> Vec<&str> {
    let text = text.trim_matches(|c: char| c == '\n' || c == '\r');
    STANZA_SEPARATOR
        .split(text)
        .map(|s| s.trim_end())
        .filter(|s| !s.trim().is_empty())
        .collect()
}

/// Deserialize exactly one stanza into `T`
///
/// Missing mandatory fields and syntax errors become `MalformedRecord`.
pub fn from_stanza<T: DeserializeOwned>(stanza: &str) -> Result<T> {
    let text = format!("{}\n", stanza.trim_end());
    let mut records: Vec<T> = rfc822_like::from_str(&text)
        .map_err(|e| Error::MalformedRecord(e.to_string()))?;
    match records.len() {
        1 => Ok(records.remove(0)),
        n => Err(Error::MalformedRecord(format!("expected one stanza, found {}", n))),
    }
}

/// Collapse a multi-line value onto one line
pub fn fold(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Mandatory field that deserialized but is blank
pub(crate) fn non_empty(value: String, key: &str) -> Result<String> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(Error::MalformedRecord(format!("empty mandatory field '{}'", key)));
    }
    Ok(value)
}

/// Ordered `key: value` fields of one stanza
///
/// Multi-line values keep their continuation lines.
#[derive(Debug, Clone, Default)]
pub struct Fields {
    entries: Vec<(String, String)>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deserialize a single stanza, keeping field order
    pub fn parse(stanza: &str) -> Result<Self> {
        from_stanza(stanza)
    }

    /// Value of a field, matched case-insensitively
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Insert or overwrite a field, keeping the original position on overwrite
    pub fn set(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some((_, v)) => *v = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self
            .entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(key))?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'de> Deserialize<'de> for Fields {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FieldsVisitor;

        impl<'de> Visitor<'de> for FieldsVisitor {
            type Value = Fields;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a control-file stanza")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Fields, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut fields = Fields::new();
                while let Some((key, value)) = map.next_entry::<String, String>()? {
                    fields.set(&key, value.trim());
                }
                Ok(fields)
            }
        }

        deserializer.deserialize_map(FieldsVisitor)
    }
}

/// Prefix a malformed-record error with the record name
pub(crate) fn annotate(name: &str, err: Error) -> Error {
    match err {
        Error::MalformedRecord(msg) => Error::MalformedRecord(format!("{}: {}", name, msg)),
        other => other,
    }
}

/// One line of a hash listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub hash: String,
    pub size: u64,
    pub path: String,
}

/// Parse ` <hash> <size> <path>` lines
///
/// A line holding several triples (a folded listing) yields all of them.
/// Lines that do not fit the grammar are skipped.
pub fn parse_file_list(block: &str) -> Vec<FileEntry> {
    block
        .lines()
        .flat_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() % 3 != 0 {
                return Vec::new();
            }
            parts.chunks(3).filter_map(file_entry).collect()
        })
        .collect()
}

fn file_entry(parts: &[&str]) -> Option<FileEntry> {
    let [hash, size, path] = parts else {
        return None;
    };
    if !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some(FileEntry {
        hash: hash.to_string(),
        size: size.parse().ok()?,
        path: path.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_stanzas() {
        let text = "\nPackage: a\nVersion: 1\n\nPackage: b\nVersion: 2\n \n\n\nPackage: c\n";
        let stanzas = split_stanzas(text);
        assert_eq!(stanzas.len(), 3);
        assert_eq!(stanzas[0], "Package: a\nVersion: 1");
        assert_eq!(stanzas[2], "Package: c");
    }

    #[test]
    fn test_fields_keep_order_and_continuation() {
        let fields = Fields::parse(
            "Origin: x\nSuite: a\nComponents: main\nMD5Sum:\n d41d8cd98f00b204e9800998ecf8427e 0 main/Packages",
        )
        .unwrap();
        let keys: Vec<&str> = fields.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Origin", "Suite", "Components", "MD5Sum"]);
        assert_eq!(fields.get("suite"), Some("a"));
        let files = parse_file_list(fields.get("MD5Sum").unwrap());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "main/Packages");
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct Sample {
        package: String,
        #[serde(default)]
        depends: Option<String>,
    }

    #[test]
    fn test_from_stanza_typed() {
        let rec: Sample = from_stanza("Package: foo\nDepends: a,\n b (>= 1)\nUnknown: x").unwrap();
        assert_eq!(rec.package, "foo");
        assert_eq!(fold(rec.depends.as_deref().unwrap()), "a, b (>= 1)");
    }

    #[test]
    fn test_from_stanza_missing_field() {
        let result = from_stanza::<Sample>("Depends: a");
        assert!(matches!(result, Err(Error::MalformedRecord(msg)) if msg.contains("Package")));
    }

    #[test]
    fn test_set_preserves_order() {
        let mut fields = Fields::parse("Origin: x\nSuite: a\nComponents: main").unwrap();
        fields.set("Suite", "b");
        fields.set("Label", "l");
        let keys: Vec<&str> = fields.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Origin", "Suite", "Components", "Label"]);
        assert_eq!(fields.get("Suite"), Some("b"));
    }

    #[test]
    fn test_parse_file_list() {
        let block = "\n d41d8cd98f00b204e9800998ecf8427e 0 main/binary-amd64/Packages\n garbage line\n 0123456789abcdef0123456789abcdef 1234 foo_1.0.dsc";
        let files = parse_file_list(block);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].size, 0);
        assert_eq!(files[1].path, "foo_1.0.dsc");
        assert_eq!(files[1].size, 1234);

        let folded = parse_file_list(
            "d41d8cd98f00b204e9800998ecf8427e 0 a.dsc 0123456789abcdef0123456789abcdef 7 b.tar.gz",
        );
        assert_eq!(folded.len(), 2);
        assert_eq!(folded[1].path, "b.tar.gz");
    }
}
