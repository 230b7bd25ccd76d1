// src/version/mod.rs

//! Debian version ordering and dependency relations
//!
//! A version is `[epoch:]upstream[-revision]`. Epochs compare numerically,
//! upstream and revision use the dpkg "verrevcmp" walk over alternating
//! non-digit and digit runs:
//! - `~` sorts before everything, even the end of the string
//! - letters sort before other punctuation
//! - digit runs compare numerically
//!
//! Every ranking decision in the reconciliation algorithms goes through
//! [`compare`], so call sites always hold [`Version`] values, never raw strings.

use crate::error::{Error, Result};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// A parsed Debian version
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    epoch: u64,
    upstream: String,
    revision: String,
}

impl Version {
    /// Parse a version string
    ///
    /// Parsing never fails: a non-numeric epoch prefix is kept as part of the
    /// upstream version, and a missing revision compares like an empty one.
    pub fn new(s: &str) -> Self {
        let raw = s.trim().to_string();

        let (epoch, rest) = match raw.split_once(':') {
            Some((e, r)) if !e.is_empty() && e.bytes().all(|b| b.is_ascii_digit()) => {
                (e.parse::<u64>().unwrap_or(u64::MAX), r)
            }
            _ => (0, raw.as_str()),
        };

        let (upstream, revision) = match rest.rsplit_once('-') {
            Some((u, r)) => (u.to_string(), r.to_string()),
            None => (rest.to_string(), String::new()),
        };

        Self {
            epoch,
            upstream,
            revision,
            raw,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Total order over Debian versions
pub fn compare(a: &Version, b: &Version) -> Ordering {
    a.epoch
        .cmp(&b.epoch)
        .then_with(|| verrevcmp(&a.upstream, &b.upstream))
        .then_with(|| verrevcmp(&a.revision, &b.revision))
}

/// Weight of a single non-digit position
fn order(c: Option<u8>) -> i32 {
    match c {
        None => 0,
        Some(b'~') => -1,
        Some(c) if c.is_ascii_digit() => 0,
        Some(c) if c.is_ascii_alphabetic() => c as i32,
        Some(c) => c as i32 + 256,
    }
}

fn is_digit(c: Option<&u8>) -> bool {
    c.is_some_and(|c| c.is_ascii_digit())
}

fn verrevcmp(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut i, mut j) = (0usize, 0usize);

    while i < a.len() || j < b.len() {
        // Non-digit run
        while (i < a.len() && !a[i].is_ascii_digit()) || (j < b.len() && !b[j].is_ascii_digit()) {
            let ac = order(a.get(i).copied());
            let bc = order(b.get(j).copied());
            if ac != bc {
                return ac.cmp(&bc);
            }
            i += 1;
            j += 1;
        }

        while a.get(i) == Some(&b'0') {
            i += 1;
        }
        while b.get(j) == Some(&b'0') {
            j += 1;
        }

        // Digit run: first differing digit decides unless one run is longer
        let mut first_diff = Ordering::Equal;
        while is_digit(a.get(i)) && is_digit(b.get(j)) {
            if first_diff == Ordering::Equal {
                first_diff = a[i].cmp(&b[j]);
            }
            i += 1;
            j += 1;
        }
        if is_digit(a.get(i)) {
            return Ordering::Greater;
        }
        if is_digit(b.get(j)) {
            return Ordering::Less;
        }
        if first_diff != Ordering::Equal {
            return first_diff;
        }
    }

    Ordering::Equal
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Version::new(s)
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Version::new(&s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        compare(self, other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self, other)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Relational operator of a versioned dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// `>=`
    GreaterOrEqual,
    /// `<=`
    LessOrEqual,
    /// `=` or `==`
    Equal,
    /// `>>` or `>`
    GreaterThan,
    /// `<<` or `<`
    LessThan,
}

impl Relation {
    /// Parse an operator as written in a Depends field
    pub fn parse(op: &str) -> Result<Self> {
        match op.trim() {
            ">=" => Ok(Relation::GreaterOrEqual),
            "<=" => Ok(Relation::LessOrEqual),
            "=" | "==" => Ok(Relation::Equal),
            ">" | ">>" => Ok(Relation::GreaterThan),
            "<" | "<<" => Ok(Relation::LessThan),
            other => Err(Error::UnknownRelationalOperator(other.to_string())),
        }
    }

    /// Does `candidate` satisfy `candidate <op> required`?
    pub fn satisfied_by(&self, candidate: &Version, required: &Version) -> bool {
        let ord = compare(candidate, required);
        match self {
            Relation::GreaterOrEqual => ord != Ordering::Less,
            Relation::LessOrEqual => ord != Ordering::Greater,
            Relation::Equal => ord == Ordering::Equal,
            Relation::GreaterThan => ord == Ordering::Greater,
            Relation::LessThan => ord == Ordering::Less,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::GreaterOrEqual => ">=",
            Relation::LessOrEqual => "<=",
            Relation::Equal => "=",
            Relation::GreaterThan => ">>",
            Relation::LessThan => "<<",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmp(a: &str, b: &str) -> Ordering {
        compare(&Version::new(a), &Version::new(b))
    }

    #[test]
    fn test_parse_components() {
        let v = Version::new("2:1.2.3-4ubuntu1");
        assert_eq!(v.epoch(), 2);
        assert_eq!(v.upstream(), "1.2.3");
        assert_eq!(v.revision(), "4ubuntu1");

        let v = Version::new("1.0-2-3");
        assert_eq!(v.upstream(), "1.0-2");
        assert_eq!(v.revision(), "3");

        let v = Version::new("1.0");
        assert_eq!(v.epoch(), 0);
        assert_eq!(v.revision(), "");
    }

    #[test]
    fn test_tilde_ordering() {
        assert_eq!(cmp("1.0~~", "1.0~"), Ordering::Less);
        assert_eq!(cmp("1.0~", "1.0"), Ordering::Less);
        assert_eq!(cmp("1.0", "1.0+"), Ordering::Less);
        assert_eq!(cmp("1.0~rc1", "1.0"), Ordering::Less);
        assert_eq!(cmp("1.0~rc1", "1.0~rc2"), Ordering::Less);
    }

    #[test]
    fn test_epoch_dominates() {
        assert_eq!(cmp("1:0.9", "2.0"), Ordering::Greater);
        assert_eq!(cmp("0:2.0", "2.0"), Ordering::Equal);
        assert_eq!(cmp("1:1.0", "2:0.1"), Ordering::Less);
    }

    #[test]
    fn test_numeric_runs() {
        assert_eq!(cmp("1.10", "1.9"), Ordering::Greater);
        assert_eq!(cmp("1.010", "1.10"), Ordering::Equal);
        assert_eq!(cmp("1.0.1", "1.0"), Ordering::Greater);
        assert_eq!(cmp("2.30-1", "2.4-9"), Ordering::Greater);
    }

    #[test]
    fn test_letters_before_punctuation() {
        assert_eq!(cmp("1.0a", "1.0+"), Ordering::Less);
        assert_eq!(cmp("1.0a", "1.0b"), Ordering::Less);
        assert_eq!(cmp("1.0+b1", "1.0.1"), Ordering::Less);
        assert_eq!(cmp("1.0Z", "1.0a"), Ordering::Less);
    }

    #[test]
    fn test_revision_comparison() {
        assert_eq!(cmp("1.0-1", "1.0-2"), Ordering::Less);
        assert_eq!(cmp("1.0-1", "1.0-1+b1"), Ordering::Less);
        assert_eq!(cmp("1.0-1~bpo1", "1.0-1"), Ordering::Less);
        assert_eq!(cmp("1.0", "1.0-0"), Ordering::Equal);
    }

    #[test]
    fn test_equal_strings() {
        for v in ["1.0", "1:2.3-4", "0.0~git20200101.abc-1", "", "~"] {
            assert_eq!(cmp(v, v), Ordering::Equal, "{} should equal itself", v);
        }
    }

    #[test]
    fn test_total_order_properties() {
        let samples = [
            "0", "1.0~~", "1.0~", "1.0~rc1", "1.0", "1.0-0.1", "1.0-1", "1.0-1+b1", "1.0+",
            "1.0a", "1.0.1", "1.00.2", "1.10", "2.0", "2.0-1~bpo", "1:0.1", "1:0.9", "2:0",
        ];
        for a in &samples {
            for b in &samples {
                let ab = cmp(a, b);
                let ba = cmp(b, a);
                assert_eq!(ab, ba.reverse(), "antisymmetry broken for {} / {}", a, b);
                for c in &samples {
                    if ab != Ordering::Greater && cmp(b, c) != Ordering::Greater {
                        assert_ne!(
                            cmp(a, c),
                            Ordering::Greater,
                            "transitivity broken for {} <= {} <= {}",
                            a,
                            b,
                            c
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_sorting_is_monotonic() {
        let mut versions: Vec<Version> = ["1.0", "1.0~rc1", "1:0.1", "0.9", "1.0+b1", "1.0~~"]
            .into_iter()
            .map(Version::from)
            .collect();
        versions.sort();
        let sorted: Vec<&str> = versions.iter().map(|v| v.as_str()).collect();
        assert_eq!(sorted, vec!["0.9", "1.0~~", "1.0~rc1", "1.0", "1.0+b1", "1:0.1"]);
    }

    #[test]
    fn test_relation_parse() {
        assert_eq!(Relation::parse(">=").unwrap(), Relation::GreaterOrEqual);
        assert_eq!(Relation::parse("==").unwrap(), Relation::Equal);
        assert_eq!(Relation::parse(">>").unwrap(), Relation::GreaterThan);
        assert_eq!(Relation::parse("<").unwrap(), Relation::LessThan);
        assert!(matches!(
            Relation::parse("=>"),
            Err(Error::UnknownRelationalOperator(op)) if op == "=>"
        ));
    }

    #[test]
    fn test_relation_satisfaction() {
        let v1 = Version::new("1.0");
        let v2 = Version::new("2.0");
        assert!(Relation::GreaterOrEqual.satisfied_by(&v2, &v1));
        assert!(Relation::GreaterOrEqual.satisfied_by(&v1, &v1));
        assert!(!Relation::GreaterOrEqual.satisfied_by(&v1, &v2));
        assert!(Relation::LessThan.satisfied_by(&v1, &v2));
        assert!(!Relation::GreaterThan.satisfied_by(&v1, &v1));
        assert!(Relation::Equal.satisfied_by(&Version::new("0:1.0"), &v1));
        assert!(Relation::LessOrEqual.satisfied_by(&v1, &v1));
    }
}
