// src/packages/dependency.rs

//! Depends / Pre-Depends grammar
//!
//! Format: "libc6 (>= 2.34), foo | bar (<< 2.0), baz:any"
//! `,` separates groups that must all hold, `|` separates alternatives.

use serde::Serialize;
use std::fmt;

/// One alternative of a dependency group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyAtom {
    pub name: String,
    /// Relational operator as written; empty when unversioned
    pub operator: String,
    /// Required version; empty when unversioned
    pub version: String,
}

impl DependencyAtom {
    pub fn unversioned(name: &str) -> Self {
        Self {
            name: name.to_string(),
            operator: String::new(),
            version: String::new(),
        }
    }

    pub fn versioned(name: &str, operator: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            operator: operator.to_string(),
            version: version.to_string(),
        }
    }

    pub fn is_versioned(&self) -> bool {
        !self.operator.is_empty()
    }

    /// Package name without an architecture qualifier (`foo:any` -> `foo`)
    pub fn base_name(&self) -> &str {
        self.name.split(':').next().unwrap_or(&self.name)
    }

    /// Parse a single alternative
    ///
    /// Format: "package (>= 1.0)" or "package [amd64]" or "package"
    pub fn parse(token: &str) -> Option<Self> {
        let token = strip_restrictions(token);
        let token = token.trim();
        if token.is_empty() {
            return None;
        }

        let Some(open) = token.find('(') else {
            return Some(Self::unversioned(token.split_whitespace().next()?));
        };

        let name = token[..open].trim();
        if name.is_empty() {
            return None;
        }
        let inner = token[open + 1..].split(')').next().unwrap_or("").trim();
        let op_len = inner
            .find(|c: char| !matches!(c, '<' | '>' | '=' | '!'))
            .unwrap_or(inner.len());
        let operator = &inner[..op_len];
        let version = inner[op_len..].trim();

        if operator.is_empty() || version.is_empty() {
            // "foo (1.0)" or "foo ()" carries no usable relation
            return Some(Self::unversioned(name));
        }
        Some(Self::versioned(name, operator, version))
    }
}

/// Drop `[arch ...]` and `<profile>` restrictions
fn strip_restrictions(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    let mut depth = 0usize;
    for c in token.chars() {
        match c {
            '[' | '<' if depth > 0 || !inside_parens(&out) => depth += 1,
            ']' | '>' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

fn inside_parens(prefix: &str) -> bool {
    prefix.matches('(').count() > prefix.matches(')').count()
}

impl fmt::Display for DependencyAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_versioned() {
            write!(f, "{} ({} {})", self.name, self.operator, self.version)
        } else {
            f.write_str(&self.name)
        }
    }
}

/// Alternatives of which at least one must hold
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct DependencyGroup(pub Vec<DependencyAtom>);

impl DependencyGroup {
    pub fn atoms(&self) -> &[DependencyAtom] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DependencyGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|a| a.to_string()).collect();
        f.write_str(&parts.join(" | "))
    }
}

/// Parse a full Depends-class field value into ordered groups
pub fn parse_dependency_list(value: &str) -> Vec<DependencyGroup> {
    value
        .split(',')
        .map(|group| DependencyGroup(group.split('|').filter_map(DependencyAtom::parse).collect()))
        .filter(|group| !group.is_empty())
        .collect()
}

/// Parse a Provides field into virtual package names
pub fn parse_provides(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter_map(DependencyAtom::parse)
        .map(|atom| atom.name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_atom() {
        let atom = DependencyAtom::parse("libc6 (>= 2.34)").unwrap();
        assert_eq!(atom.name, "libc6");
        assert_eq!(atom.operator, ">=");
        assert_eq!(atom.version, "2.34");

        let atom = DependencyAtom::parse(" bash ").unwrap();
        assert_eq!(atom, DependencyAtom::unversioned("bash"));
        assert!(!atom.is_versioned());

        let atom = DependencyAtom::parse("foo (<<2.0-1)").unwrap();
        assert_eq!(atom.operator, "<<");
        assert_eq!(atom.version, "2.0-1");
    }

    #[test]
    fn test_parse_atom_with_qualifiers() {
        let atom = DependencyAtom::parse("python3:any (>= 3.9) [amd64 arm64]").unwrap();
        assert_eq!(atom.name, "python3:any");
        assert_eq!(atom.base_name(), "python3");
        assert_eq!(atom.operator, ">=");

        let atom = DependencyAtom::parse("debhelper <!nocheck>").unwrap();
        assert_eq!(atom.name, "debhelper");
    }

    #[test]
    fn test_unknown_operator_kept_verbatim() {
        let atom = DependencyAtom::parse("foo (=> 1.0)").unwrap();
        assert_eq!(atom.operator, "=>");
    }

    #[test]
    fn test_parse_dependency_list() {
        let groups = parse_dependency_list("libc6 (>= 2.34), foo | bar (<< 2), baz");
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[1].atoms().len(), 2);
        assert_eq!(groups[1].atoms()[1].name, "bar");
        assert_eq!(groups[1].to_string(), "foo | bar (<< 2)");
        assert!(parse_dependency_list("").is_empty());
    }

    #[test]
    fn test_parse_provides() {
        let provides = parse_provides("mail-transport-agent, foo (= 1.2)");
        assert_eq!(provides, vec!["mail-transport-agent", "foo"]);
    }
}
