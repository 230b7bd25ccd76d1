// src/reconcile/mod.rs

//! Algorithms over parsed archive indices
//!
//! Each algorithm takes an explicit [`Context`](crate::context::Context),
//! runs to completion, and returns a serializable report.

pub mod check;
pub mod depcheck;
pub mod diff;
pub mod merge;
pub mod normalize;
pub mod rename;

pub use check::{CheckOptions, CheckReport, Finding, FindingKind, check, strip};
pub use depcheck::{DepCheckOptions, DepCheckReport, UnsatisfiedDependency, checkdep};
pub use diff::{DiffEntry, DiffMethod, DiffOptions, DiffReport, Md5Report, diff, diff_md5};
pub use merge::{KeyMode, MergeOptions, MergePolicy, MergeReport, merge};
pub use normalize::{DedupReport, dedup};
pub use rename::{RenameReport, parse_rename_list, rename};
