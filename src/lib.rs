// src/lib.rs

//! Debian archive metadata tooling
//!
//! Parses Release, Packages, Sources and Contents indices and runs
//! reconciliation passes over them: suite diffs, suite merges, pool/index
//! consistency checks, dependency satisfiability checks and pool path
//! rewrites.
//!
//! # Architecture
//!
//! - `packages` and `version`: typed stanza records and Debian version ordering
//! - `repository`: the Release aggregate, lazily loading its indices
//! - `reconcile`: one module per algorithm, each returning a report
//! - `db`: the scratch SQLite store behind large Contents files

pub mod config;
pub mod context;
pub mod db;
mod error;
pub mod filesystem;
pub mod packages;
pub mod reconcile;
pub mod repository;
pub mod version;

pub use context::Context;
pub use error::{Error, Result};
