// src/packages/mod.rs

//! Index record model
//!
//! This module turns control-file stanzas into typed records. Both record
//! kinds implement the `IndexRecord` trait.

pub mod binary;
pub mod control;
pub mod dependency;
pub mod source;
pub mod traits;

pub use binary::BinaryPackage;
pub use control::FileEntry;
pub use dependency::{DependencyAtom, DependencyGroup};
pub use source::SourcePackage;
pub use traits::{IndexRecord, SOURCE_ARCH};
