// src/reconcile/normalize.rs

//! Canonical rewrite of a single Packages or Sources file

use crate::context::Context;
use crate::error::Result;
use crate::repository::{IndexFile, Location};
use serde::Serialize;
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct DedupReport {
    pub location: String,
    /// Records written (one per name)
    pub records: usize,
    /// Malformed stanzas dropped
    pub rejected: usize,
}

impl fmt::Display for DedupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} records, {} rejected",
            self.location, self.records, self.rejected
        )
    }
}

/// Keep the highest version per name and rewrite the file sorted by name
///
/// The primary file and its `.gz` sibling are both rewritten; `location`
/// may name either.
pub fn dedup(location: &Location, ctx: &Context) -> Result<DedupReport> {
    location.require_local()?;
    let index = IndexFile::load(ctx.client(), location)?;
    index.write()?;

    info!("Normalised {} ({} records)", index.location(), index.len());
    Ok(DedupReport {
        location: index.location().to_string(),
        records: index.len(),
        rejected: index.rejected(),
    })
}
