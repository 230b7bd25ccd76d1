// src/error.rs

use thiserror::Error;

/// Core error types for archive-man
#[derive(Error, Debug)]
pub enum Error {
    /// Scratch database errors (disk-backed contents store)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stanza could not be turned into a record
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// The archive root has no index subtree
    #[error("Not an archive, index directory missing: {0}")]
    MissingArchive(String),

    /// Dependency relation outside the known grammar
    #[error("Unknown relational operator: {0}")]
    UnknownRelationalOperator(String),

    /// Merge destination collision without force
    #[error("Target already exists: {0}")]
    TargetExists(String),

    /// Remote index unreachable
    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Generic parse failures (Release, config values, sizes)
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Operation the tool refuses to perform
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Configuration file problems
    #[error("Configuration error: {0}")]
    Config(String),

    /// External index generator or signer failed
    #[error("Collaborator failed: {0}")]
    Collaborator(String),

    /// Exclusion pattern did not compile
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Result type alias using archive-man's Error type
pub type Result<T> = std::result::Result<T, Error>;
