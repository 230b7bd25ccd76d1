// src/config.rs

//! Configuration file parsing
//!
//! Supports TOML configuration files with the following sections:
//! - top level - index subtree name, default log level
//! - [http] - timeout, retries, basic-auth credentials for remote indices
//! - [contents] - in-memory or disk-backed Contents mapping
//! - [publish] - Release generator and signing

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// System-wide configuration file
pub const SYSTEM_CONFIG: &str = "/etc/archive-man.toml";

/// File name looked up under the user's config directory
pub const USER_CONFIG_NAME: &str = "archive-man.toml";

/// TOML configuration file structure
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the index subtree under an archive root
    pub index_dir: String,

    /// Default tracing filter when RUST_LOG is not set
    pub log_level: String,

    pub http: HttpSection,

    pub contents: ContentsSection,

    pub publish: PublishSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_dir: "dists".to_string(),
            log_level: "debug".to_string(),
            http: HttpSection::default(),
            contents: ContentsSection::default(),
            publish: PublishSection::default(),
        }
    }
}

/// Remote index fetching
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            username: None,
            password: None,
        }
    }
}

/// Backing store for parsed Contents files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentsBacking {
    /// Memory below `spill_threshold`, disk above
    Auto,
    Memory,
    Disk,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContentsSection {
    pub backing: ContentsBacking,

    /// Decompressed size in bytes above which `auto` spills to disk
    pub spill_threshold: u64,
}

impl Default for ContentsSection {
    fn default() -> Self {
        Self {
            backing: ContentsBacking::Auto,
            spill_threshold: 32 * 1024 * 1024,
        }
    }
}

impl ContentsSection {
    /// Should a Contents file of `size` bytes go to the disk store?
    pub fn use_disk(&self, size: usize) -> bool {
        match self.backing {
            ContentsBacking::Memory => false,
            ContentsBacking::Disk => true,
            ContentsBacking::Auto => size as u64 > self.spill_threshold,
        }
    }
}

/// Which Release generator to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    /// Built-in hash listing
    Native,
    /// apt-ftparchive release
    Ftparchive,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishSection {
    pub generator: GeneratorKind,
    pub sign: bool,
    pub gpg_home: Option<PathBuf>,
    pub gpg_key: Option<String>,
    pub gpg_passphrase: Option<String>,
}

impl Default for PublishSection {
    fn default() -> Self {
        Self {
            generator: GeneratorKind::Native,
            sign: false,
            gpg_home: None,
            gpg_key: None,
            gpg_passphrase: None,
        }
    }
}

impl Config {
    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load the user configuration, else the system one, else defaults
    pub fn load_default() -> Result<Self> {
        let mut candidates = Vec::new();
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join(USER_CONFIG_NAME));
        }
        candidates.push(PathBuf::from(SYSTEM_CONFIG));

        for path in candidates {
            if path.is_file() {
                debug!("Using configuration {}", path.display());
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.index_dir, "dists");
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.contents.backing, ContentsBacking::Auto);
        assert_eq!(config.publish.generator, GeneratorKind::Native);
        assert!(!config.publish.sign);
    }

    #[test]
    fn test_partial_file() {
        let config = Config::from_toml(
            r#"
            log_level = "info"

            [contents]
            backing = "disk"

            [publish]
            sign = true
            gpg_key = "archive@example.com"
            "#,
        )
        .unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.index_dir, "dists");
        assert_eq!(config.contents.backing, ContentsBacking::Disk);
        assert!(config.contents.use_disk(1));
        assert!(config.publish.sign);
        assert_eq!(config.publish.gpg_key.as_deref(), Some("archive@example.com"));
    }

    #[test]
    fn test_auto_backing_threshold() {
        let section = ContentsSection {
            backing: ContentsBacking::Auto,
            spill_threshold: 100,
        };
        assert!(!section.use_disk(100));
        assert!(section.use_disk(101));
    }

    #[test]
    fn test_invalid_file() {
        let result = Config::from_toml("[contents]\nbacking = \"tape\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/archive-man.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_invalid_file_names_path_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive-man.toml");
        std::fs::write(&path, "[contents]\nbacking = \"tape\"").unwrap();

        let err = Config::load(&path).unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(message.matches("Configuration error").count(), 1);
        assert_eq!(message.matches(&*path.display().to_string()).count(), 1);
        assert!(message.contains("tape"));
    }
}
