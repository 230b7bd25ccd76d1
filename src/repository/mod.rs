// src/repository/mod.rs

//! Archive index model and byte-source resolution
//!
//! This module provides functionality for:
//! - Resolving index locations (local paths, `file://`, HTTP(S) URLs)
//! - Fetching index bytes with retry support
//! - Transparent gzip decompression
//! - The Release → {Packages, Sources, Contents} aggregate

pub mod contents;
pub mod index;
pub mod publish;
pub mod release;

pub use contents::ContentMapping;
pub use index::{BinaryIndex, Index, IndexFile, SourceIndex};
pub use release::{IndexKind, Release};

use crate::config::HttpSection;
use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use std::cell::OnceCell;
use std::fmt;
use std::fs;
use std::io::{BufRead, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Where an index lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    Remote(String),
}

impl Location {
    /// Classify a path or URL
    ///
    /// Anything without `://` is a local path; `file://` is stripped.
    pub fn parse(s: &str) -> Self {
        if let Some(path) = s.strip_prefix("file://") {
            Location::Local(PathBuf::from(path))
        } else if s.contains("://") {
            Location::Remote(s.to_string())
        } else {
            Location::Local(PathBuf::from(s))
        }
    }

    /// Resolve a `/`-separated relative path against this location
    pub fn join(&self, relative: &str) -> Self {
        match self {
            Location::Local(p) => Location::Local(p.join(relative)),
            Location::Remote(url) => {
                Location::Remote(format!("{}/{}", url.trim_end_matches('/'), relative))
            }
        }
    }

    /// Containing directory
    pub fn parent(&self) -> Self {
        match self {
            Location::Local(p) => {
                Location::Local(p.parent().map(Path::to_path_buf).unwrap_or_default())
            }
            Location::Remote(url) => {
                let trimmed = url.trim_end_matches('/');
                match trimmed.rsplit_once('/') {
                    Some((head, _)) if !head.ends_with('/') => Location::Remote(head.to_string()),
                    _ => Location::Remote(trimmed.to_string()),
                }
            }
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        match self {
            Location::Local(p) => p.file_name().and_then(|n| n.to_str()),
            Location::Remote(url) => url.trim_end_matches('/').rsplit('/').next(),
        }
    }

    pub fn as_local(&self) -> Option<&Path> {
        match self {
            Location::Local(p) => Some(p),
            Location::Remote(_) => None,
        }
    }

    /// Local path or an error for URL-backed locations
    pub fn require_local(&self) -> Result<&Path> {
        self.as_local().ok_or_else(|| {
            Error::Unsupported(format!("cannot write to remote location {}", self))
        })
    }

    /// Same location with a trailing `.gz` removed
    pub fn without_gz(&self) -> Self {
        match self {
            Location::Local(p) => match p.to_str().and_then(|s| s.strip_suffix(".gz")) {
                Some(stripped) => Location::Local(PathBuf::from(stripped)),
                None => self.clone(),
            },
            Location::Remote(url) => {
                Location::Remote(url.strip_suffix(".gz").unwrap_or(url).to_string())
            }
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(p) => write!(f, "{}", p.display()),
            Location::Remote(url) => f.write_str(url),
        }
    }
}

/// Byte-source reader with retry support for remote locations
pub struct RepositoryClient {
    client: OnceCell<Client>,
    timeout: Duration,
    max_retries: u32,
    credentials: Option<(String, Option<String>)>,
}

impl RepositoryClient {
    /// Create a new repository client
    ///
    /// The HTTP client is only built on first remote access.
    pub fn new(http: &HttpSection) -> Self {
        Self {
            client: OnceCell::new(),
            timeout: Duration::from_secs(http.timeout_secs),
            max_retries: http.max_retries.max(1),
            credentials: http
                .username
                .clone()
                .map(|user| (user, http.password.clone())),
        }
    }

    fn http(&self) -> Result<&Client> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::Fetch {
                url: String::new(),
                reason: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(self.client.get_or_init(|| client))
    }

    fn request(&self, builder: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match &self.credentials {
            Some((user, pass)) => builder.basic_auth(user, pass.as_ref()),
            None => builder,
        }
    }

    /// Read the full contents of a location
    pub fn read(&self, location: &Location) -> Result<Vec<u8>> {
        match location {
            Location::Local(path) => Ok(fs::read(path)?),
            Location::Remote(url) => self.fetch(url),
        }
    }

    /// GET with retry; anything but 200 is a failure
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        info!("Fetching {}", url);
        let client = self.http()?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.request(client.get(url)).send() {
                Ok(response) => {
                    if response.status() != StatusCode::OK {
                        return Err(Error::Fetch {
                            url: url.to_string(),
                            reason: format!("HTTP {}", response.status()),
                        });
                    }
                    let bytes = response.bytes().map_err(|e| Error::Fetch {
                        url: url.to_string(),
                        reason: format!("Failed to read response: {}", e),
                    })?;
                    return Ok(bytes.to_vec());
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::Fetch {
                            url: url.to_string(),
                            reason: format!("giving up after {} attempts: {}", attempt, e),
                        });
                    }
                    warn!("Fetch attempt {} for {} failed: {}, retrying...", attempt, url, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }

    /// Does the location exist? Local files are checked directly, URLs with HEAD
    pub fn exists(&self, location: &Location) -> bool {
        match location {
            Location::Local(path) => path.is_file(),
            Location::Remote(url) => {
                let client = match self.http() {
                    Ok(c) => c,
                    Err(e) => {
                        warn!("{}", e);
                        return false;
                    }
                };
                match self.request(client.head(url)).send() {
                    Ok(response) => response.status() == StatusCode::OK,
                    Err(e) => {
                        warn!("HEAD {} failed: {}", url, e);
                        false
                    }
                }
            }
        }
    }

    /// Read a location and decode it as (possibly gzip-compressed) text
    pub fn read_text(&self, location: &Location) -> Result<String> {
        let bytes = self.read(location)?;
        Ok(decode_index(&location.to_string(), bytes))
    }
}

/// A streamed index with its expected decoded size in bytes
pub struct IndexReader {
    pub reader: Box<dyn BufRead>,
    /// Decoded size: the gzip trailer for compressed data, else the byte length
    pub size: u64,
}

impl RepositoryClient {
    /// Open a location for line-by-line reading, gunzipping `.gz` names
    ///
    /// Local files are streamed from disk; remote bodies are fetched and then
    /// decoded incrementally.
    pub fn open_reader(&self, location: &Location) -> Result<IndexReader> {
        let gz = location.to_string().ends_with(".gz");
        match location {
            Location::Local(path) => {
                let mut file = fs::File::open(path)?;
                let len = file.metadata()?.len();
                if gz && has_gzip_magic(&mut file)? {
                    let size = gzip_trailer_size(&mut file, len)?;
                    file.seek(SeekFrom::Start(0))?;
                    return Ok(IndexReader {
                        reader: Box::new(BufReader::new(GzDecoder::new(file))),
                        size,
                    });
                }
                file.seek(SeekFrom::Start(0))?;
                Ok(IndexReader {
                    reader: Box::new(BufReader::new(file)),
                    size: len,
                })
            }
            Location::Remote(url) => {
                let bytes = self.fetch(url)?;
                if gz && bytes.starts_with(&GZIP_MAGIC) {
                    let size = match bytes.len().checked_sub(4) {
                        Some(at) => trailer_u32(&bytes[at..]),
                        None => bytes.len() as u64,
                    };
                    return Ok(IndexReader {
                        reader: Box::new(BufReader::new(GzDecoder::new(Cursor::new(bytes)))),
                        size,
                    });
                }
                let size = bytes.len() as u64;
                Ok(IndexReader {
                    reader: Box::new(Cursor::new(bytes)),
                    size,
                })
            }
        }
    }
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

fn has_gzip_magic(file: &mut fs::File) -> Result<bool> {
    let mut magic = [0u8; 2];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == GZIP_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Uncompressed size recorded in the last four bytes of a gzip file (mod 2^32)
fn gzip_trailer_size(file: &mut fs::File, len: u64) -> Result<u64> {
    if len < 4 {
        return Ok(len);
    }
    let mut trailer = [0u8; 4];
    file.seek(SeekFrom::Start(len - 4))?;
    file.read_exact(&mut trailer)?;
    Ok(trailer_u32(&trailer))
}

fn trailer_u32(bytes: &[u8]) -> u64 {
    let mut trailer = [0u8; 4];
    trailer.copy_from_slice(&bytes[..4]);
    u64::from(u32::from_le_bytes(trailer))
}

/// Decode index bytes, gunzipping `.gz` names
///
/// A `.gz` name whose bytes are not gzip is read as plain text.
pub fn decode_index(name: &str, bytes: Vec<u8>) -> String {
    let bytes = if name.ends_with(".gz") {
        let mut decoded = Vec::new();
        match GzDecoder::new(bytes.as_slice()).read_to_end(&mut decoded) {
            Ok(_) => decoded,
            Err(e) => {
                debug!("{} is not gzip ({}), reading as plain text", name, e);
                bytes
            }
        }
    } else {
        bytes
    };

    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!("{} is not valid UTF-8, replacing invalid sequences", name);
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::gzip;

    #[test]
    fn test_location_parse() {
        assert_eq!(
            Location::parse("file:///srv/archive/dists/a/Release"),
            Location::Local(PathBuf::from("/srv/archive/dists/a/Release"))
        );
        assert_eq!(
            Location::parse("relative/Release"),
            Location::Local(PathBuf::from("relative/Release"))
        );
        assert!(matches!(
            Location::parse("https://example.com/debian/dists/a/Release"),
            Location::Remote(_)
        ));
    }

    #[test]
    fn test_remote_join_and_parent() {
        let release = Location::parse("https://example.com/debian/dists/a/Release");
        let dir = release.parent();
        assert_eq!(dir, Location::Remote("https://example.com/debian/dists/a".to_string()));
        assert_eq!(
            dir.join("main/binary-amd64/Packages.gz"),
            Location::Remote(
                "https://example.com/debian/dists/a/main/binary-amd64/Packages.gz".to_string()
            )
        );
        assert_eq!(release.file_name(), Some("Release"));
    }

    #[test]
    fn test_without_gz() {
        let loc = Location::parse("/srv/dists/a/main/binary-amd64/Packages.gz");
        assert_eq!(loc.without_gz(), Location::parse("/srv/dists/a/main/binary-amd64/Packages"));
    }

    #[test]
    fn test_decode_index() {
        let plain = "Package: a\n".to_string();
        assert_eq!(decode_index("Packages", plain.clone().into_bytes()), plain);
        assert_eq!(decode_index("Packages.gz", gzip(plain.as_bytes()).unwrap()), plain);
        // Mislabelled plain text still reads
        assert_eq!(decode_index("Packages.gz", plain.clone().into_bytes()), plain);
    }

    #[test]
    fn test_local_read_and_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Packages");
        fs::write(&path, "Package: a\n").unwrap();

        let client = RepositoryClient::new(&HttpSection::default());
        let loc = Location::Local(path);
        assert!(client.exists(&loc));
        assert_eq!(client.read_text(&loc).unwrap(), "Package: a\n");
        assert!(!client.exists(&Location::Local(dir.path().join("missing"))));
        assert!(matches!(
            client.read(&Location::Local(dir.path().join("missing"))),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_open_reader_streams_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let text = "bin/sh   shells/dash\n".repeat(50);
        let gz = dir.path().join("Contents-amd64.gz");
        fs::write(&gz, gzip(text.as_bytes()).unwrap()).unwrap();
        let fake = dir.path().join("Contents-i386.gz");
        fs::write(&fake, "bin/sh   shells/dash\n").unwrap();
        let client = RepositoryClient::new(&HttpSection::default());

        let mut opened = client.open_reader(&Location::Local(gz)).unwrap();
        assert_eq!(opened.size, text.len() as u64);
        let mut decoded = String::new();
        opened.reader.read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, text);

        let mut opened = client.open_reader(&Location::Local(fake)).unwrap();
        assert_eq!(opened.size, 21);
        let mut first = String::new();
        opened.reader.read_line(&mut first).unwrap();
        assert_eq!(first, "bin/sh   shells/dash\n");
    }
}
