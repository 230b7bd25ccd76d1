// src/filesystem/mod.rs

//! Filesystem helpers for index writers and pool maintenance
//!
//! Every index write goes to a temporary sibling first and is renamed over
//! the target, so an interrupted run never leaves a half-written index.

use crate::error::{Error, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use md5::{Digest, Md5};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Compression suffixes that may sit next to an index file
pub const COMPRESSED_SUFFIXES: [&str; 3] = [".gz", ".bz2", ".xz"];

/// Atomically replace `path` with `content`
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;

    debug!("Wrote {} ({} bytes)", path.display(), content.len());
    Ok(())
}

/// Gzip `content` into memory
pub fn gzip(content: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content)?;
    Ok(encoder.finish()?)
}

/// Path with a suffix appended to the file name (`Packages` -> `Packages.gz`)
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Write a primary index file plus its gzip sibling
///
/// Both are replaced atomically. Compressed siblings that are not
/// regenerated (`.bz2`, `.xz`) are removed afterwards.
pub fn write_index_file(path: &Path, content: &[u8]) -> Result<()> {
    atomic_write(path, content)?;
    atomic_write(&with_suffix(path, ".gz"), &gzip(content)?)?;

    for suffix in COMPRESSED_SUFFIXES.iter().filter(|s| **s != ".gz") {
        let sibling = with_suffix(path, suffix);
        if sibling.exists() {
            fs::remove_file(&sibling)?;
        }
    }
    Ok(())
}

/// MD5 of a file, streamed
pub fn file_md5(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Move `path` under `backup_root`, mirroring its location relative to `topdir`
///
/// Falls back to copy + remove when the backup root is on another device.
pub fn move_to_backup(path: &Path, topdir: &Path, backup_root: &Path) -> Result<PathBuf> {
    let relative = path.strip_prefix(topdir).map_err(|_| {
        Error::Unsupported(format!(
            "{} is outside of {}",
            path.display(),
            topdir.display()
        ))
    })?;
    let dest = backup_root.join(relative);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    if fs::rename(path, &dest).is_err() {
        debug!("rename failed, copying {} to {}", path.display(), dest.display());
        fs::copy(path, &dest)?;
        fs::remove_file(path)?;
    }
    Ok(dest)
}

/// Relocate a pool file to `dest`
///
/// Symlinks are copied through (the link stays), regular files are renamed.
/// Returns false without touching anything when `dest` already exists.
pub fn relocate(src: &Path, dest: &Path) -> Result<bool> {
    if dest.exists() {
        debug!("{} already exists, not relocating", dest.display());
        return Ok(false);
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    if is_symlink(src) {
        fs::copy(src, dest)?;
    } else {
        fs::rename(src, dest)?;
    }
    Ok(true)
}

/// Is `path` a symbolic link (without following it)?
pub fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_creates_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a/b/Packages");
        atomic_write(&path, b"hello").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn test_write_index_file_siblings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Packages");
        fs::write(with_suffix(&path, ".xz"), b"stale").unwrap();
        fs::write(with_suffix(&path, ".gz"), b"not gzip").unwrap();

        write_index_file(&path, b"Package: a\n").unwrap();

        assert!(!with_suffix(&path, ".xz").exists());
        let mut decoded = String::new();
        GzDecoder::new(File::open(with_suffix(&path, ".gz")).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "Package: a\n");
    }

    #[test]
    fn test_file_md5() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, b"").unwrap();
        assert_eq!(file_md5(&path).unwrap(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_move_to_backup() {
        let top = tempdir().unwrap();
        let backup = tempdir().unwrap();
        let file = top.path().join("pool/main/f/foo.deb");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"deb").unwrap();

        let dest = move_to_backup(&file, top.path(), backup.path()).unwrap();
        assert_eq!(dest, backup.path().join("pool/main/f/foo.deb"));
        assert!(!file.exists());
        assert_eq!(fs::read(dest).unwrap(), b"deb");
    }

    #[test]
    fn test_relocate_is_idempotent() {
        let top = tempdir().unwrap();
        let src = top.path().join("pool/a.deb");
        let dest = top.path().join("pool/new/a.deb");
        fs::create_dir_all(src.parent().unwrap()).unwrap();
        fs::write(&src, b"deb").unwrap();

        assert!(relocate(&src, &dest).unwrap());
        assert!(!src.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"deb");
        assert!(!relocate(&src, &dest).unwrap());
    }
}
