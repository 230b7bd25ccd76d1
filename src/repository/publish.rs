// src/repository/publish.rs

//! Release generation and signing collaborators
//!
//! A `ReleaseGenerator` turns a suite directory plus header fields into the
//! text of its Release file; a `Signer` produces `InRelease` and `Release.gpg`
//! next to it. Both are chosen from the `[publish]` configuration section.

use crate::config::{GeneratorKind, PublishSection};
use crate::error::{Error, Result};
use chrono::Utc;
use md5::Md5;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Files in a suite directory that are never listed in its own Release
pub const RELEASE_FILES: [&str; 3] = ["Release", "InRelease", "Release.gpg"];

/// Produces Release text for a suite directory
pub trait ReleaseGenerator {
    fn generate(&self, suite_dir: &Path, fields: &[(String, String)]) -> Result<String>;
}

/// Signs `<suite_dir>/Release`
pub trait Signer {
    fn sign(&self, suite_dir: &Path) -> Result<()>;
}

/// Generator for the configured kind
pub fn generator_for(config: &PublishSection) -> Box<dyn ReleaseGenerator> {
    match config.generator {
        GeneratorKind::Native => Box::new(NativeGenerator),
        GeneratorKind::Ftparchive => Box::new(FtpArchiveGenerator::default()),
    }
}

/// Signer for the configuration; `NoopSigner` unless signing is enabled
pub fn signer_for(config: &PublishSection) -> Box<dyn Signer> {
    if config.sign {
        Box::new(GpgSigner {
            home: config.gpg_home.clone(),
            key: config.gpg_key.clone(),
            passphrase: config.gpg_passphrase.clone(),
        })
    } else {
        Box::new(NoopSigner)
    }
}

/// A file listed in a generated Release
#[derive(Debug, Clone, PartialEq, Eq)]
struct ListedFile {
    path: String,
    size: u64,
    md5: String,
    sha256: String,
}

/// Built-in generator: header fields, a fresh Date, MD5Sum and SHA256 listings
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeGenerator;

impl NativeGenerator {
    fn collect(suite_dir: &Path) -> Result<Vec<ListedFile>> {
        let mut listed = Vec::new();

        for entry in WalkDir::new(suite_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Io(io::Error::other(e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = match entry.path().strip_prefix(suite_dir) {
                Ok(r) => r.to_string_lossy().replace('\\', "/"),
                Err(_) => continue,
            };
            if RELEASE_FILES.contains(&relative.as_str()) {
                continue;
            }

            let mut md5 = Md5::new();
            let mut sha256 = Sha256::new();
            let mut file = File::open(entry.path())?;
            let size = io::copy(&mut file, &mut Tee(&mut md5, &mut sha256))?;

            listed.push(ListedFile {
                path: relative,
                size,
                md5: format!("{:x}", md5.finalize()),
                sha256: format!("{:x}", sha256.finalize()),
            });
        }

        listed.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(listed)
    }
}

/// Feeds the same bytes to two digests
struct Tee<'a>(&'a mut Md5, &'a mut Sha256);

impl Write for Tee<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.update(buf);
        self.1.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ReleaseGenerator for NativeGenerator {
    fn generate(&self, suite_dir: &Path, fields: &[(String, String)]) -> Result<String> {
        let mut out = String::new();
        for (key, value) in fields {
            if key.eq_ignore_ascii_case("Date") {
                continue;
            }
            out.push_str(&format!("{}: {}\n", key, value));
        }
        out.push_str(&format!(
            "Date: {}\n",
            Utc::now().format("%a, %d %b %Y %H:%M:%S UTC")
        ));

        let listed = Self::collect(suite_dir)?;
        debug!("Listing {} files in {}", listed.len(), suite_dir.display());

        out.push_str("MD5Sum:\n");
        for f in &listed {
            out.push_str(&format!(" {} {:>16} {}\n", f.md5, f.size, f.path));
        }
        out.push_str("SHA256:\n");
        for f in &listed {
            out.push_str(&format!(" {} {:>16} {}\n", f.sha256, f.size, f.path));
        }
        Ok(out)
    }
}

/// Delegates to `apt-ftparchive release`
#[derive(Debug, Clone)]
pub struct FtpArchiveGenerator {
    pub program: String,
}

impl Default for FtpArchiveGenerator {
    fn default() -> Self {
        Self {
            program: "apt-ftparchive".to_string(),
        }
    }
}

impl FtpArchiveGenerator {
    fn config_text(fields: &[(String, String)]) -> String {
        let mut conf = String::from("APT::FTPArchive::Release {\n");
        for (key, value) in fields {
            if key.eq_ignore_ascii_case("Date") {
                continue;
            }
            conf.push_str(&format!("  {} \"{}\";\n", key, value.replace('"', "'")));
        }
        conf.push_str("};\n");
        conf
    }
}

impl ReleaseGenerator for FtpArchiveGenerator {
    fn generate(&self, suite_dir: &Path, fields: &[(String, String)]) -> Result<String> {
        let mut conf = tempfile::Builder::new().suffix(".conf").tempfile()?;
        conf.write_all(Self::config_text(fields).as_bytes())?;
        conf.flush()?;

        debug!("Running {} release {}", self.program, suite_dir.display());
        let output = Command::new(&self.program)
            .arg("-c")
            .arg(conf.path())
            .arg("release")
            .arg(suite_dir)
            .output()
            .map_err(|e| {
                Error::Collaborator(format!("Failed to run {}: {}", self.program, e))
            })?;

        if !output.status.success() {
            return Err(Error::Collaborator(format!(
                "{} release failed: {}",
                self.program,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Signs with the `gpg` binary: clearsigned `InRelease`, detached `Release.gpg`
#[derive(Debug, Clone, Default)]
pub struct GpgSigner {
    pub home: Option<PathBuf>,
    pub key: Option<String>,
    pub passphrase: Option<String>,
}

impl GpgSigner {
    fn run(&self, mode: &[&str], output: &Path, input: &Path) -> Result<()> {
        let mut cmd = Command::new("gpg");
        cmd.args(["--batch", "--yes", "--digest-algo", "SHA512"]);
        if let Some(home) = &self.home {
            cmd.arg("--homedir").arg(home);
        }
        if let Some(key) = &self.key {
            cmd.args(["--local-user", key]);
        }
        if self.passphrase.is_some() {
            cmd.args(["--pinentry-mode", "loopback", "--passphrase-fd", "0"]);
        }
        cmd.args(mode).arg("--output").arg(output).arg(input);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Collaborator(format!("Failed to run gpg: {}", e)))?;
        if let Some(mut stdin) = child.stdin.take() {
            if let Some(passphrase) = &self.passphrase {
                writeln!(stdin, "{}", passphrase)?;
            }
        }

        let result = child.wait_with_output()?;
        if !result.status.success() {
            return Err(Error::Collaborator(format!(
                "gpg {} failed: {}",
                mode.join(" "),
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }
        Ok(())
    }
}

impl Signer for GpgSigner {
    fn sign(&self, suite_dir: &Path) -> Result<()> {
        let release = suite_dir.join("Release");
        if !release.is_file() {
            return Err(Error::Collaborator(format!(
                "nothing to sign, {} does not exist",
                release.display()
            )));
        }

        self.run(&["--clearsign"], &suite_dir.join("InRelease"), &release)?;
        self.run(
            &["--armor", "--detach-sign"],
            &suite_dir.join("Release.gpg"),
            &release,
        )?;
        info!("Signed {}", release.display());
        Ok(())
    }
}

/// Leaves the Release unsigned
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSigner;

impl Signer for NoopSigner {
    fn sign(&self, suite_dir: &Path) -> Result<()> {
        debug!("Signing disabled, {} left unsigned", suite_dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::control::{Fields, parse_file_list};
    use std::fs;

    fn fields() -> Vec<(String, String)> {
        vec![
            ("Origin".to_string(), "Example".to_string()),
            ("Suite".to_string(), "stable".to_string()),
            ("Date".to_string(), "Thu, 01 Jan 1970 00:00:00 UTC".to_string()),
        ]
    }

    #[test]
    fn test_native_generator() {
        let dir = tempfile::tempdir().unwrap();
        let suite = dir.path();
        fs::create_dir_all(suite.join("main/binary-amd64")).unwrap();
        fs::write(suite.join("main/binary-amd64/Packages"), b"").unwrap();
        fs::write(suite.join("Release"), b"old").unwrap();
        fs::write(suite.join("InRelease"), b"old").unwrap();

        let text = NativeGenerator.generate(suite, &fields()).unwrap();
        assert!(text.starts_with("Origin: Example\nSuite: stable\nDate: "));
        assert!(!text.contains("1970"));

        let parsed = Fields::parse(&text).unwrap();
        let md5 = parse_file_list(parsed.get("MD5Sum").unwrap());
        assert_eq!(md5.len(), 1);
        assert_eq!(md5[0].path, "main/binary-amd64/Packages");
        assert_eq!(md5[0].hash, "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5[0].size, 0);

        let sha = parse_file_list(parsed.get("SHA256").unwrap());
        assert_eq!(
            sha[0].hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_ftparchive_config_text() {
        let conf = FtpArchiveGenerator::config_text(&fields());
        assert!(conf.contains("Origin \"Example\";"));
        assert!(!conf.contains("Date"));
    }

    #[test]
    fn test_missing_generator_binary() {
        let dir = tempfile::tempdir().unwrap();
        let generator = FtpArchiveGenerator {
            program: "/nonexistent/apt-ftparchive".to_string(),
        };
        assert!(matches!(
            generator.generate(dir.path(), &fields()),
            Err(Error::Collaborator(_))
        ));
    }

    #[test]
    fn test_gpg_signer_requires_release() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            GpgSigner::default().sign(dir.path()),
            Err(Error::Collaborator(_))
        ));
        assert!(NoopSigner.sign(dir.path()).is_ok());
    }

    #[test]
    fn test_factories() {
        let mut config = PublishSection::default();
        let dir = tempfile::tempdir().unwrap();
        // Default: native generator, no signing
        assert!(generator_for(&config).generate(dir.path(), &[]).is_ok());
        assert!(signer_for(&config).sign(dir.path()).is_ok());

        config.sign = true;
        assert!(signer_for(&config).sign(dir.path()).is_err());
    }
}
