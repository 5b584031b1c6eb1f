//! The `Options` entity and the small enums it is built from.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::{Result, VaultarError};

/// Per-file digest algorithm. Must stay stable across prior/current runs
/// for incremental change detection to mean anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "md5",
            DigestAlgorithm::Sha1 => "sha1",
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "md5" => Ok(DigestAlgorithm::Md5),
            "sha1" => Ok(DigestAlgorithm::Sha1),
            "sha256" => Ok(DigestAlgorithm::Sha256),
            "sha512" => Ok(DigestAlgorithm::Sha512),
            other => Err(VaultarError::Config(format!(
                "unknown checksum algorithm: {other}"
            ))),
        }
    }
}

impl Default for DigestAlgorithm {
    fn default() -> Self {
        DigestAlgorithm::Sha256
    }
}

/// Compression filter applied to the whole tar stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
    Lz4,
}

impl Compression {
    pub fn extension(self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some("gz"),
            Compression::Bzip2 => Some("bz2"),
            Compression::Xz => Some("xz"),
            Compression::Lz4 => Some("lz4"),
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Compression::None),
            "gzip" => Ok(Compression::Gzip),
            "bzip2" => Ok(Compression::Bzip2),
            "xz" => Ok(Compression::Xz),
            "lz4" => Ok(Compression::Lz4),
            other => Err(VaultarError::Config(format!(
                "unknown compressor: {other}"
            ))),
        }
    }
}

impl Default for Compression {
    fn default() -> Self {
        Compression::None
    }
}

/// OpenSSL-compatible symmetric cipher identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CipherId {
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
}

impl CipherId {
    pub fn name(self) -> &'static str {
        match self {
            CipherId::Aes128Cbc => "aes-128-cbc",
            CipherId::Aes192Cbc => "aes-192-cbc",
            CipherId::Aes256Cbc => "aes-256-cbc",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "aes-128-cbc" => Ok(CipherId::Aes128Cbc),
            "aes-192-cbc" => Ok(CipherId::Aes192Cbc),
            "aes-256-cbc" => Ok(CipherId::Aes256Cbc),
            other => Err(VaultarError::Config(format!("unknown cipher: {other}"))),
        }
    }

    /// `(key_len, iv_len)` in bytes.
    pub fn key_iv_len(self) -> (usize, usize) {
        match self {
            CipherId::Aes128Cbc => (16, 16),
            CipherId::Aes192Cbc => (24, 16),
            CipherId::Aes256Cbc => (32, 16),
        }
    }
}

/// Top-level run configuration.
#[derive(Clone, Debug, Default)]
pub struct Options {
    pub directories: Vec<PathBuf>,
    pub exclude: HashSet<PathBuf>,
    pub digest_algorithm: DigestAlgorithm,
    pub cipher: Option<CipherId>,
    pub compression: Compression,
    pub compression_level: Option<u32>,
    pub output_directory: Option<PathBuf>,
    pub prev_backup: Option<PathBuf>,
    pub verbose: bool,
    pub password: Option<String>,
}

impl Options {
    /// Resolve the directory archives get written to, creating
    /// `$HOME/Backups` (mode 0755) if no explicit output was given.
    pub fn resolve_output_directory(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.output_directory {
            std::fs::create_dir_all(dir)?;
            return Ok(dir.clone());
        }
        let home = crate::config::home_dir()?;
        let dir = home.join("Backups");
        std::fs::create_dir_all(&dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o755))?;
        }
        Ok(dir)
    }
}
