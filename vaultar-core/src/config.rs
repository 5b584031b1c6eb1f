//! The persisted `$HOME/.vaultar` configuration file.
//!
//! Binary-safe, `\0`-terminated key/value entries. Multi-valued keys
//! (`DIRECTORIES`, `EXCLUDE`) concatenate `\0`-terminated strings under one
//! key; `ENC_PASSWORD` is hex-encoded so it never carries a raw `\0`.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, VaultarError};
use crate::options::{CipherId, Compression, DigestAlgorithm, Options};

const KEY_DIRECTORIES: &str = "DIRECTORIES";
const KEY_EXCLUDE: &str = "EXCLUDE";
const KEY_HASH_ALGORITHM: &str = "HASH_ALGORITHM";
const KEY_ENC_ALGORITHM: &str = "ENC_ALGORITHM";
const KEY_ENC_PASSWORD: &str = "ENC_PASSWORD";
const KEY_C_TYPE: &str = "C_TYPE";
const KEY_C_LEVEL: &str = "C_LEVEL";
const KEY_OUTPUT_DIRECTORY: &str = "OUTPUT_DIRECTORY";
const KEY_PREV_BACKUP: &str = "CO_PREV_BACKUP";
const KEY_FLAGS_VERBOSE: &str = "FLAGS_VERBOSE";

/// Resolve `$HOME`, falling back to the current user's passwd-database
/// entry when the environment variable is unset.
pub fn home_dir() -> Result<PathBuf> {
    if let Some(h) = std::env::var_os("HOME") {
        if !h.is_empty() {
            return Ok(PathBuf::from(h));
        }
    }
    #[cfg(unix)]
    {
        if let Some(user) = users::get_user_by_uid(users::get_current_uid()) {
            return Ok(PathBuf::from(user.home_dir()));
        }
    }
    Err(VaultarError::Config(
        "cannot resolve home directory: HOME unset and passwd lookup failed".into(),
    ))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(home_dir()?.join(".vaultar"))
}

/// Parse the `\0`-terminated key/value entries of a config file.
fn parse_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    // Records are `KEY=` followed by a `\0`-terminated value; this keeps
    // multi-valued keys (several `\0`-terminated strings under one KEY)
    // distinguishable from single-valued ones purely by count.
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let eq = match bytes[i..].iter().position(|&b| b == b'=') {
            Some(p) => i + p,
            None => break,
        };
        let key = String::from_utf8_lossy(&bytes[i..eq]).into_owned();
        let nul = match bytes[eq + 1..].iter().position(|&b| b == 0) {
            Some(p) => eq + 1 + p,
            None => bytes.len(),
        };
        out.push((key, bytes[eq + 1..nul].to_vec()));
        i = nul + 1;
    }
    out
}

fn write_entry(out: &mut Vec<u8>, key: &str, value: &[u8]) {
    out.extend_from_slice(key.as_bytes());
    out.push(b'=');
    out.extend_from_slice(value);
    out.push(0);
}

pub fn load(path: &Path) -> Result<Options> {
    let bytes = std::fs::read(path)?;
    let entries = parse_entries(&bytes);

    let mut opts = Options::default();
    for (key, value) in entries {
        let text = String::from_utf8_lossy(&value).into_owned();
        match key.as_str() {
            KEY_DIRECTORIES => opts.directories.push(PathBuf::from(text)),
            KEY_EXCLUDE => {
                opts.exclude.insert(PathBuf::from(text));
            }
            KEY_HASH_ALGORITHM => opts.digest_algorithm = DigestAlgorithm::parse(&text)?,
            KEY_ENC_ALGORITHM => {
                if !text.is_empty() {
                    opts.cipher = Some(CipherId::parse(&text)?);
                }
            }
            KEY_ENC_PASSWORD => {
                if !text.is_empty() {
                    let raw = hex::decode(&text)
                        .map_err(|e| VaultarError::Config(format!("bad ENC_PASSWORD hex: {e}")))?;
                    opts.password = Some(String::from_utf8_lossy(&raw).into_owned());
                }
            }
            KEY_C_TYPE => opts.compression = Compression::parse(&text)?,
            KEY_C_LEVEL => {
                opts.compression_level = text.parse::<u32>().ok();
            }
            KEY_OUTPUT_DIRECTORY => opts.output_directory = Some(PathBuf::from(text)),
            KEY_PREV_BACKUP => opts.prev_backup = Some(PathBuf::from(text)),
            KEY_FLAGS_VERBOSE => opts.verbose = text == "1",
            _ => {} // unknown/reserved keys (CO_*, FLAGS, C_FLAGS) are tolerated
        }
    }
    Ok(opts)
}

pub fn save(path: &Path, opts: &Options) -> Result<()> {
    let mut buf = Vec::new();
    for d in &opts.directories {
        write_entry(&mut buf, KEY_DIRECTORIES, d.to_string_lossy().as_bytes());
    }
    for e in &opts.exclude {
        write_entry(&mut buf, KEY_EXCLUDE, e.to_string_lossy().as_bytes());
    }
    write_entry(
        &mut buf,
        KEY_HASH_ALGORITHM,
        opts.digest_algorithm.name().as_bytes(),
    );
    if let Some(c) = opts.cipher {
        write_entry(&mut buf, KEY_ENC_ALGORITHM, c.name().as_bytes());
    }
    if let Some(pw) = &opts.password {
        write_entry(
            &mut buf,
            KEY_ENC_PASSWORD,
            hex::encode(pw.as_bytes()).as_bytes(),
        );
    }
    write_entry(
        &mut buf,
        KEY_C_TYPE,
        match opts.compression {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Bzip2 => "bzip2",
            Compression::Xz => "xz",
            Compression::Lz4 => "lz4",
        }
        .as_bytes(),
    );
    if let Some(level) = opts.compression_level {
        write_entry(&mut buf, KEY_C_LEVEL, level.to_string().as_bytes());
    }
    if let Some(dir) = &opts.output_directory {
        write_entry(
            &mut buf,
            KEY_OUTPUT_DIRECTORY,
            dir.to_string_lossy().as_bytes(),
        );
    }
    if let Some(prev) = &opts.prev_backup {
        write_entry(
            &mut buf,
            KEY_PREV_BACKUP,
            prev.to_string_lossy().as_bytes(),
        );
    }
    write_entry(
        &mut buf,
        KEY_FLAGS_VERBOSE,
        if opts.verbose { b"1" } else { b"0" },
    );

    let mut f = std::fs::File::create(path)?;
    f.write_all(&buf)?;
    Ok(())
}

/// Collapse an exclusion set into a `HashSet` for fast membership checks
/// during the walk.
pub fn exclusion_set(opts: &Options) -> HashSet<PathBuf> {
    opts.exclude.clone()
}
