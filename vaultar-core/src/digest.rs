//! Per-file content digesting.
//!
//! The digest algorithm is selected at run time (`DigestAlgorithm`), so the
//! hasher is boxed behind `digest::DynDigest` rather than monomorphized —
//! there is exactly one choice per run, fixed by `Options`, but the choice
//! itself isn't known until runtime. `HashingReader` is a transparent
//! `Read` wrapper that folds every byte read into a hasher as it streams
//! through.

use std::io::{self, Read};

use digest::DynDigest;
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::options::DigestAlgorithm;

/// 64 KiB streaming chunk size.
pub const BUF_SIZE: usize = 64 * 1024;

fn new_hasher(algo: DigestAlgorithm) -> Box<dyn DynDigest> {
    match algo {
        DigestAlgorithm::Md5 => Box::new(Md5::default()),
        DigestAlgorithm::Sha1 => Box::new(Sha1::default()),
        DigestAlgorithm::Sha256 => Box::new(Sha256::default()),
        DigestAlgorithm::Sha512 => Box::new(Sha512::default()),
    }
}

/// A `Read` adapter that feeds every byte passing through it into a
/// `DynDigest`, so a single streaming pass over a file can both hash it and
/// forward it to its eventual destination (the archive).
pub struct HashingReader<R> {
    inner: R,
    hasher: Box<dyn DynDigest>,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R, algo: DigestAlgorithm) -> Self {
        Self {
            inner,
            hasher: new_hasher(algo),
        }
    }

    /// Consume the reader, returning the lowercase hex digest of everything
    /// read through it.
    pub fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.hasher.update(&buf[..n]);
        }
        Ok(n)
    }
}

/// Digest a file's content in full, independent of archiving, for use by
/// the change detector. Reads in `BUF_SIZE` chunks so
/// memory use is bounded regardless of file size.
pub fn digest_file(path: &std::path::Path, algo: DigestAlgorithm) -> io::Result<String> {
    let file = std::fs::File::open(path)?;
    let mut reader = HashingReader::new(file, algo);
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
    }
    Ok(reader.finalize_hex())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn hashing_reader_matches_direct_sha256() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"the quick brown fox").unwrap();
        let got = digest_file(tmp.path(), DigestAlgorithm::Sha256).unwrap();

        let mut direct = Sha256::default();
        digest::Digest::update(&mut direct, b"the quick brown fox");
        let want = hex::encode(digest::Digest::finalize(direct));

        assert_eq!(got, want);
    }

    #[test]
    fn different_algorithms_disagree() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"data").unwrap();
        let sha256 = digest_file(tmp.path(), DigestAlgorithm::Sha256).unwrap();
        let md5 = digest_file(tmp.path(), DigestAlgorithm::Md5).unwrap();
        assert_ne!(sha256, md5);
    }

    #[test]
    fn empty_file_has_stable_digest() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let a = digest_file(tmp.path(), DigestAlgorithm::Sha1).unwrap();
        let b = digest_file(tmp.path(), DigestAlgorithm::Sha1).unwrap();
        assert_eq!(a, b);
    }
}
