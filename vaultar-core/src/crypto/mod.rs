//! CryptoPipe: file-level encrypt/decrypt over the
//! `Salted__`-framed wire format, built from [`keys`] (the state-machine
//! handle), [`cipher`] (streaming AES-CBC) and [`kdf`] (legacy
//! `EVP_BytesToKey`).

pub mod cipher;
pub mod kdf;
pub mod keys;
pub mod password;

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use zeroize::Zeroizing;

use crate::digest::BUF_SIZE;
use crate::error::{Result, VaultarError};
use crate::options::{CipherId, DigestAlgorithm};
use keys::{CryptoKeys, HEADER_MAGIC, SALT_LEN};

/// Streaming encrypt of `in_path` to `out_path` under the `Salted__`
/// framing. On any failure the partial
/// output is removed.
pub fn encrypt_file(
    in_path: &Path,
    out_path: &Path,
    cipher: CipherId,
    kdf_digest: DigestAlgorithm,
    kdf_iterations: u32,
    password: &mut Zeroizing<Vec<u8>>,
) -> Result<()> {
    let _guard = password::CoreDumpGuard::enter();

    let result = (|| -> Result<()> {
        let ready = CryptoKeys::new()
            .set_cipher(cipher, kdf_digest, kdf_iterations)
            .gen_salt()?
            .derive_keys(password)?;

        let mut input = File::open(in_path)?;
        let mut output = File::create(out_path)?;
        output.write_all(HEADER_MAGIC)?;
        output.write_all(&ready.salt())?;

        let mut encryptor = ready.encryptor()?;
        let mut buf = [0u8; BUF_SIZE];
        loop {
            let n = input.read(&mut buf)?;
            if n == 0 {
                break;
            }
            output.write_all(&encryptor.update(&buf[..n]))?;
        }
        output.write_all(&encryptor.finish())?;
        output.sync_all()?;
        Ok(())
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(out_path);
    }
    result
}

/// Streaming decrypt of `in_path` to `out_path`. Validates the `Salted__`
/// magic before consulting the KDF.
pub fn decrypt_file(
    in_path: &Path,
    out_path: &Path,
    cipher: CipherId,
    kdf_digest: DigestAlgorithm,
    kdf_iterations: u32,
    password: &mut Zeroizing<Vec<u8>>,
) -> Result<()> {
    let _guard = password::CoreDumpGuard::enter();

    let result = (|| -> Result<()> {
        let mut input = File::open(in_path)?;
        let mut magic = [0u8; 8];
        input.read_exact(&mut magic)?;
        if &magic != HEADER_MAGIC {
            return Err(VaultarError::Format(
                "missing Salted__ header; not a recognized encrypted archive".into(),
            ));
        }
        let mut salt = [0u8; SALT_LEN];
        input.read_exact(&mut salt)?;

        let ready = CryptoKeys::new()
            .set_cipher(cipher, kdf_digest, kdf_iterations)
            .extract_salt(salt)
            .derive_keys(password)?;

        let mut output = File::create(out_path)?;
        let mut decryptor = ready.decryptor()?;
        let mut buf = [0u8; BUF_SIZE];
        loop {
            let n = input.read(&mut buf)?;
            if n == 0 {
                break;
            }
            output.write_all(&decryptor.update(&buf[..n])?)?;
        }
        output.write_all(&decryptor.finish()?)?;
        output.sync_all()?;
        Ok(())
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(out_path);
    }
    result
}

/// Overwrites a file's bytes with CSPRNG data before unlinking it (spec
/// §GLOSSARY "Shred"; used on the decrypted prior-archive temp file per
/// §4.8 step 3).
pub fn shred_and_remove(path: &Path) -> Result<()> {
    let len = std::fs::metadata(path)?.len();
    let noise = password::random_bytes(len as usize)?;
    {
        let mut f = std::fs::OpenOptions::new().write(true).open(path)?;
        f.write_all(&noise)?;
        f.sync_all()?;
    }
    std::fs::remove_file(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;

    #[test]
    fn round_trip_encrypt_decrypt_recovers_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let plain_in = dir.path().join("plain.tar");
        let encrypted = dir.path().join("out.tar.aes-256-cbc");
        let plain_out = dir.path().join("plain.out");

        std::fs::write(&plain_in, b"this is the archive payload bytes").unwrap();

        let mut pw = Zeroizing::new(b"swordfish".to_vec());
        encrypt_file(
            &plain_in,
            &encrypted,
            CipherId::Aes256Cbc,
            DigestAlgorithm::Sha256,
            1,
            &mut pw,
        )
        .unwrap();

        let mut header = [0u8; 8];
        File::open(&encrypted)
            .unwrap()
            .read_exact(&mut header)
            .unwrap();
        assert_eq!(&header, HEADER_MAGIC);

        let mut pw2 = Zeroizing::new(b"swordfish".to_vec());
        decrypt_file(
            &encrypted,
            &plain_out,
            CipherId::Aes256Cbc,
            DigestAlgorithm::Sha256,
            1,
            &mut pw2,
        )
        .unwrap();

        let got = std::fs::read(&plain_out).unwrap();
        assert_eq!(got, b"this is the archive payload bytes");
    }

    #[test]
    fn wrong_password_does_not_recover_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let plain_in = dir.path().join("plain.tar");
        let encrypted = dir.path().join("out.tar.aes-256-cbc");
        let plain_out = dir.path().join("plain.out");

        std::fs::write(&plain_in, b"hello\n").unwrap();
        let mut pw = Zeroizing::new(b"swordfish".to_vec());
        encrypt_file(
            &plain_in,
            &encrypted,
            CipherId::Aes256Cbc,
            DigestAlgorithm::Sha256,
            1,
            &mut pw,
        )
        .unwrap();

        let mut wrong = Zeroizing::new(b"Swordfish".to_vec());
        let result = decrypt_file(
            &encrypted,
            &plain_out,
            CipherId::Aes256Cbc,
            DigestAlgorithm::Sha256,
            1,
            &mut wrong,
        );
        assert!(result.is_err());
    }

    #[test]
    fn decrypt_rejects_missing_salted_header() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("not-encrypted");
        let out = dir.path().join("out");
        std::fs::write(&bogus, b"plain old bytes, no header here").unwrap();

        let mut pw = Zeroizing::new(b"anything".to_vec());
        let result = decrypt_file(
            &bogus,
            &out,
            CipherId::Aes256Cbc,
            DigestAlgorithm::Sha256,
            1,
            &mut pw,
        );
        assert!(matches!(result, Err(VaultarError::Format(_))));
    }
}
