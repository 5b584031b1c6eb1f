//! `CryptoKeys` state machine: each state is its own type, each transition
//! consumes `self` by value and returns the next type, so an out-of-order
//! call (e.g. `encrypt` before `derive_keys`) is a compile error rather
//! than a runtime `CryptoStateError` — except `derive_keys` and
//! `gen_salt` themselves, which draw from the CSPRNG chain and so can
//! fail at run time.

use zeroize::Zeroizing;

use crate::crypto::cipher::{StreamDecryptor, StreamEncryptor};
use crate::crypto::kdf::evp_bytes_to_key;
use crate::error::{Result, VaultarError};
use crate::options::{CipherId, DigestAlgorithm};

pub const SALT_LEN: usize = 8;
pub const HEADER_MAGIC: &[u8; 8] = b"Salted__";

pub struct New;

pub struct CipherSet {
    cipher: CipherId,
    kdf_digest: DigestAlgorithm,
    kdf_iterations: u32,
}

pub struct Salted {
    cipher: CipherId,
    kdf_digest: DigestAlgorithm,
    kdf_iterations: u32,
    salt: [u8; SALT_LEN],
}

pub struct Ready {
    cipher: CipherId,
    key: Zeroizing<Vec<u8>>,
    iv: Zeroizing<Vec<u8>>,
    salt: [u8; SALT_LEN],
}

pub struct Terminal;

impl CryptoKeys {
    pub fn new() -> Handle<New> {
        Handle { state: New }
    }
}

/// Marker type; all real state lives in `Handle<S>`'s `S`.
pub struct CryptoKeys;

/// A `CryptoKeys` handle currently in state `S`.
pub struct Handle<S> {
    state: S,
}

impl Handle<New> {
    pub fn set_cipher(
        self,
        cipher: CipherId,
        kdf_digest: DigestAlgorithm,
        kdf_iterations: u32,
    ) -> Handle<CipherSet> {
        Handle {
            state: CipherSet {
                cipher,
                kdf_digest,
                kdf_iterations,
            },
        }
    }
}

impl Handle<CipherSet> {
    /// Generates a fresh random salt via the CSPRNG chain, for the
    /// encrypt-side path.
    pub fn gen_salt(self) -> Result<Handle<Salted>> {
        let bytes = crate::crypto::password::random_bytes(SALT_LEN)?;
        let salt: [u8; SALT_LEN] = bytes
            .try_into()
            .expect("random_bytes(SALT_LEN) returns exactly SALT_LEN bytes");
        Ok(Handle {
            state: Salted {
                cipher: self.state.cipher,
                kdf_digest: self.state.kdf_digest,
                kdf_iterations: self.state.kdf_iterations,
                salt,
            },
        })
    }

    /// Reads a salt out of an already-framed header, for the decrypt-side
    /// path.
    pub fn extract_salt(self, salt: [u8; SALT_LEN]) -> Handle<Salted> {
        Handle {
            state: Salted {
                cipher: self.state.cipher,
                kdf_digest: self.state.kdf_digest,
                kdf_iterations: self.state.kdf_iterations,
                salt,
            },
        }
    }
}

impl Handle<Salted> {
    /// The one fallible transition: runs the KDF over the password. Scrubs
    /// the password buffer's randomized-length overwrite regardless of
    /// outcome.
    pub fn derive_keys(self, password: &mut Zeroizing<Vec<u8>>) -> Result<Handle<Ready>> {
        let (key_len, iv_len) = self.state.cipher.key_iv_len();
        let derived = evp_bytes_to_key(
            password,
            &self.state.salt,
            self.state.kdf_digest,
            self.state.kdf_iterations,
            key_len + iv_len,
        );
        crate::crypto::password::scrub_randomized_length(password);

        if derived.len() != key_len + iv_len {
            return Err(VaultarError::CryptoState(
                "KDF produced wrong output length".into(),
            ));
        }
        let key = Zeroizing::new(derived[..key_len].to_vec());
        let iv = Zeroizing::new(derived[key_len..].to_vec());
        Ok(Handle {
            state: Ready {
                cipher: self.state.cipher,
                key,
                iv,
                salt: self.state.salt,
            },
        })
    }
}

impl Handle<Ready> {
    pub fn salt(&self) -> [u8; SALT_LEN] {
        self.state.salt
    }

    pub fn encryptor(&self) -> Result<StreamEncryptor> {
        StreamEncryptor::new(self.state.cipher, &self.state.key, &self.state.iv)
    }

    pub fn decryptor(&self) -> Result<StreamDecryptor> {
        StreamDecryptor::new(self.state.cipher, &self.state.key, &self.state.iv)
    }

    /// Scrubs key and IV (via `Zeroizing`'s drop glue, reinforced by an
    /// explicit overwrite here so the scrub isn't solely dependent on drop
    /// order) and transitions to `Terminal`.
    pub fn scrub(mut self) -> Handle<Terminal> {
        crate::crypto::password::scrub_in_place(&mut self.state.key);
        crate::crypto::password::scrub_in_place(&mut self.state.iv);
        Handle { state: Terminal }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_ready_keys_and_round_trips_through_cipher() {
        let handle = CryptoKeys::new()
            .set_cipher(CipherId::Aes256Cbc, DigestAlgorithm::Sha256, 1)
            .gen_salt()
            .unwrap();
        let salt = handle.salt();
        let mut password = Zeroizing::new(b"swordfish".to_vec());
        let ready = handle.derive_keys(&mut password).unwrap();

        let mut enc = ready.encryptor().unwrap();
        let mut ct = enc.update(b"hello world");
        ct.extend(enc.finish());

        let dec = ready.decryptor().unwrap();
        let mut dec = dec;
        let mut pt = dec.update(&ct).unwrap();
        pt.extend(dec.finish().unwrap());
        assert_eq!(pt, b"hello world");

        let _terminal = ready.scrub();
        assert_eq!(salt.len(), SALT_LEN);
    }

    #[test]
    fn extract_salt_reproduces_decrypt_side_keys() {
        let salt = [7u8; SALT_LEN];
        let mut pw1 = Zeroizing::new(b"hunter2".to_vec());
        let ready1 = CryptoKeys::new()
            .set_cipher(CipherId::Aes128Cbc, DigestAlgorithm::Sha256, 1)
            .extract_salt(salt)
            .derive_keys(&mut pw1)
            .unwrap();

        let mut pw2 = Zeroizing::new(b"hunter2".to_vec());
        let ready2 = CryptoKeys::new()
            .set_cipher(CipherId::Aes128Cbc, DigestAlgorithm::Sha256, 1)
            .extract_salt(salt)
            .derive_keys(&mut pw2)
            .unwrap();

        assert_eq!(ready1.salt(), ready2.salt());
    }
}
