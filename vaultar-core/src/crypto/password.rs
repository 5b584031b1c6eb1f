//! Password hygiene primitives: CSPRNG-backed randomness, buffer
//! scrubbing, and reference-counted core-dump suppression while key
//! material is live.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{Result, VaultarError};

/// CSPRNG chain: `OsRng` first, `/dev/urandom` on failure, then a hard
/// error — this crate never falls back to a non-cryptographic generator
/// for key or salt material.
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    if OsRng.try_fill_bytes(&mut buf).is_ok() {
        return Ok(buf);
    }
    #[cfg(unix)]
    {
        use std::io::Read;
        if let Ok(mut f) = std::fs::File::open("/dev/urandom") {
            if f.read_exact(&mut buf).is_ok() {
                return Ok(buf);
            }
        }
    }
    Err(VaultarError::Crypto(
        "CSPRNG exhausted: OsRng and /dev/urandom both failed".into(),
    ))
}

/// A process-local, non-cryptographic counter used only to pick the
/// randomized tail length in [`scrub_randomized_length`] — a
/// length-obfuscation detail, not security-sensitive material, so a fast
/// xorshift-style counter is preferable to spending a CSPRNG call on it.
static TAIL_COUNTER: AtomicU64 = AtomicU64::new(0x9e3779b97f4a7c15);

fn pseudo_random_small(modulus: usize) -> usize {
    let mut x = TAIL_COUNTER.load(Ordering::Relaxed);
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    TAIL_COUNTER.store(x, Ordering::Relaxed);
    (x as usize) % modulus.max(1)
}

/// Overwrites `password` with CSPRNG bytes over a length equal to
/// `strlen(pw) + 5 + rand() % 11` — the randomized
/// tail prevents a memory-residue observer from recovering the original
/// password's exact length.
pub fn scrub_randomized_length(password: &mut Zeroizing<Vec<u8>>) {
    let extra = 5 + pseudo_random_small(11);
    let new_len = password.len() + extra;
    let noise = random_bytes(new_len).unwrap_or_else(|_| vec![0u8; new_len]);
    password.resize(new_len, 0);
    password.copy_from_slice(&noise);
}

/// Overwrites a zeroizable buffer with CSPRNG bytes before its `Zeroizing`
/// wrapper drops it (belt-and-suspenders alongside the wrapper's own
/// zero-on-drop.
pub fn scrub_in_place(buf: &mut Zeroizing<Vec<u8>>) {
    if let Ok(noise) = random_bytes(buf.len()) {
        buf.copy_from_slice(&noise);
    }
}

static CORE_DUMP_GUARD_DEPTH: AtomicUsize = AtomicUsize::new(0);

/// Disables core dumps for the lifetime of the guard, reference-counted so
/// nested guards don't stomp on each other. The first guard to enter saves
/// the prior `RLIMIT_CORE` and zeroes it; the last guard to drop restores
/// it. Nested guards only bump/decrement the depth counter.
pub struct CoreDumpGuard {
    prior: Option<(u64, u64)>,
}

impl CoreDumpGuard {
    pub fn enter() -> Self {
        let depth = CORE_DUMP_GUARD_DEPTH.fetch_add(1, Ordering::SeqCst);
        if depth != 0 {
            return Self { prior: None };
        }
        #[cfg(unix)]
        {
            match rlimit::Resource::CORE.get() {
                Ok((soft, hard)) => {
                    if rlimit::Resource::CORE.set(0, hard).is_ok() {
                        return Self {
                            prior: Some((soft, hard)),
                        };
                    }
                    tracing::warn!("failed to set RLIMIT_CORE to 0; core dumps remain enabled");
                }
                Err(err) => {
                    tracing::warn!(%err, "failed to read RLIMIT_CORE; core dumps remain enabled");
                }
            }
        }
        Self { prior: None }
    }
}

impl Drop for CoreDumpGuard {
    fn drop(&mut self) {
        let depth = CORE_DUMP_GUARD_DEPTH.fetch_sub(1, Ordering::SeqCst);
        if depth != 1 {
            return;
        }
        #[cfg(unix)]
        {
            if let Some((soft, hard)) = self.prior {
                if let Err(err) = rlimit::Resource::CORE.set(soft, hard) {
                    tracing::warn!(%err, "failed to restore RLIMIT_CORE");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_bytes_are_not_all_zero_and_have_requested_length() {
        let buf = random_bytes(32).unwrap();
        assert_eq!(buf.len(), 32);
        assert!(buf.iter().any(|&b| b != 0));
    }

    #[test]
    fn scrub_randomized_length_changes_the_buffer_and_its_length() {
        let mut pw = Zeroizing::new(b"hunter2".to_vec());
        let original = pw.clone();
        let original_len = pw.len();
        scrub_randomized_length(&mut pw);
        assert_ne!(*pw, *original);
        assert!(pw.len() >= original_len + 5);
        assert!(pw.len() <= original_len + 15);
    }

    #[test]
    fn core_dump_guard_nests_without_restoring_early() {
        let outer = CoreDumpGuard::enter();
        {
            let _inner = CoreDumpGuard::enter();
        }
        drop(outer);
    }
}
