// Cipher PRNG - deterministic AES-256-CTR keystream generator
//
// The generator serves bytes from a counter-mode stream and replaces its own
// key with further stream output after every request, so the key held at any
// moment cannot reproduce bytes that were already handed out. Reseeding mixes
// new material into the key through SHA-256 and bumps the counter.

use crate::{RngError, RngResult};
use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::Zeroize;

type Aes256Ctr = Ctr128BE<Aes256>;

/// Cipher key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Hard cap on a single `generate` request. Long runs of keystream under one
/// key become statistically distinguishable; the cap forces a rekey first.
pub const MAX_REQUEST_BYTES: usize = 1 << 20;

const BLOCK_LEN: usize = 16;

/// Reseedable counter-mode PRNG with rekey-after-read.
pub struct CipherRng {
    key: [u8; KEY_LEN],
    counter: u128,
    seeded: bool,
}

impl CipherRng {
    /// Null-key instance. Refuses to generate until the first [`reseed`].
    ///
    /// [`reseed`]: CipherRng::reseed
    pub fn new_unseeded() -> Self {
        Self {
            key: [0u8; KEY_LEN],
            counter: 0,
            seeded: false,
        }
    }

    /// Instance keyed from readily-available low-grade material (thread RNG
    /// plus the wall clock). Generates immediately; meant for internal needs
    /// like shuffling, not for serving callers.
    pub fn with_cheap_key() -> Self {
        let mut material = [0u8; KEY_LEN + 16];
        rand::thread_rng().fill_bytes(&mut material[..KEY_LEN]);
        if let Ok(now) = SystemTime::now().duration_since(UNIX_EPOCH) {
            material[KEY_LEN..].copy_from_slice(&now.as_nanos().to_le_bytes());
        }

        let mut rng = Self::new_unseeded();
        rng.reseed(&material);
        material.zeroize();
        rng
    }

    /// Instance keyed with caller-provided material. Generates immediately.
    pub fn from_key(key: [u8; KEY_LEN]) -> Self {
        Self {
            key,
            counter: 0,
            seeded: true,
        }
    }

    /// Fill `dest` with keystream output, then rekey.
    ///
    /// Fails with [`RngError::Uninitialised`] on a null-key instance that has
    /// never been reseeded, and with [`RngError::RequestTooLarge`] when `dest`
    /// exceeds [`MAX_REQUEST_BYTES`].
    pub fn generate(&mut self, dest: &mut [u8]) -> RngResult<()> {
        if !self.seeded {
            return Err(RngError::Uninitialised);
        }
        if dest.len() > MAX_REQUEST_BYTES {
            return Err(RngError::RequestTooLarge {
                requested: dest.len(),
                limit: MAX_REQUEST_BYTES,
            });
        }

        let mut cipher = Aes256Ctr::new(&self.key.into(), &self.counter.to_be_bytes().into());
        dest.fill(0);
        cipher.apply_keystream(dest);

        // Rekey from the tail of the same stream before returning.
        let mut next_key = [0u8; KEY_LEN];
        cipher.apply_keystream(&mut next_key);
        self.key.zeroize();
        self.key = next_key;
        next_key.zeroize();

        let consumed = dest.len() + KEY_LEN;
        self.counter = self.counter.wrapping_add(consumed.div_ceil(BLOCK_LEN) as u128);
        Ok(())
    }

    /// Mix `material` into the key: `key <- SHA-256(key || material)`.
    ///
    /// Advances the counter so the fresh key never revisits a block number
    /// already used under an earlier key. Empty material is a no-op.
    pub fn reseed(&mut self, material: &[u8]) {
        if material.is_empty() {
            return;
        }

        let mut hasher = Sha256::new();
        hasher.update(self.key);
        hasher.update(material);
        let digest = hasher.finalize();

        self.key.zeroize();
        self.key.copy_from_slice(&digest);
        self.counter = self.counter.wrapping_add(1);
        self.seeded = true;
    }

    /// Per-request byte cap for [`generate`].
    ///
    /// [`generate`]: CipherRng::generate
    pub fn max_request_bytes(&self) -> usize {
        MAX_REQUEST_BYTES
    }

    /// Whether the instance has ever been keyed.
    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    #[cfg(test)]
    pub(crate) fn counter(&self) -> u128 {
        self.counter
    }

    /// SHA-256 of the current key, for state-change assertions in tests.
    #[cfg(test)]
    pub(crate) fn key_fingerprint(&self) -> [u8; 32] {
        Sha256::digest(self.key).into()
    }
}

impl Drop for CipherRng {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}
