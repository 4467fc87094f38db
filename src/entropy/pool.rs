// Mixing pool - incremental hash with since-drain counters

use sha2::{Digest, Sha256};

/// Width of a drained pool digest in bytes.
pub const POOL_DIGEST_LEN: usize = 32;

/// One mixing pool: an incremental SHA-256 plus counters tracking how much
/// material arrived since the pool last contributed to a seed.
pub struct Pool {
    hash: Sha256,
    bytes_since_drain: u64,
    entropy_estimate_bytes: u64,
}

impl Pool {
    pub(crate) fn new() -> Self {
        Self {
            hash: Sha256::new(),
            bytes_since_drain: 0,
            entropy_estimate_bytes: 0,
        }
    }

    /// Feed one event into the pool, framed by the source fingerprint and the
    /// data length so event boundaries survive concatenation.
    pub(crate) fn mix(&mut self, fingerprint: &[u8; 32], data: &[u8]) {
        self.hash.update(fingerprint);
        self.hash.update((data.len() as u64).to_le_bytes());
        self.hash.update(data);
        self.bytes_since_drain += data.len() as u64;
        // The estimate is the raw byte count, a conservative lower bound.
        self.entropy_estimate_bytes += data.len() as u64;
    }

    /// Finalize and reset: returns the digest and leaves the pool fresh-empty
    /// with zeroed counters.
    pub(crate) fn drain(&mut self) -> [u8; POOL_DIGEST_LEN] {
        let digest = std::mem::take(&mut self.hash).finalize();
        self.bytes_since_drain = 0;
        self.entropy_estimate_bytes = 0;
        digest.into()
    }

    pub(crate) fn bytes_since_drain(&self) -> u64 {
        self.bytes_since_drain
    }

    pub(crate) fn entropy_estimate_bytes(&self) -> u64 {
        self.entropy_estimate_bytes
    }
}
