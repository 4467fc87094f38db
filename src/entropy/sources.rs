// Entropy source contract and the built-in local sources

use crate::Priority;
use anyhow::{anyhow, Result};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use std::time::Instant;

/// Contract for a pollable entropy source.
///
/// Sources are distrusted: they may be slow, return nothing, or raise, and
/// the scheduler tolerates all three. Implementations that need mutable state
/// use interior mutability; polls arrive from the worker at arbitrary times.
pub trait EntropySource: Send + Sync {
    /// Stable type tag, combined with [`name`](EntropySource::name) to derive
    /// the fingerprint.
    fn kind(&self) -> &'static str;

    /// Instance name, stable for the process lifetime.
    fn name(&self) -> &str;

    /// Produce fresh bytes, or `None` when there is nothing new this cycle.
    /// May perform I/O of arbitrary latency.
    fn get_entropy(&self, priority: Priority) -> Result<Option<Vec<u8>>>;

    /// Release any held resources. Invoked at most once by the registry.
    fn release(&self) {}
}

/// Stable identity of a source: SHA-256 over its kind and instance name.
/// Mixed into the pool alongside every event the source produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceFingerprint([u8; 32]);

impl SourceFingerprint {
    pub fn derive(kind: &str, name: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_bytes());
        hasher.update([0x1f]);
        hasher.update(name.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// The OS cryptographic RNG as a pollable source. Always available.
pub struct OsRandomSource {
    rng: SystemRandom,
}

impl Default for OsRandomSource {
    fn default() -> Self {
        Self::new()
    }
}

impl OsRandomSource {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }
}

impl EntropySource for OsRandomSource {
    fn kind(&self) -> &'static str {
        "os-random"
    }

    fn name(&self) -> &str {
        "os-random"
    }

    fn get_entropy(&self, _priority: Priority) -> Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; 32];
        self.rng
            .fill(&mut buf)
            .map_err(|_| anyhow!("OS random read failed"))?;
        Ok(Some(buf))
    }
}

/// CPU timing jitter whitened through SHA-256. Low quality but always
/// available, and independent of the OS RNG.
pub struct TimerJitterSource {
    last_sample: Mutex<u64>,
}

impl Default for TimerJitterSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerJitterSource {
    pub fn new() -> Self {
        Self {
            last_sample: Mutex::new(0),
        }
    }
}

impl EntropySource for TimerJitterSource {
    fn kind(&self) -> &'static str {
        "timer-jitter"
    }

    fn name(&self) -> &str {
        "timer-jitter"
    }

    fn get_entropy(&self, priority: Priority) -> Result<Option<Vec<u8>>> {
        let rounds = match priority {
            Priority::High => 128,
            Priority::Normal | Priority::Low => 64,
        };

        let mut raw = Vec::with_capacity(rounds * 8);
        for _ in 0..rounds {
            let start = Instant::now();

            // Tight spin of data-dependent work to magnify timing variation
            let mut x = 1u64;
            for i in 1..64 {
                x = x.wrapping_mul(i).wrapping_add(i);
                std::hint::black_box(&x);
            }

            let elapsed = start.elapsed().as_nanos() as u64;
            let mut last = self.last_sample.lock().unwrap();
            let diff = elapsed ^ (*last).rotate_left(17);
            *last = elapsed;
            drop(last);

            raw.extend_from_slice(&diff.to_le_bytes());
        }

        Ok(Some(Sha256::digest(&raw).to_vec()))
    }
}
