//! Pooled entropy accumulation with a cipher-based PRNG and scheduled
//! reseeding.
//!
//! A [`PooledGenerator`] runs a background worker that harvests bytes from a
//! set of distrusted [`EntropySource`]s, spreads them round-robin across a
//! bank of 32 mixing pools, and reseeds an AES-256-CTR generator whenever the
//! active priority regime says enough fresh material has arrived. Callers read
//! output through [`PooledGenerator::fill`]; the generator rekeys itself after
//! every read so captured state never reveals past output.

pub mod cipher;
pub mod entropy;
pub mod generator;
pub mod persist;

// Re-export the main facade and the contracts callers implement or consume
pub use cipher::CipherRng;
pub use entropy::{Accumulator, EntropyEvent, EntropySource, SourceFingerprint, SourceRegistry};
pub use generator::PooledGenerator;
pub use persist::PersistentItem;

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the generator facade and the cipher PRNG.
///
/// Source failures never appear here: a misbehaving source is skipped for the
/// cycle (and optionally demoted), not reported to readers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RngError {
    #[error("generator has not been seeded yet")]
    Uninitialised,

    #[error("requested {requested} bytes, per-request cap is {limit} bytes")]
    RequestTooLarge { requested: usize, limit: usize },

    #[error("operation cancelled by shutdown")]
    Cancelled,

    #[error("generator has been disposed")]
    Disposed,
}

pub type RngResult<T> = Result<T, RngError>;

/// Aggressiveness regime driving poll frequency and reseed thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Priority {
    /// Not yet adequately seeded. Poll continuously and reseed as soon as
    /// pool zero alone has anything worth keying.
    High = 0,
    /// Steady state after the first reseed.
    Normal = 1,
    /// Background trickle for callers that rarely read.
    Low = 2,
}

impl Priority {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Priority::High,
            2 => Priority::Low,
            _ => Priority::Normal,
        }
    }
}

/// Tunables for the scheduler and the reseed policy.
///
/// The defaults reproduce the classic pooled-generator schedule; tests shrink
/// the cycle waits to keep wall-clock time down.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Pool-zero bytes required before reseeding at [`Priority::High`].
    pub high_reseed_bytes: u64,
    /// Minimum bytes across every pool before reseeding at [`Priority::Normal`].
    pub normal_reseed_bytes: u64,
    /// Minimum bytes across every pool before reseeding at [`Priority::Low`].
    pub low_reseed_bytes: u64,

    /// Sleep between polling cycles at [`Priority::High`].
    pub high_cycle_wait: Duration,
    /// Sleep between polling cycles at [`Priority::Normal`].
    pub normal_cycle_wait: Duration,
    /// Sleep between polling cycles at [`Priority::Low`].
    pub low_cycle_wait: Duration,
    /// Wait before re-checking an empty source registry.
    pub empty_registry_wait: Duration,

    /// Minimum spacing between successful reseeds. `None` leaves the spacing
    /// unbounded; 100ms is the classic choice when enforcement is wanted.
    pub min_reseed_interval: Option<Duration>,

    /// Sources polled concurrently per cycle. `1` polls sequentially on the
    /// worker; larger values poll in chunks of this size, adding results in
    /// shuffled order once each chunk completes.
    pub poll_concurrency: usize,

    /// Consecutive failures after which a source is demoted and no longer
    /// polled. `None` never demotes.
    pub max_source_failures: Option<u32>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            high_reseed_bytes: 48,
            normal_reseed_bytes: 96,
            low_reseed_bytes: 256,
            high_cycle_wait: Duration::from_millis(1),
            normal_cycle_wait: Duration::from_secs(5),
            low_cycle_wait: Duration::from_secs(30),
            empty_registry_wait: Duration::from_millis(100),
            min_reseed_interval: None,
            poll_concurrency: 1,
            max_source_failures: None,
        }
    }
}
