// Entropy accumulator - bank of 32 mixing pools with power-of-two drain
// selection
//
// Incoming events are routed round-robin across the pools. Draining follows
// the pooled-generator selection rule: reseed event k drains pool i iff 2^i
// divides k, so high-numbered pools accumulate unobserved material for
// exponentially long stretches. An adversary feeding some of the sources must
// stay in control across 2^i reseeds before it can touch pool i's
// contribution.

use crate::entropy::pool::{Pool, POOL_DIGEST_LEN};
use crate::entropy::sources::SourceFingerprint;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Number of mixing pools.
pub const POOL_COUNT: usize = 32;

/// One harvested measurement: opaque bytes plus the stable identity of the
/// source that produced them. The data is wiped when the event drops.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct EntropyEvent {
    #[zeroize(skip)]
    source: SourceFingerprint,
    data: Vec<u8>,
}

impl EntropyEvent {
    pub fn new(source: SourceFingerprint, data: Vec<u8>) -> Self {
        Self { source, data }
    }

    pub fn source(&self) -> &SourceFingerprint {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The pool bank and its reseed sequence number.
pub struct Accumulator {
    pools: [Pool; POOL_COUNT],
    total_reseed_events: u128,
    next_pool_for_event: u32,
}

impl Accumulator {
    pub fn new() -> Self {
        Self {
            pools: std::array::from_fn(|_| Pool::new()),
            total_reseed_events: 0,
            next_pool_for_event: 0,
        }
    }

    /// Mix one event into the pool under the round-robin cursor and advance
    /// the cursor. Never fails.
    pub fn add(&mut self, event: EntropyEvent) {
        self.pools[self.next_pool_for_event as usize].mix(event.source().as_bytes(), &event.data);
        self.next_pool_for_event = (self.next_pool_for_event + 1) % POOL_COUNT as u32;
    }

    /// Advance the reseed sequence to `k` and return the concatenated digests
    /// of every pool `i` with `2^i | k`. Included pools end fresh-empty with
    /// zeroed counters; excluded pools are untouched.
    pub fn next_seed(&mut self) -> Zeroizing<Vec<u8>> {
        self.total_reseed_events += 1;
        let k = self.total_reseed_events;

        // 2^i | k for exactly i <= trailing_zeros(k)
        let highest = (k.trailing_zeros() as usize).min(POOL_COUNT - 1);
        let mut seed = Zeroizing::new(Vec::with_capacity((highest + 1) * POOL_DIGEST_LEN));
        for pool in &mut self.pools[..=highest] {
            seed.extend_from_slice(&pool.drain());
        }
        seed
    }

    /// Monotone reseed sequence number; `next_seed` has run this many times.
    pub fn reseed_event_count(&self) -> u128 {
        self.total_reseed_events
    }

    /// Round-robin cursor position the next event will land on.
    pub fn next_pool_for_event(&self) -> u32 {
        self.next_pool_for_event
    }

    /// Bytes pool zero has accumulated since it last contributed to a seed.
    pub fn pool_zero_entropy_bytes(&self) -> u64 {
        self.pools[0].entropy_estimate_bytes()
    }

    /// Smallest since-drain estimate across the whole bank.
    pub fn min_pool_entropy_bytes(&self) -> u64 {
        self.pools
            .iter()
            .map(Pool::entropy_estimate_bytes)
            .min()
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn pool_bytes_since_drain(&self, index: usize) -> u64 {
        self.pools[index].bytes_since_drain()
    }
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::new()
    }
}
