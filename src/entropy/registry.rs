// Source registry - concurrent set of registered sources with snapshot
// iteration
//
// The scheduler iterates over a snapshot, so the registry lock is never held
// across a poll. Sources may be added at any time, including while a polling
// cycle is in flight; they join the next snapshot.

use crate::entropy::sources::{EntropySource, SourceFingerprint};
use crate::Priority;
use anyhow::Result;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// A source plus the bookkeeping the scheduler needs: its fingerprint, the
/// release-exactly-once flag, and the consecutive-failure tally behind
/// demotion.
pub struct RegisteredSource {
    fingerprint: SourceFingerprint,
    source: Box<dyn EntropySource>,
    released: AtomicBool,
    consecutive_failures: AtomicU32,
    demoted: AtomicBool,
}

impl RegisteredSource {
    fn new(source: Box<dyn EntropySource>) -> Self {
        let fingerprint = SourceFingerprint::derive(source.kind(), source.name());
        Self {
            fingerprint,
            source,
            released: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
            demoted: AtomicBool::new(false),
        }
    }

    pub fn fingerprint(&self) -> SourceFingerprint {
        self.fingerprint
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }

    /// Poll the underlying source. A released source has nothing to give.
    pub fn get_entropy(&self, priority: Priority) -> Result<Option<Vec<u8>>> {
        if self.released.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.source.get_entropy(priority)
    }

    /// Whether the source has been demoted for persistent faulting.
    pub fn is_demoted(&self) -> bool {
        self.demoted.load(Ordering::SeqCst)
    }

    /// Record a failed poll. Returns true when this failure crossed the
    /// demotion limit.
    pub(crate) fn record_failure(&self, limit: Option<u32>) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        match limit {
            Some(limit) if failures >= limit => !self.demoted.swap(true, Ordering::SeqCst),
            _ => false,
        }
    }

    /// A successful poll clears the tally.
    pub(crate) fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    /// Invoke the source's release hook, exactly once.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.source.release();
        }
    }
}

/// Thread-safe set of entropy sources.
pub struct SourceRegistry {
    sources: Mutex<Vec<Arc<RegisteredSource>>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Mutex::new(Vec::new()),
        }
    }

    /// Insert a source. Permitted at any time, including after polling has
    /// begun.
    pub fn add(&self, source: Box<dyn EntropySource>) -> SourceFingerprint {
        let registered = Arc::new(RegisteredSource::new(source));
        let fingerprint = registered.fingerprint();
        self.sources.lock().unwrap().push(registered);
        fingerprint
    }

    /// Shallow clone of the current membership; the lock is released before
    /// the caller touches any source.
    pub fn snapshot(&self) -> Vec<Arc<RegisteredSource>> {
        self.sources.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.sources.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release every source. Safe to call repeatedly; each hook fires once.
    pub fn release_all(&self) {
        for source in self.snapshot() {
            source.release();
        }
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SourceRegistry {
    fn drop(&mut self) {
        self.release_all();
    }
}
