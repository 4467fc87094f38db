// Generator facade - public entry point owning the accumulator, the cipher
// PRNG, the source registry, and the worker task

mod scheduler;


use crate::cipher::CipherRng;
use crate::entropy::{
    Accumulator, EntropyEvent, EntropySource, OsRandomSource, SourceFingerprint, SourceRegistry,
    TimerJitterSource, POOL_COUNT,
};
use crate::persist::{self, PersistentItem, StateFileError};
use crate::{GeneratorConfig, Priority, RngError, RngResult};
use sha2::{Digest, Sha256};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use uuid::Uuid;

const STATE_NAMESPACE: &str = "generator";
const STATE_KEY_ID: &str = "id";
const STATE_KEY_CARRYOVER: &str = "carryover.seed";
const CARRYOVER_LEN: usize = 64;

type ReseedListener = Arc<dyn Fn(u64) + Send + Sync>;

/// State shared between the facade and the worker task.
pub(crate) struct Shared {
    config: GeneratorConfig,
    prng: Mutex<CipherRng>,
    accumulator: Mutex<Accumulator>,
    registry: SourceRegistry,
    priority: AtomicU8,
    reseed_count: AtomicU64,
    bytes_requested: AtomicU64,
    wake: Notify,
    stop: watch::Sender<bool>,
    reseed_signal: watch::Sender<u64>,
    last_reseed: Mutex<Option<Instant>>,
    listeners: Mutex<Vec<ReseedListener>>,
}

impl Shared {
    fn priority(&self) -> Priority {
        Priority::from_u8(self.priority.load(Ordering::SeqCst))
    }

    fn set_priority(&self, priority: Priority) {
        self.priority.store(priority as u8, Ordering::SeqCst);
    }

    fn reseed_count(&self) -> u64 {
        self.reseed_count.load(Ordering::SeqCst)
    }

    fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }

    fn request_stop(&self) {
        // send_modify updates the value even when nobody is subscribed yet
        self.stop.send_modify(|stopped| *stopped = true);
        self.wake.notify_waiters();
    }

    fn subscribe_stop(&self) -> watch::Receiver<bool> {
        self.stop.subscribe()
    }

    fn subscribe_reseeds(&self) -> watch::Receiver<u64> {
        self.reseed_signal.subscribe()
    }

    /// Reseed predicate for the current priority regime.
    fn should_reseed(&self) -> bool {
        if self.stop_requested() {
            return false;
        }
        if let Some(min_interval) = self.config.min_reseed_interval {
            if let Some(last) = *self.last_reseed.lock().unwrap() {
                if last.elapsed() < min_interval {
                    return false;
                }
            }
        }

        let accumulator = self.accumulator.lock().unwrap();
        match self.priority() {
            // Get something keyed in as fast as possible: pool zero alone
            Priority::High => accumulator.pool_zero_entropy_bytes() > self.config.high_reseed_bytes,
            // Every pool must have fresh material, which also bounds how
            // often the high-numbered pools are drained
            Priority::Normal => {
                accumulator.min_pool_entropy_bytes() > self.config.normal_reseed_bytes
            }
            Priority::Low => accumulator.min_pool_entropy_bytes() > self.config.low_reseed_bytes,
        }
    }

    /// Drain the selected pools into the PRNG key and publish the new count.
    fn perform_reseed(&self) {
        {
            // The only place both locks are held, in accumulator -> PRNG order.
            let mut accumulator = self.accumulator.lock().unwrap();
            let seed = accumulator.next_seed();
            let mut prng = self.prng.lock().unwrap();
            prng.reseed(&seed);
        } // seed buffer zeroized here on every path, locks released

        let count = self.reseed_count.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_reseed.lock().unwrap() = Some(Instant::now());

        // A successful reseed ends the high-priority regime
        let _ = self.priority.compare_exchange(
            Priority::High as u8,
            Priority::Normal as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );

        self.reseed_signal.send_modify(|latest| *latest = count);

        let listeners: Vec<ReseedListener> = self.listeners.lock().unwrap().clone();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(count))).is_err() {
                tracing::warn!(reseed = count, "reseed listener panicked");
            }
        }

        tracing::info!(reseed = count, "reseeded cipher PRNG");
    }
}

/// Pooled CPRNG: harvests distrusted sources into 32 mixing pools on a
/// background worker and serves AES-256-CTR output once the first reseed has
/// landed.
pub struct PooledGenerator {
    shared: Arc<Shared>,
    unique_id: Uuid,
    worker: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl Default for PooledGenerator {
    fn default() -> Self {
        Self::new(GeneratorConfig::default())
    }
}

impl PooledGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        let (stop, _) = watch::channel(false);
        let (reseed_signal, _) = watch::channel(0u64);
        Self {
            shared: Arc::new(Shared {
                config,
                prng: Mutex::new(CipherRng::new_unseeded()),
                accumulator: Mutex::new(Accumulator::new()),
                registry: SourceRegistry::new(),
                priority: AtomicU8::new(Priority::High as u8),
                reseed_count: AtomicU64::new(0),
                bytes_requested: AtomicU64::new(0),
                wake: Notify::new(),
                stop,
                reseed_signal,
                last_reseed: Mutex::new(None),
                listeners: Mutex::new(Vec::new()),
            }),
            unique_id: Uuid::new_v4(),
            worker: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn with_sources(
        config: GeneratorConfig,
        sources: Vec<Box<dyn EntropySource>>,
    ) -> Self {
        let generator = Self::new(config);
        for source in sources {
            generator.shared.registry.add(source);
        }
        generator
    }

    /// Generator pre-populated with the built-in local sources.
    pub fn with_local_sources(config: GeneratorConfig) -> Self {
        Self::with_sources(
            config,
            vec![
                Box::new(OsRandomSource::new()),
                Box::new(TimerJitterSource::new()),
            ],
        )
    }

    /// Launch the worker task on the current tokio runtime and return
    /// immediately. A second call is a no-op; a stopped worker is not
    /// restarted.
    pub fn start(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let mut worker = self.worker.lock().unwrap();
        if worker.is_some() {
            tracing::debug!(id = %self.unique_id, "worker already started");
            return;
        }
        *worker = Some(tokio::spawn(scheduler::run(self.shared.clone())));
    }

    /// Start the worker if needed and wait until at least `n` reseeds have
    /// completed.
    pub async fn start_and_wait_for_nth_seed(&self, n: u64) -> RngResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(RngError::Disposed);
        }
        self.start();
        self.wait_for_reseed_count(n).await
    }

    /// Force priority to High, wake the worker, and wait for the reseed count
    /// to advance past its value at entry.
    pub async fn reseed(&self) -> RngResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(RngError::Disposed);
        }
        let target = self.shared.reseed_count() + 1;
        self.shared.set_priority(Priority::High);
        self.shared.wake.notify_one();
        self.wait_for_reseed_count(target).await
    }

    async fn wait_for_reseed_count(&self, target: u64) -> RngResult<()> {
        let mut reseeds = self.shared.subscribe_reseeds();
        let mut stop = self.shared.subscribe_stop();
        loop {
            if *reseeds.borrow_and_update() >= target {
                return Ok(());
            }
            if *stop.borrow_and_update() {
                return Err(RngError::Cancelled);
            }
            tokio::select! {
                changed = reseeds.changed() => {
                    if changed.is_err() {
                        return Err(RngError::Cancelled);
                    }
                }
                _ = stop.changed() => return Err(RngError::Cancelled),
            }
        }
    }

    /// Fill `dest` with random bytes.
    ///
    /// Fails with [`RngError::Uninitialised`] until the first reseed has
    /// completed, and with [`RngError::RequestTooLarge`] past the per-request
    /// cap. Holds only the PRNG lock.
    pub fn fill(&self, dest: &mut [u8]) -> RngResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(RngError::Disposed);
        }
        if self.shared.reseed_count() == 0 {
            return Err(RngError::Uninitialised);
        }

        self.shared.prng.lock().unwrap().generate(dest)?;
        self.shared
            .bytes_requested
            .fetch_add(dest.len() as u64, Ordering::SeqCst);
        Ok(())
    }

    /// Insert a source; permitted whether or not the worker is running.
    pub fn add_source(&self, source: Box<dyn EntropySource>) -> SourceFingerprint {
        if self.disposed.load(Ordering::SeqCst) {
            // Too late to ever poll it; honour the release contract instead
            let fingerprint = SourceFingerprint::derive(source.kind(), source.name());
            source.release();
            return fingerprint;
        }
        let fingerprint = self.shared.registry.add(source);
        self.shared.wake.notify_one();
        fingerprint
    }

    /// Register a listener fired on the worker task after each reseed, once
    /// the PRNG lock has been released. A panicking listener is caught and
    /// logged; it never aborts the worker.
    pub fn on_reseed(&self, listener: impl Fn(u64) + Send + Sync + 'static) {
        self.shared.listeners.lock().unwrap().push(Arc::new(listener));
    }

    /// External policy hook for the Normal/Low regimes.
    pub fn set_priority(&self, priority: Priority) {
        self.shared.set_priority(priority);
    }

    /// Signal the worker to stop without waiting for it.
    pub fn request_stop(&self) {
        self.shared.request_stop();
    }

    /// Stop the worker and wait for it to exit.
    pub async fn stop(&self) {
        self.shared.request_stop();
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Tear everything down: stop the worker, release every source exactly
    /// once, destroy the PRNG key, and drop all listeners.
    ///
    /// Idempotent and safe from any thread, including inside a reseed
    /// listener: the worker abort takes effect at its next suspension point.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.request_stop();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            handle.abort();
        }
        self.shared.registry.release_all();
        *self.shared.prng.lock().unwrap() = CipherRng::new_unseeded();
        self.shared.listeners.lock().unwrap().clear();
    }

    // --- metrics ---

    /// Completed reseeds. Strictly monotone; lock-free read.
    pub fn reseed_count(&self) -> u64 {
        self.shared.reseed_count()
    }

    /// Total bytes handed to callers through [`fill`](Self::fill).
    pub fn bytes_requested(&self) -> u64 {
        self.shared.bytes_requested.load(Ordering::SeqCst)
    }

    pub fn priority(&self) -> Priority {
        self.shared.priority()
    }

    pub fn unique_id(&self) -> Uuid {
        self.unique_id
    }

    pub fn is_running(&self) -> bool {
        !self.shared.stop_requested()
            && self
                .worker
                .lock()
                .unwrap()
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    // --- persistent state ---

    /// Items capturing the restorable part of the generator: its id and, once
    /// seeded, a carryover seed drawn from the PRNG. The draw itself rekeys,
    /// so the exported bytes reveal no future output.
    pub fn export_state(&self) -> Vec<PersistentItem> {
        let mut items = vec![PersistentItem::new(
            STATE_NAMESPACE,
            STATE_KEY_ID,
            self.unique_id.as_bytes().to_vec(),
        )];

        let mut prng = self.shared.prng.lock().unwrap();
        if prng.is_seeded() {
            let mut carryover = vec![0u8; CARRYOVER_LEN];
            if prng.generate(&mut carryover).is_ok() {
                items.push(PersistentItem::new(
                    STATE_NAMESPACE,
                    STATE_KEY_CARRYOVER,
                    carryover,
                ));
            }
        }
        items
    }

    /// Fold a previously exported carryover seed back in. The seed is
    /// expanded per pool and distributed as ordinary entropy events, so the
    /// next scheduled reseed picks it up without touching the reseed
    /// sequence or the priority state machine.
    pub fn import_state(&self, items: &[PersistentItem]) {
        let carryover = items
            .iter()
            .find(|item| item.namespace() == STATE_NAMESPACE && item.key() == STATE_KEY_CARRYOVER);
        let Some(carryover) = carryover else { return };
        if carryover.value().is_empty() {
            return;
        }

        let fingerprint = SourceFingerprint::derive("persistent-state", "carryover");
        let mut accumulator = self.shared.accumulator.lock().unwrap();
        for index in 0..POOL_COUNT as u32 {
            let mut hasher = Sha256::new();
            hasher.update(carryover.value());
            hasher.update(index.to_le_bytes());
            let expanded = hasher.finalize();
            accumulator.add(EntropyEvent::new(fingerprint, expanded.to_vec()));
        }
    }

    /// Write the exported state atomically to `path`.
    pub fn save_state(&self, path: &Path) -> Result<(), StateFileError> {
        persist::write_state_file(path, &self.export_state())
    }

    /// Read a state file written by [`save_state`](Self::save_state) and fold
    /// its carryover seed into the pools.
    pub fn load_state(&self, path: &Path) -> Result<(), StateFileError> {
        let items = persist::read_state_file(path)?;
        self.import_state(&items);
        Ok(())
    }
}

impl Drop for PooledGenerator {
    fn drop(&mut self) {
        self.dispose();
    }
}
