// Scheduler - the long-running harvest/reseed worker
//
// One cooperative task performs all entropy harvesting and every reseed.
// Each cycle: snapshot the registry, shuffle the snapshot, poll every source
// at the current priority, evaluate the reseed predicate, then sleep. Every
// sleep is interruptible by the wake signal and by stop, and stop is also
// checked between per-source polls.

use super::Shared;
use crate::cipher::CipherRng;
use crate::entropy::{EntropyEvent, RegisteredSource};
use crate::Priority;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub(crate) async fn run(shared: Arc<Shared>) {
    // Shuffling only needs to be unpredictable to the sources, so the
    // cheap-key construction is enough here.
    let mut shuffle_rng = CipherRng::with_cheap_key();
    let mut stop = shared.subscribe_stop();

    tracing::debug!("entropy worker started");
    while !*stop.borrow_and_update() {
        let mut order = shared.registry.snapshot();
        if order.is_empty() {
            wait_interruptible(&shared, shared.config.empty_registry_wait, &mut stop).await;
            continue;
        }

        // Without the shuffle the last source in registration order would
        // always speak last into the cycle's accumulator state.
        shuffle(&mut order, &mut shuffle_rng);

        if shared.config.poll_concurrency > 1 {
            poll_parallel(&shared, &order, &stop).await;
        } else {
            poll_sequential(&shared, &order, &stop);
        }

        if shared.should_reseed() {
            shared.perform_reseed();
        }

        let wait = match shared.priority() {
            Priority::High => shared.config.high_cycle_wait,
            Priority::Normal => shared.config.normal_cycle_wait,
            Priority::Low => shared.config.low_cycle_wait,
        };
        wait_interruptible(&shared, wait, &mut stop).await;
    }
    tracing::debug!("entropy worker stopped");
}

fn poll_sequential(shared: &Shared, order: &[Arc<RegisteredSource>], stop: &watch::Receiver<bool>) {
    for source in order {
        if *stop.borrow() {
            break;
        }
        if source.is_demoted() {
            continue;
        }
        let result = source.get_entropy(shared.priority());
        record_poll_result(shared, source, result);
    }
}

/// Poll in chunks of the configured concurrency via blocking tasks, folding
/// each chunk's results in shuffled order once the whole chunk has finished.
async fn poll_parallel(
    shared: &Arc<Shared>,
    order: &[Arc<RegisteredSource>],
    stop: &watch::Receiver<bool>,
) {
    for chunk in order.chunks(shared.config.poll_concurrency) {
        if *stop.borrow() {
            break;
        }
        let priority = shared.priority();
        let handles: Vec<_> = chunk
            .iter()
            .map(|source| {
                let source = Arc::clone(source);
                tokio::task::spawn_blocking(move || {
                    if source.is_demoted() {
                        return (source, Ok(None));
                    }
                    let result = source.get_entropy(priority);
                    (source, result)
                })
            })
            .collect();

        for handle in handles {
            let Ok((source, result)) = handle.await else {
                continue;
            };
            record_poll_result(shared, &source, result);
        }
    }
}

fn record_poll_result(
    shared: &Shared,
    source: &Arc<RegisteredSource>,
    result: Result<Option<Vec<u8>>>,
) {
    match result {
        Ok(Some(bytes)) if !bytes.is_empty() => {
            source.record_success();
            let event = EntropyEvent::new(source.fingerprint(), bytes);
            shared.accumulator.lock().unwrap().add(event);
        }
        Ok(_) => {
            // Nothing new this cycle; not a fault
        }
        Err(error) => {
            tracing::debug!(source = %source.name(), %error, "entropy source failed, skipping this cycle");
            if source.record_failure(shared.config.max_source_failures) {
                tracing::warn!(source = %source.name(), "demoting persistently failing entropy source");
            }
        }
    }
}

/// Fisher-Yates over the snapshot, driven by the worker's cheap-key rng.
fn shuffle(sources: &mut [Arc<RegisteredSource>], rng: &mut CipherRng) {
    for i in (1..sources.len()).rev() {
        let j = random_u32(rng) as usize % (i + 1);
        sources.swap(i, j);
    }
}

fn random_u32(rng: &mut CipherRng) -> u32 {
    let mut buf = [0u8; 4];
    // The cheap-key instance is seeded at construction; this cannot fail
    let _ = rng.generate(&mut buf);
    u32::from_le_bytes(buf)
}

async fn wait_interruptible(
    shared: &Shared,
    duration: Duration,
    stop: &mut watch::Receiver<bool>,
) {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = shared.wake.notified() => {}
        _ = stop.changed() => {}
    }
}
