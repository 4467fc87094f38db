// Shared mock entropy sources for the integration tests

use anyhow::{anyhow, Result};
use fortuna_pool::{EntropySource, GeneratorConfig, Priority};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Config with cycle waits shrunk far enough for wall-clock-bounded tests.
pub fn fast_config() -> GeneratorConfig {
    GeneratorConfig {
        high_cycle_wait: Duration::from_millis(1),
        normal_cycle_wait: Duration::from_millis(2),
        low_cycle_wait: Duration::from_millis(20),
        empty_registry_wait: Duration::from_millis(10),
        ..GeneratorConfig::default()
    }
}

/// Source that returns the same byte string on every poll and counts polls.
pub struct ScriptedSource {
    name: String,
    bytes: Vec<u8>,
    polls: Arc<AtomicU64>,
}

impl ScriptedSource {
    pub fn fixed(name: &str, bytes: Vec<u8>) -> (Self, Arc<AtomicU64>) {
        let polls = Arc::new(AtomicU64::new(0));
        (
            Self {
                name: name.to_string(),
                bytes,
                polls: polls.clone(),
            },
            polls,
        )
    }
}

impl EntropySource for ScriptedSource {
    fn kind(&self) -> &'static str {
        "scripted"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn get_entropy(&self, _priority: Priority) -> Result<Option<Vec<u8>>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.bytes.clone()))
    }
}

/// Source that raises on every poll.
pub struct FailingSource {
    polls: Arc<AtomicU64>,
}

impl FailingSource {
    pub fn new() -> (Self, Arc<AtomicU64>) {
        let polls = Arc::new(AtomicU64::new(0));
        (
            Self {
                polls: polls.clone(),
            },
            polls,
        )
    }
}

impl EntropySource for FailingSource {
    fn kind(&self) -> &'static str {
        "failing"
    }

    fn name(&self) -> &str {
        "failing"
    }

    fn get_entropy(&self, _priority: Priority) -> Result<Option<Vec<u8>>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("this source always fails"))
    }
}
