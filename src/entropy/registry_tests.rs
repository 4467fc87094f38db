#[cfg(test)]
mod tests {
    use crate::entropy::registry::SourceRegistry;
    use crate::entropy::sources::EntropySource;
    use crate::Priority;
    use anyhow::{anyhow, Result};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct CountingSource {
        name: String,
        releases: Arc<AtomicU32>,
        fail: bool,
    }

    impl CountingSource {
        fn new(name: &str, releases: Arc<AtomicU32>) -> Self {
            Self {
                name: name.to_string(),
                releases,
                fail: false,
            }
        }

        fn failing(name: &str, releases: Arc<AtomicU32>) -> Self {
            Self {
                name: name.to_string(),
                releases,
                fail: true,
            }
        }
    }

    impl EntropySource for CountingSource {
        fn kind(&self) -> &'static str {
            "counting"
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn get_entropy(&self, _priority: Priority) -> Result<Option<Vec<u8>>> {
            if self.fail {
                Err(anyhow!("always fails"))
            } else {
                Ok(Some(vec![0xCC; 16]))
            }
        }

        fn release(&self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn snapshot_is_a_shallow_clone() {
        let registry = SourceRegistry::new();
        let releases = Arc::new(AtomicU32::new(0));
        let fp = registry.add(Box::new(CountingSource::new("a", releases.clone())));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].fingerprint(), fp);

        // Adding while the snapshot is held must not disturb it
        registry.add(Box::new(CountingSource::new("b", releases)));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn release_fires_exactly_once() {
        let registry = SourceRegistry::new();
        let releases = Arc::new(AtomicU32::new(0));
        registry.add(Box::new(CountingSource::new("a", releases.clone())));

        registry.release_all();
        registry.release_all();
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        // A released source reports nothing on poll
        let snapshot = registry.snapshot();
        assert!(snapshot[0].get_entropy(Priority::Normal).unwrap().is_none());
    }

    #[test]
    fn drop_releases_remaining_sources() {
        let releases = Arc::new(AtomicU32::new(0));
        {
            let registry = SourceRegistry::new();
            registry.add(Box::new(CountingSource::new("a", releases.clone())));
            registry.add(Box::new(CountingSource::new("b", releases.clone())));
        }
        assert_eq!(releases.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failure_tally_demotes_at_the_limit() {
        let registry = SourceRegistry::new();
        let releases = Arc::new(AtomicU32::new(0));
        registry.add(Box::new(CountingSource::failing("bad", releases)));
        let source = registry.snapshot().remove(0);

        assert!(!source.record_failure(Some(3)));
        assert!(!source.record_failure(Some(3)));
        assert!(source.record_failure(Some(3)), "third strike demotes");
        assert!(source.is_demoted());

        // Crossing the limit again does not re-report the demotion
        assert!(!source.record_failure(Some(3)));
    }

    #[test]
    fn success_resets_the_failure_tally() {
        let registry = SourceRegistry::new();
        let releases = Arc::new(AtomicU32::new(0));
        registry.add(Box::new(CountingSource::new("flaky", releases)));
        let source = registry.snapshot().remove(0);

        assert!(!source.record_failure(Some(2)));
        source.record_success();
        assert!(!source.record_failure(Some(2)), "tally restarted after success");
        assert!(!source.is_demoted());
    }

    #[test]
    fn unlimited_tally_never_demotes() {
        let registry = SourceRegistry::new();
        let releases = Arc::new(AtomicU32::new(0));
        registry.add(Box::new(CountingSource::failing("bad", releases)));
        let source = registry.snapshot().remove(0);

        for _ in 0..100 {
            assert!(!source.record_failure(None));
        }
        assert!(!source.is_demoted());
    }
}
