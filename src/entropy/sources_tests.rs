#[cfg(test)]
mod tests {
    use crate::entropy::sources::{
        EntropySource, OsRandomSource, SourceFingerprint, TimerJitterSource,
    };
    use crate::Priority;

    #[test]
    fn fingerprints_are_stable_and_distinct() {
        let a = SourceFingerprint::derive("os-random", "primary");
        let b = SourceFingerprint::derive("os-random", "primary");
        assert_eq!(a, b);

        assert_ne!(a, SourceFingerprint::derive("os-random", "secondary"));
        assert_ne!(a, SourceFingerprint::derive("timer-jitter", "primary"));
        // Kind/name split must matter, not just the concatenation
        assert_ne!(
            SourceFingerprint::derive("ab", "c"),
            SourceFingerprint::derive("a", "bc")
        );
    }

    #[test]
    fn os_random_source_yields_fresh_bytes() {
        let source = OsRandomSource::new();
        let first = source.get_entropy(Priority::Normal).unwrap().unwrap();
        let second = source.get_entropy(Priority::Normal).unwrap().unwrap();

        assert_eq!(first.len(), 32);
        assert_ne!(first, second);
    }

    #[test]
    fn timer_jitter_source_yields_whitened_digests() {
        let source = TimerJitterSource::new();
        let first = source.get_entropy(Priority::High).unwrap().unwrap();
        let second = source.get_entropy(Priority::Low).unwrap().unwrap();

        assert_eq!(first.len(), 32);
        assert_eq!(second.len(), 32);
        assert_ne!(first, second);
    }
}
