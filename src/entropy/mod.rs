pub mod accumulator;
pub mod pool;
pub mod registry;
pub mod sources;

#[cfg(test)]
mod registry_tests;
#[cfg(test)]
mod sources_tests;

// Re-export
pub use accumulator::{Accumulator, EntropyEvent, POOL_COUNT};
pub use registry::{RegisteredSource, SourceRegistry};
pub use sources::{EntropySource, OsRandomSource, SourceFingerprint, TimerJitterSource};
