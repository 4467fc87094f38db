pub mod state_file;

#[cfg(test)]
mod state_file_tests;

// Re-export
pub use state_file::{read_state_file, write_state_file, PersistentItem, StateFileError};
