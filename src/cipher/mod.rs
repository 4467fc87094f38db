pub mod cipher_rng;


// Re-export
pub use cipher_rng::{CipherRng, KEY_LEN, MAX_REQUEST_BYTES};
