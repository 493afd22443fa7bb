//! At-rest protection for security state.
//!
//! The pipeline's in-memory state (voice templates, device registries) can be
//! snapshotted out of process; everything leaving memory goes through the
//! cipher here when the policy requires it.

pub mod encryption;

pub use encryption::{AtRestCipher, CryptoError, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
