//! Cryptographic primitives for the stores.
//!
//! Provides password key derivation, per-chunk sub-key derivation and the
//! ChaCha20-Poly1305 seal/open pair used by the chunk codec.

pub mod aead;
pub mod kdf;

pub use aead::{derive_sub_key, generate_iv, generate_salt, open, seal};
pub use kdf::{MasterKey, PBKDF2_ITERATIONS, derive_key};

/// Length of header and chunk salts (32 bytes).
pub const SALT_LEN: usize = 32;
/// Length of the nonce (12 bytes for ChaCha20-Poly1305).
pub const IV_LEN: usize = 12;
/// Length of master keys and sub-keys (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
/// Length of the Poly1305 authentication tag.
pub const TAG_LEN: usize = 16;
