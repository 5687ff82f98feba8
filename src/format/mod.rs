//! File format handling for both store variants.
//!
//! ```text
//! MAGIC (4) | HEADER SALT (32) | CHUNK0 | CHUNK1 | CHUNK2 | ...
//! ```
//!
//! Chunk 0 holds the [`Manifest`]; every later chunk holds one encoded entry.

use std::io::Read;

use crate::crypto::SALT_LEN;
use crate::error::{Result, StoreError};
use crate::storage::read_full;

pub mod manifest;

pub use manifest::{Manifest, VERIFICATION_PATTERN};

/// Length of magic bytes.
pub const MAGIC_LEN: usize = 4;
/// Magic bytes of a keystore file ("LKKS").
pub const KEYSTORE_MAGIC: &[u8; MAGIC_LEN] = b"LKKS";
/// Magic bytes of an alias store file ("LKAS").
pub const ALIAS_STORE_MAGIC: &[u8; MAGIC_LEN] = b"LKAS";
/// Length of the plaintext header.
pub const HEADER_LEN: usize = MAGIC_LEN + SALT_LEN;
/// File offset of chunk 0.
pub const CHUNK0_OFFSET: u64 = HEADER_LEN as u64;

/// Plaintext file header: magic and the salt the master key is derived with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    magic: [u8; MAGIC_LEN],
    salt: [u8; SALT_LEN],
}

impl Header {
    pub fn new(magic: &[u8; MAGIC_LEN], salt: [u8; SALT_LEN]) -> Self {
        Self {
            magic: *magic,
            salt,
        }
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN);
        buf.extend_from_slice(&self.magic);
        buf.extend_from_slice(&self.salt);
        buf
    }

    /// Reads a header, rejecting files that do not start with `expected`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file is shorter than the header
    /// - The magic bytes do not match
    pub fn read<R: Read>(reader: &mut R, expected: &[u8; MAGIC_LEN]) -> Result<Self> {
        let mut magic = [0u8; MAGIC_LEN];
        read_full(reader, &mut magic)?;
        if &magic != expected {
            return Err(StoreError::format(format!(
                "bad magic number {:?}, expected {:?} (wrong file?)",
                String::from_utf8_lossy(&magic),
                String::from_utf8_lossy(expected)
            )));
        }

        let mut salt = [0u8; SALT_LEN];
        read_full(reader, &mut salt)?;

        Ok(Self { magic, salt })
    }
}
