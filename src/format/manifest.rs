//! Chunk 0 plaintext.
//!
//! ```text
//! VERIFICATION PATTERN (16) | ENTRY COUNT (8, BE)
//! ```

use crate::error::{Result, StoreError};

/// Fixed plaintext that tells a right password from a wrong one.
pub const VERIFICATION_PATTERN: [u8; 16] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
];

const COUNT_LEN: usize = 8;

/// Decoded chunk 0: the number of entry chunks that follow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Manifest {
    entry_count: u64,
}

impl Manifest {
    pub const LEN: usize = VERIFICATION_PATTERN.len() + COUNT_LEN;

    pub fn new(entry_count: u64) -> Self {
        Self { entry_count }
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn incremented(self) -> Self {
        Self::new(self.entry_count + 1)
    }

    pub fn decremented(self) -> Result<Self> {
        self.entry_count
            .checked_sub(1)
            .map(Self::new)
            .ok_or_else(|| StoreError::format("entry count underflow"))
    }

    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[..VERIFICATION_PATTERN.len()].copy_from_slice(&VERIFICATION_PATTERN);
        buf[VERIFICATION_PATTERN.len()..].copy_from_slice(&self.entry_count.to_be_bytes());
        buf
    }

    /// Parses a decrypted chunk 0.
    ///
    /// A pattern mismatch is reported as `Authentication`: the chunk opened
    /// but under the wrong key.
    pub fn decode(plaintext: &[u8]) -> Result<Self> {
        let pattern_len = VERIFICATION_PATTERN.len();
        if plaintext.len() < pattern_len {
            return Err(StoreError::ShortBuffer {
                needed: Self::LEN,
                available: plaintext.len(),
            });
        }
        if plaintext[..pattern_len] != VERIFICATION_PATTERN {
            return Err(StoreError::Authentication);
        }
        if plaintext.len() != Self::LEN {
            return Err(StoreError::format(format!(
                "chunk 0 holds {} bytes, expected {}",
                plaintext.len(),
                Self::LEN
            )));
        }

        let mut count = [0u8; COUNT_LEN];
        count.copy_from_slice(&plaintext[pattern_len..]);
        Ok(Self::new(u64::from_be_bytes(count)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_layout() {
        let bytes = Manifest::new(258).encode();

        assert_eq!(bytes.len(), 24);
        assert_eq!(bytes[..16], VERIFICATION_PATTERN);
        assert_eq!(bytes[16..], [0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(Manifest::decode(&bytes).unwrap().entry_count(), 258);
    }

    #[test]
    fn wrong_pattern_is_authentication_error() {
        let mut bytes = Manifest::new(1).encode();
        bytes[3] ^= 0xFF;

        assert!(matches!(
            Manifest::decode(&bytes),
            Err(StoreError::Authentication)
        ));
    }

    #[test]
    fn wrong_length_is_format_error() {
        let bytes = Manifest::new(1).encode();

        assert!(Manifest::decode(&bytes[..20]).unwrap_err().is_format());
        assert!(Manifest::decode(&bytes[..8]).unwrap_err().is_format());
    }

    #[test]
    fn count_cannot_go_below_zero() {
        assert_eq!(Manifest::new(2).decremented().unwrap().entry_count(), 1);
        assert_eq!(Manifest::new(2).incremented().entry_count(), 3);
        assert!(Manifest::new(0).decremented().is_err());
    }
}
