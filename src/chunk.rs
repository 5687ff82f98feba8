//! Chunk codec: the authenticated-encryption record every part of a store
//! file after the header is made of.
//!
//! Chunk layout:
//! ```text
//! SALT (32) | IV (12) | LEN (4, BE) | CIPHERTEXT+TAG (LEN)
//! ```
//!
//! Each chunk is sealed with its own sub-key, `HKDF-SHA-256(master, salt)`.
//! An IV is never reused under one sub-key: fresh chunks draw a random salt
//! and IV, in-place updates bump the IV, and an IV that would wrap around
//! forces a brand-new salt.

use std::io::{Read, Seek, SeekFrom};

use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::{self, IV_LEN, MasterKey, SALT_LEN, TAG_LEN};
use crate::error::{Result, StoreError};
use crate::storage::read_full;

/// Length of the big-endian length field.
pub const LEN_FIELD_LEN: usize = 4;
/// Bytes in front of the ciphertext: salt, IV and length field.
pub const PREFIX_LEN: usize = SALT_LEN + IV_LEN + LEN_FIELD_LEN;
/// Bytes a chunk adds on top of its plaintext.
pub const CHUNK_OVERHEAD: usize = PREFIX_LEN + TAG_LEN;

/// Encodes and decodes chunks under one master key.
pub struct ChunkCodec<'a> {
    key: &'a MasterKey,
}

impl<'a> ChunkCodec<'a> {
    pub fn new(key: &'a MasterKey) -> Self {
        Self { key }
    }

    /// Seal `plaintext` into a new chunk with a fresh random salt and IV.
    pub fn encode(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let salt = crypto::generate_salt()?;
        let iv = crypto::generate_iv()?;
        self.seal_with(&salt, &iv, plaintext)
    }

    /// Decrypt the chunk at the start of `chunk`. Bytes after it are ignored.
    pub fn decode(&self, chunk: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let parts = ChunkParts::split(chunk)?;
        let sub_key = crypto::derive_sub_key(self.key, &parts.salt);
        crypto::open(&sub_key, &parts.iv, parts.sealed)
    }

    /// Re-seal an existing chunk with new contents.
    ///
    /// Keeps the chunk's salt and uses the next IV. When the IV space is
    /// exhausted the chunk is re-keyed under a fresh salt instead.
    pub fn update(&self, chunk: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let parts = ChunkParts::split(chunk)?;
        let mut iv = parts.iv;

        if increment_iv(&mut iv) {
            debug!("chunk iv space exhausted; re-keying under a new salt");
            return self.encode(plaintext);
        }

        self.seal_with(&parts.salt, &iv, plaintext)
    }

    fn seal_with(
        &self,
        salt: &[u8; SALT_LEN],
        iv: &[u8; IV_LEN],
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        let sub_key = crypto::derive_sub_key(self.key, salt);
        let sealed = crypto::seal(&sub_key, iv, plaintext)?;
        let len = u32::try_from(sealed.len())
            .map_err(|_| StoreError::format("chunk payload exceeds 4 GiB"))?;

        let mut out = Vec::with_capacity(PREFIX_LEN + sealed.len());
        out.extend_from_slice(salt);
        out.extend_from_slice(iv);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&sealed);
        Ok(out)
    }
}

struct ChunkParts<'c> {
    salt: [u8; SALT_LEN],
    iv: [u8; IV_LEN],
    sealed: &'c [u8],
}

impl<'c> ChunkParts<'c> {
    fn split(chunk: &'c [u8]) -> Result<Self> {
        if chunk.len() < PREFIX_LEN {
            return Err(StoreError::ShortBuffer {
                needed: PREFIX_LEN,
                available: chunk.len(),
            });
        }

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&chunk[..SALT_LEN]);
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&chunk[SALT_LEN..SALT_LEN + IV_LEN]);
        let mut len = [0u8; LEN_FIELD_LEN];
        len.copy_from_slice(&chunk[SALT_LEN + IV_LEN..PREFIX_LEN]);

        let total = total_size(u32::from_be_bytes(len))?;
        if chunk.len() < total {
            return Err(StoreError::ShortBuffer {
                needed: total,
                available: chunk.len(),
            });
        }

        Ok(Self {
            salt,
            iv,
            sealed: &chunk[PREFIX_LEN..total],
        })
    }
}

/// On-disk size of a chunk whose length field holds `declared`.
fn total_size(declared: u32) -> Result<usize> {
    let declared = declared as usize;
    if declared < TAG_LEN {
        return Err(StoreError::format(format!(
            "chunk length {declared} is smaller than the tag"
        )));
    }
    Ok(PREFIX_LEN + declared)
}

/// Big-endian increment; returns `true` when the value wrapped to zero.
fn increment_iv(iv: &mut [u8; IV_LEN]) -> bool {
    for byte in iv.iter_mut().rev() {
        *byte = byte.wrapping_add(1);
        if *byte != 0 {
            return false;
        }
    }
    true
}

/// Size of the chunk starting at the reader's position, without decrypting
/// it. The position is restored before returning.
pub fn peek_length<R: Read + Seek>(reader: &mut R) -> Result<usize> {
    let start = reader.stream_position()?;
    let declared = read_declared_len(reader);
    reader.seek(SeekFrom::Start(start))?;
    total_size(declared?)
}

fn read_declared_len<R: Read + Seek>(reader: &mut R) -> Result<u32> {
    reader.seek(SeekFrom::Current((SALT_LEN + IV_LEN) as i64))?;
    let mut len = [0u8; LEN_FIELD_LEN];
    read_full(reader, &mut len)?;
    Ok(u32::from_be_bytes(len))
}

/// Read the raw bytes of the chunk at the reader's position, leaving the
/// reader just past it.
///
/// The declared length is checked against the bytes left in the stream
/// before anything is allocated.
pub fn read_chunk<R: Read + Seek>(reader: &mut R) -> Result<Vec<u8>> {
    let size = peek_length(reader)?;
    let available = remaining(reader)?;
    if size as u64 > available {
        return Err(StoreError::ShortBuffer {
            needed: size,
            available: usize::try_from(available).unwrap_or(usize::MAX),
        });
    }

    let mut chunk = vec![0u8; size];
    read_full(reader, &mut chunk)?;
    Ok(chunk)
}

fn remaining<R: Seek>(reader: &mut R) -> Result<u64> {
    let start = reader.stream_position()?;
    let end = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(start))?;
    Ok(end.saturating_sub(start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_LEN;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn key(byte: u8) -> MasterKey {
        MasterKey::from_bytes([byte; KEY_LEN])
    }

    #[test]
    fn encode_decode_roundtrip() {
        let master = key(1);
        let codec = ChunkCodec::new(&master);

        let chunk = codec.encode(b"entry bytes").unwrap();

        assert_eq!(chunk.len(), b"entry bytes".len() + CHUNK_OVERHEAD);
        assert_eq!(codec.decode(&chunk).unwrap().as_slice(), b"entry bytes");
    }

    #[test]
    fn length_field_counts_ciphertext_and_tag() {
        let master = key(1);
        let chunk = ChunkCodec::new(&master).encode(&[0u8; 24]).unwrap();

        let declared = u32::from_be_bytes(chunk[44..48].try_into().unwrap());
        assert_eq!(declared as usize, 24 + TAG_LEN);
    }

    #[test]
    fn chunks_of_same_plaintext_differ() {
        let master = key(1);
        let codec = ChunkCodec::new(&master);

        assert_ne!(codec.encode(b"x").unwrap(), codec.encode(b"x").unwrap());
    }

    #[test]
    fn decode_with_other_key_fails_authentication() {
        let k1 = key(1);
        let k2 = key(2);
        let chunk = ChunkCodec::new(&k1).encode(b"secret").unwrap();

        assert!(matches!(
            ChunkCodec::new(&k2).decode(&chunk),
            Err(StoreError::Authentication)
        ));
    }

    #[test]
    fn flipped_ciphertext_bit_fails_authentication() {
        let master = key(1);
        let codec = ChunkCodec::new(&master);
        let mut chunk = codec.encode(b"secret").unwrap();
        chunk[PREFIX_LEN] ^= 0x01;

        assert!(matches!(
            codec.decode(&chunk),
            Err(StoreError::Authentication)
        ));
    }

    #[test]
    fn truncated_chunk_is_short_buffer() {
        let master = key(1);
        let codec = ChunkCodec::new(&master);
        let chunk = codec.encode(b"secret").unwrap();

        let err = codec.decode(&chunk[..chunk.len() - 1]).unwrap_err();
        assert!(matches!(err, StoreError::ShortBuffer { .. }));

        let err = codec.decode(&chunk[..10]).unwrap_err();
        assert!(matches!(
            err,
            StoreError::ShortBuffer {
                needed: PREFIX_LEN,
                available: 10
            }
        ));
    }

    #[test]
    fn length_below_tag_is_format_error() {
        let master = key(1);
        let codec = ChunkCodec::new(&master);
        let mut chunk = codec.encode(b"secret").unwrap();
        chunk[44..48].copy_from_slice(&3u32.to_be_bytes());

        assert!(matches!(codec.decode(&chunk), Err(StoreError::Format(_))));
    }

    #[test]
    fn update_keeps_salt_and_bumps_iv() {
        let master = key(1);
        let codec = ChunkCodec::new(&master);
        let chunk = codec.seal_with(&[5u8; SALT_LEN], &[0u8; IV_LEN], b"count=1").unwrap();

        let updated = codec.update(&chunk, b"count=2").unwrap();

        assert_eq!(&updated[..SALT_LEN], &[5u8; SALT_LEN]);
        let mut expected_iv = [0u8; IV_LEN];
        expected_iv[IV_LEN - 1] = 1;
        assert_eq!(&updated[SALT_LEN..SALT_LEN + IV_LEN], &expected_iv);
        assert_eq!(codec.decode(&updated).unwrap().as_slice(), b"count=2");
    }

    #[test]
    fn update_at_iv_exhaustion_rekeys_with_new_salt() {
        let master = key(1);
        let codec = ChunkCodec::new(&master);
        let chunk = codec
            .seal_with(&[5u8; SALT_LEN], &[0xFF; IV_LEN], b"count=1")
            .unwrap();

        let updated = codec.update(&chunk, b"count=2").unwrap();

        assert_ne!(&updated[..SALT_LEN], &[5u8; SALT_LEN]);
        assert_eq!(updated.len(), chunk.len());
        assert_eq!(codec.decode(&updated).unwrap().as_slice(), b"count=2");
    }

    #[test]
    fn increment_iv_carries_and_wraps() {
        let mut iv = [0u8; IV_LEN];
        iv[IV_LEN - 1] = 0xFF;
        assert!(!increment_iv(&mut iv));
        assert_eq!(iv[IV_LEN - 2..], [1, 0]);

        let mut iv = [0xFF; IV_LEN];
        assert!(increment_iv(&mut iv));
        assert_eq!(iv, [0u8; IV_LEN]);
    }

    #[test]
    fn peek_length_restores_position() {
        let master = key(1);
        let codec = ChunkCodec::new(&master);
        let mut data = codec.encode(b"first").unwrap();
        let first_len = data.len();
        data.extend(codec.encode(b"the second one").unwrap());

        let mut cursor = Cursor::new(data);
        assert_eq!(peek_length(&mut cursor).unwrap(), first_len);
        assert_eq!(cursor.position(), 0);

        let first = read_chunk(&mut cursor).unwrap();
        assert_eq!(cursor.position() as usize, first_len);
        assert_eq!(codec.decode(&first).unwrap().as_slice(), b"first");

        let second = read_chunk(&mut cursor).unwrap();
        assert_eq!(codec.decode(&second).unwrap().as_slice(), b"the second one");
    }

    #[test]
    fn peek_length_on_truncated_prefix_restores_position() {
        let mut cursor = Cursor::new(vec![0u8; 20]);
        cursor.set_position(4);

        assert!(matches!(
            peek_length(&mut cursor),
            Err(StoreError::ShortBuffer { .. })
        ));
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn oversized_length_field_is_rejected_before_reading() {
        let master = key(1);
        let mut data = ChunkCodec::new(&master).encode(b"count").unwrap();
        data[44..48].copy_from_slice(&0xFFFF_FFF0u32.to_be_bytes());
        let stream_len = data.len();

        let mut cursor = Cursor::new(data);
        match read_chunk(&mut cursor) {
            Err(StoreError::ShortBuffer { needed, available }) => {
                assert_eq!(needed, PREFIX_LEN + 0xFFFF_FFF0);
                assert_eq!(available, stream_len);
            }
            other => panic!("expected ShortBuffer, got: {other:?}"),
        }
        assert_eq!(cursor.position(), 0);
    }

    proptest! {
        #[test]
        fn tamper_only_breaks_the_touched_chunk(
            first in proptest::collection::vec(any::<u8>(), 0..64),
            second in proptest::collection::vec(any::<u8>(), 0..64),
            bit in 0usize..8,
            pick in any::<prop::sample::Index>(),
        ) {
            let master = key(7);
            let codec = ChunkCodec::new(&master);
            let mut a = codec.encode(&first).unwrap();
            let b = codec.encode(&second).unwrap();

            let at = PREFIX_LEN + pick.index(a.len() - PREFIX_LEN);
            a[at] ^= 1 << bit;

            prop_assert!(matches!(codec.decode(&a), Err(StoreError::Authentication)));
            let decoded = codec.decode(&b).unwrap();
            prop_assert_eq!(decoded.as_slice(), second.as_slice());
        }
    }
}
