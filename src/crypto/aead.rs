use super::{IV_LEN, KEY_LEN, MasterKey, SALT_LEN};
use crate::error::{Result, StoreError};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use getrandom::fill;
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Fill buffer with cryptographically secure random bytes
pub(crate) fn secure_random(buf: &mut [u8]) -> Result<()> {
    fill(buf).map_err(|_| StoreError::Random)
}

/// Generate salt
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    secure_random(&mut salt)?;
    Ok(salt)
}

/// Generate a random starting nonce
pub fn generate_iv() -> Result<[u8; IV_LEN]> {
    let mut iv = [0u8; IV_LEN];
    secure_random(&mut iv)?;
    Ok(iv)
}

/// Derive the chunk-local key: HKDF-SHA-256 with the chunk salt, no info.
pub fn derive_sub_key(master: &MasterKey, salt: &[u8; SALT_LEN]) -> Zeroizing<[u8; KEY_LEN]> {
    let hkdf = Hkdf::<Sha256>::new(Some(&salt[..]), master.as_bytes());
    let mut sub_key = Zeroizing::new([0u8; KEY_LEN]);
    let Ok(()) = hkdf.expand(&[], &mut sub_key[..]) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    sub_key
}

/// Encrypt plaintext; the result is ciphertext followed by the tag.
pub fn seal(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

    cipher
        .encrypt(Nonce::from_slice(iv), plaintext)
        .map_err(|_| StoreError::format("chunk encryption failed"))
}

/// Decrypt ciphertext+tag
pub fn open(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

    let plaintext = cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| StoreError::Authentication)?;
    Ok(Zeroizing::new(plaintext))
}
