use std::fmt;

use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{KEY_LEN, SALT_LEN};

/// PBKDF2-HMAC-SHA-256 rounds. Part of the file format: existing stores only
/// open with exactly this value.
pub const PBKDF2_ITERATIONS: u32 = 650_000;

/// Password-derived key of one open store session.
///
/// The bytes are wiped when the key is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; KEY_LEN]);

impl MasterKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// One-way digest of the key, safe to fold into hash codes.
    pub fn digest(&self) -> [u8; 32] {
        Sha256::digest(self.0).into()
    }
}

impl PartialEq for MasterKey {
    fn eq(&self, other: &Self) -> bool {
        // no early exit on the first differing byte
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl Eq for MasterKey {}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Derive the master key from a password and the header salt.
pub fn derive_key(password: &str, salt: &[u8; SALT_LEN]) -> MasterKey {
    derive_with_rounds(password, salt, PBKDF2_ITERATIONS)
}

fn derive_with_rounds(password: &str, salt: &[u8], rounds: u32) -> MasterKey {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, rounds, &mut key);
    let master = MasterKey(key);
    key.zeroize();
    master
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pbkdf2_matches_rfc7914_vector() {
        let key = derive_with_rounds("passwd", b"salt", 1);
        assert_eq!(
            hex::encode(key.as_bytes()),
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc"
        );
    }

    #[test]
    fn kdf_is_deterministic() {
        let salt = [42u8; SALT_LEN];

        let k1 = derive_key("password", &salt);
        let k2 = derive_key("password", &salt);

        assert_eq!(k1, k2);
    }

    #[test]
    fn salt_and_password_affect_output() {
        let k1 = derive_with_rounds("pw", &[7u8; SALT_LEN], 10);
        let k2 = derive_with_rounds("pw", &[8u8; SALT_LEN], 10);
        let k3 = derive_with_rounds("pw2", &[7u8; SALT_LEN], 10);

        assert_ne!(k1, k2);
        assert_ne!(k1, k3);
    }

    #[test]
    fn debug_does_not_print_key_bytes() {
        let key = MasterKey::from_bytes([0xAB; KEY_LEN]);
        let rendered = format!("{key:?}");
        assert!(!rendered.contains("171"));
        assert!(!rendered.to_lowercase().contains("ab"));
    }

    #[test]
    fn digest_differs_from_key() {
        let key = MasterKey::from_bytes([1u8; KEY_LEN]);
        assert_ne!(&key.digest(), key.as_bytes());
    }
}
