//! Credential values held by entries, and the factory interface that
//! produces them.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::crypto::aead::secure_random;
use crate::error::{Result, StoreError};

/// Key algorithms the store recognises by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    Ed25519,
    Ed448,
    EdDsa,
    X25519,
    X448,
    Xdh,
    Ec,
    Rsa,
    Aes,
    ChaCha20,
    HmacSha256,
    HmacSha512,
}

impl KeyAlgorithm {
    pub const ALL: [KeyAlgorithm; 12] = [
        KeyAlgorithm::Ed25519,
        KeyAlgorithm::Ed448,
        KeyAlgorithm::EdDsa,
        KeyAlgorithm::X25519,
        KeyAlgorithm::X448,
        KeyAlgorithm::Xdh,
        KeyAlgorithm::Ec,
        KeyAlgorithm::Rsa,
        KeyAlgorithm::Aes,
        KeyAlgorithm::ChaCha20,
        KeyAlgorithm::HmacSha256,
        KeyAlgorithm::HmacSha512,
    ];

    /// Name written into entries.
    pub fn name(self) -> &'static str {
        match self {
            KeyAlgorithm::Ed25519 => "Ed25519",
            KeyAlgorithm::Ed448 => "Ed448",
            KeyAlgorithm::EdDsa => "EdDSA",
            KeyAlgorithm::X25519 => "X25519",
            KeyAlgorithm::X448 => "X448",
            KeyAlgorithm::Xdh => "XDH",
            KeyAlgorithm::Ec => "EC",
            KeyAlgorithm::Rsa => "RSA",
            KeyAlgorithm::Aes => "AES",
            KeyAlgorithm::ChaCha20 => "ChaCha20",
            KeyAlgorithm::HmacSha256 => "HmacSHA256",
            KeyAlgorithm::HmacSha512 => "HmacSHA512",
        }
    }

    pub fn is_asymmetric(self) -> bool {
        self.secret_len().is_none()
    }

    /// Length of freshly generated keys; `None` for asymmetric algorithms.
    pub fn secret_len(self) -> Option<usize> {
        match self {
            KeyAlgorithm::Aes | KeyAlgorithm::ChaCha20 | KeyAlgorithm::HmacSha256 => Some(32),
            KeyAlgorithm::HmacSha512 => Some(64),
            _ => None,
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KeyAlgorithm {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        KeyAlgorithm::ALL
            .into_iter()
            .find(|alg| alg.name() == s)
            .ok_or_else(|| StoreError::UnsupportedType(format!("key algorithm '{s}'")))
    }
}

/// PKCS#8-encoded private key tagged with its algorithm.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    algorithm: KeyAlgorithm,
    der: Zeroizing<Vec<u8>>,
}

impl PrivateKey {
    pub fn new(algorithm: KeyAlgorithm, der: Vec<u8>) -> Result<Self> {
        if !algorithm.is_asymmetric() {
            return Err(StoreError::UnsupportedType(format!(
                "{algorithm} is not a private key algorithm"
            )));
        }
        Ok(Self {
            algorithm,
            der: Zeroizing::new(der),
        })
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Raw symmetric key tagged with its algorithm.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey {
    algorithm: KeyAlgorithm,
    bytes: Zeroizing<Vec<u8>>,
}

impl SecretKey {
    pub fn new(algorithm: KeyAlgorithm, bytes: Vec<u8>) -> Result<Self> {
        if algorithm.is_asymmetric() {
            return Err(StoreError::UnsupportedType(format!(
                "{algorithm} is not a secret key algorithm"
            )));
        }
        Ok(Self {
            algorithm,
            bytes: Zeroizing::new(bytes),
        })
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Certificate in its raw encoding (normally DER). Not validated here.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
}

impl Certificate {
    pub fn from_der(der: Vec<u8>) -> Self {
        Self { der }
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn fingerprint(&self) -> [u8; 32] {
        Sha256::digest(&self.der).into()
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Certificate({})", hex::encode(self.fingerprint()))
    }
}

/// Source of fresh credentials. Key pair and certificate generation live
/// outside this crate; only symmetric keys are produced here.
pub trait CredentialFactory {
    fn secret_key(&self, algorithm: KeyAlgorithm) -> Result<SecretKey>;
}

/// Generates symmetric keys from the OS random generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCredentials;

impl CredentialFactory for RandomCredentials {
    fn secret_key(&self, algorithm: KeyAlgorithm) -> Result<SecretKey> {
        let len = algorithm.secret_len().ok_or_else(|| {
            StoreError::UnsupportedType(format!("cannot generate {algorithm} keys"))
        })?;
        let mut bytes = vec![0u8; len];
        secure_random(&mut bytes)?;
        SecretKey::new(algorithm, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_names_roundtrip() {
        for alg in KeyAlgorithm::ALL {
            assert_eq!(alg.name().parse::<KeyAlgorithm>().unwrap(), alg);
        }
        assert!(matches!(
            "DSA".parse::<KeyAlgorithm>(),
            Err(StoreError::UnsupportedType(_))
        ));
    }

    #[test]
    fn key_types_enforce_algorithm_family() {
        assert!(PrivateKey::new(KeyAlgorithm::Aes, vec![1]).is_err());
        assert!(SecretKey::new(KeyAlgorithm::Ed448, vec![1]).is_err());
        assert!(PrivateKey::new(KeyAlgorithm::Ed448, vec![1]).is_ok());
        assert!(SecretKey::new(KeyAlgorithm::ChaCha20, vec![1]).is_ok());
    }

    #[test]
    fn debug_hides_key_material() {
        let key = SecretKey::new(KeyAlgorithm::Aes, vec![0x5A; 32]).unwrap();
        let rendered = format!("{key:?}");
        assert!(rendered.contains("Aes"));
        assert!(!rendered.contains("90"));
    }

    #[test]
    fn random_credentials_generate_secret_keys() {
        let factory = RandomCredentials;

        let a = factory.secret_key(KeyAlgorithm::HmacSha512).unwrap();
        let b = factory.secret_key(KeyAlgorithm::HmacSha512).unwrap();

        assert_eq!(a.bytes().len(), 64);
        assert_ne!(a, b);
        assert!(factory.secret_key(KeyAlgorithm::Rsa).is_err());
    }
}
