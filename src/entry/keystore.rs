//! Keystore entry encoding.
//!
//! ```text
//! NAME_LEN (4) | NAME | KIND (1) | PAYLOAD_LEN (4) | PAYLOAD
//! ```
//!
//! Key payloads are `ALGO_LEN (2) | ALGO | KEY BYTES`; certificate payloads
//! are the raw certificate encoding.

use std::fmt;

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::credentials::{Certificate, KeyAlgorithm, PrivateKey, SecretKey};
use super::{ByteReader, EntryKind, StoreEntry, put_prefixed};
use crate::error::{Result, StoreError};
use crate::format::KEYSTORE_MAGIC;

/// The value of a keystore entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryValue {
    Private(PrivateKey),
    Certificate(Certificate),
    Secret(SecretKey),
}

/// A named private key, certificate or secret key.
#[derive(Clone, PartialEq, Eq)]
pub struct KeystoreEntry {
    name: String,
    value: EntryValue,
}

impl KeystoreEntry {
    pub fn private(name: impl Into<String>, key: PrivateKey) -> Self {
        Self {
            name: name.into(),
            value: EntryValue::Private(key),
        }
    }

    pub fn certificate(name: impl Into<String>, cert: Certificate) -> Self {
        Self {
            name: name.into(),
            value: EntryValue::Certificate(cert),
        }
    }

    pub fn secret(name: impl Into<String>, key: SecretKey) -> Self {
        Self {
            name: name.into(),
            value: EntryValue::Secret(key),
        }
    }

    pub fn value(&self) -> &EntryValue {
        &self.value
    }

    pub fn as_private(&self) -> Option<&PrivateKey> {
        match &self.value {
            EntryValue::Private(key) => Some(key),
            _ => None,
        }
    }

    pub fn as_certificate(&self) -> Option<&Certificate> {
        match &self.value {
            EntryValue::Certificate(cert) => Some(cert),
            _ => None,
        }
    }

    pub fn as_secret(&self) -> Option<&SecretKey> {
        match &self.value {
            EntryValue::Secret(key) => Some(key),
            _ => None,
        }
    }

    /// Stored value bytes: PKCS#8, raw key or certificate encoding.
    fn value_bytes(&self) -> &[u8] {
        match &self.value {
            EntryValue::Private(key) => key.der(),
            EntryValue::Certificate(cert) => cert.der(),
            EntryValue::Secret(key) => key.bytes(),
        }
    }
}

fn encode_key_payload(algorithm: KeyAlgorithm, key: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let algo = algorithm.name().as_bytes();
    let algo_len = u16::try_from(algo.len())
        .map_err(|_| StoreError::format("algorithm name too long"))?;

    let mut payload = Zeroizing::new(Vec::with_capacity(2 + algo.len() + key.len()));
    payload.extend_from_slice(&algo_len.to_be_bytes());
    payload.extend_from_slice(algo);
    payload.extend_from_slice(key);
    Ok(payload)
}

fn parse_key_payload(payload: &[u8]) -> Result<(KeyAlgorithm, Vec<u8>)> {
    let mut reader = ByteReader::new(payload);
    let algo_len = reader.u16()? as usize;
    let algo = std::str::from_utf8(reader.take(algo_len)?)
        .map_err(|_| StoreError::format("algorithm name is not valid UTF-8"))?;
    let algorithm = algo.parse::<KeyAlgorithm>()?;
    Ok((algorithm, reader.rest().to_vec()))
}

impl StoreEntry for KeystoreEntry {
    const MAGIC: &'static [u8; 4] = KEYSTORE_MAGIC;
    const STORE_NAME: &'static str = "keystore";

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EntryKind {
        match self.value {
            EntryValue::Private(_) => EntryKind::Private,
            EntryValue::Certificate(_) => EntryKind::Certificate,
            EntryValue::Secret(_) => EntryKind::Secret,
        }
    }

    fn encode(&self) -> Result<Zeroizing<Vec<u8>>> {
        let payload = match &self.value {
            EntryValue::Private(key) => encode_key_payload(key.algorithm(), key.der())?,
            EntryValue::Secret(key) => encode_key_payload(key.algorithm(), key.bytes())?,
            EntryValue::Certificate(cert) => Zeroizing::new(cert.der().to_vec()),
        };

        let mut out = Zeroizing::new(Vec::with_capacity(9 + self.name.len() + payload.len()));
        put_prefixed(&mut out, self.name.as_bytes())?;
        out.push(self.kind().id());
        put_prefixed(&mut out, &payload)?;
        Ok(out)
    }

    fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let name = reader.name()?;
        let kind = EntryKind::from_id(reader.u8()?)?;
        let payload = reader.prefixed()?;
        reader.finish()?;

        let value = match kind {
            EntryKind::Certificate => EntryValue::Certificate(Certificate::from_der(payload.to_vec())),
            EntryKind::Private => {
                let (algorithm, der) = parse_key_payload(payload)?;
                EntryValue::Private(PrivateKey::new(algorithm, der)?)
            }
            EntryKind::Secret => {
                let (algorithm, key) = parse_key_payload(payload)?;
                EntryValue::Secret(SecretKey::new(algorithm, key)?)
            }
        };

        Ok(Self { name, value })
    }

    fn fingerprint(&self) -> [u8; 32] {
        Sha256::digest(self.value_bytes()).into()
    }
}

impl fmt::Display for KeystoreEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entry[kind={},name={},fingerprint={}]",
            self.kind(),
            self.name,
            hex::encode(self.fingerprint())
        )
    }
}

impl fmt::Debug for KeystoreEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
