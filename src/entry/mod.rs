//! Named records stored one per chunk.
//!
//! Both store variants share [`StoreEntry`]; the concrete encodings live in
//! [`keystore`] (typed keys and certificates) and [`certificate`] (alias
//! bindings).

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use zeroize::Zeroizing;

use crate::error::{Result, StoreError};
use crate::format::MAGIC_LEN;

pub mod certificate;
pub mod credentials;
pub mod keystore;

/// What an entry holds. The discriminant is the on-disk kind byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Private = 0,
    Certificate = 1,
    Secret = 2,
}

impl EntryKind {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            0 => Ok(EntryKind::Private),
            1 => Ok(EntryKind::Certificate),
            2 => Ok(EntryKind::Secret),
            other => Err(StoreError::UnsupportedType(format!(
                "entry kind {other} (range is 0-2)"
            ))),
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Private => f.write_str("private key"),
            EntryKind::Certificate => f.write_str("certificate"),
            EntryKind::Secret => f.write_str("secret key"),
        }
    }
}

impl FromStr for EntryKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "private" => Ok(EntryKind::Private),
            "certificate" | "cert" => Ok(EntryKind::Certificate),
            "secret" => Ok(EntryKind::Secret),
            other => Err(StoreError::UnsupportedType(format!("entry kind '{other}'"))),
        }
    }
}

/// A record one store variant persists.
pub trait StoreEntry: Clone + PartialEq + fmt::Display + Sized {
    /// Magic bytes of the store file holding this entry type.
    const MAGIC: &'static [u8; MAGIC_LEN];
    /// Human-readable store name for logs.
    const STORE_NAME: &'static str;

    fn name(&self) -> &str;

    fn kind(&self) -> EntryKind;

    /// Serialize into one chunk's plaintext.
    fn encode(&self) -> Result<Zeroizing<Vec<u8>>>;

    /// Parse one chunk's plaintext.
    fn parse(bytes: &[u8]) -> Result<Self>;

    /// SHA-256 over the stored value bytes.
    fn fingerprint(&self) -> [u8; 32];

    fn matches(&self, name: &str, kind: EntryKind) -> bool {
        self.name() == name && self.kind() == kind
    }
}

/// Cursor over an entry buffer; every read is bounds checked.
pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let available = self.buf.len() - self.pos;
        if len > available {
            return Err(StoreError::ShortBuffer {
                needed: len,
                available,
            });
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        let mut b = [0u8; 2];
        b.copy_from_slice(self.take(2)?);
        Ok(u16::from_be_bytes(b))
    }

    pub fn u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(b))
    }

    /// A `u32` length followed by that many bytes.
    pub fn prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    pub fn name(&mut self) -> Result<String> {
        let raw = self.prefixed()?;
        let name = std::str::from_utf8(raw)
            .map_err(|_| StoreError::format("entry name is not valid UTF-8"))?;
        if name.is_empty() {
            return Err(StoreError::format("entry name is empty"));
        }
        Ok(name.to_owned())
    }

    pub fn rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }

    pub fn finish(&self) -> Result<()> {
        if self.pos != self.buf.len() {
            return Err(StoreError::format(format!(
                "{} trailing bytes after entry",
                self.buf.len() - self.pos
            )));
        }
        Ok(())
    }
}

pub(crate) fn put_prefixed(out: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| StoreError::format("entry field exceeds 4 GiB"))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}
