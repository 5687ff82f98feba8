//! Alias store entry: a name bound to a certificate.
//!
//! ```text
//! NAME_LEN (4) | NAME | CERT_LEN (4) | CERT
//! ```

use std::fmt;

use zeroize::Zeroizing;

use super::credentials::Certificate;
use super::{ByteReader, EntryKind, StoreEntry, put_prefixed};
use crate::error::Result;
use crate::format::ALIAS_STORE_MAGIC;

#[derive(Clone, PartialEq, Eq)]
pub struct CertificateEntry {
    name: String,
    certificate: Certificate,
}

impl CertificateEntry {
    pub fn new(name: impl Into<String>, certificate: Certificate) -> Self {
        Self {
            name: name.into(),
            certificate,
        }
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }
}

impl StoreEntry for CertificateEntry {
    const MAGIC: &'static [u8; 4] = ALIAS_STORE_MAGIC;
    const STORE_NAME: &'static str = "alias store";

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EntryKind {
        EntryKind::Certificate
    }

    fn encode(&self) -> Result<Zeroizing<Vec<u8>>> {
        let der = self.certificate.der();
        let mut out = Zeroizing::new(Vec::with_capacity(8 + self.name.len() + der.len()));
        put_prefixed(&mut out, self.name.as_bytes())?;
        put_prefixed(&mut out, der)?;
        Ok(out)
    }

    fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let name = reader.name()?;
        let der = reader.prefixed()?.to_vec();
        reader.finish()?;

        Ok(Self::new(name, Certificate::from_der(der)))
    }

    fn fingerprint(&self) -> [u8; 32] {
        self.certificate.fingerprint()
    }
}

impl fmt::Display for CertificateEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cert[name={},fingerprint={}]",
            self.name,
            hex::encode(self.fingerprint())
        )
    }
}

impl fmt::Debug for CertificateEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn layout_and_parse() {
        let entry = CertificateEntry::new("test1", Certificate::from_der(vec![0x30, 1, 2]));
        let bytes = entry.encode().unwrap();

        assert_eq!(
            bytes.as_slice(),
            &[0, 0, 0, 5, b't', b'e', b's', b't', b'1', 0, 0, 0, 3, 0x30, 1, 2]
        );
        assert_eq!(CertificateEntry::parse(&bytes).unwrap(), entry);
    }

    #[test]
    fn truncated_certificate_is_short_buffer() {
        let entry = CertificateEntry::new("test1", Certificate::from_der(vec![0x30; 10]));
        let bytes = entry.encode().unwrap();

        assert!(matches!(
            CertificateEntry::parse(&bytes[..bytes.len() - 1]),
            Err(StoreError::ShortBuffer { .. })
        ));
    }

    #[test]
    fn display_names_entry() {
        let entry = CertificateEntry::new("peer", Certificate::from_der(vec![1]));
        assert!(entry.to_string().starts_with("cert[name=peer,fingerprint="));
    }
}
