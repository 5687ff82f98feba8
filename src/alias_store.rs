//! Alias store: certificates bound to peer names ("LKAS").

use crate::entry::EntryKind;
use crate::entry::certificate::CertificateEntry;
use crate::entry::credentials::Certificate;
use crate::error::Result;
use crate::store::Store;

/// A store of [`CertificateEntry`] values.
pub type AliasStore = Store<CertificateEntry>;

impl Store<CertificateEntry> {
    pub fn get_certificate_entry(&self, name: &str) -> Result<Option<&CertificateEntry>> {
        self.get(name, EntryKind::Certificate)
    }

    pub fn get_certificate(&self, name: &str) -> Result<Option<&Certificate>> {
        Ok(self
            .get_certificate_entry(name)?
            .map(CertificateEntry::certificate))
    }

    pub fn remove_certificate(&mut self, name: &str) -> Result<CertificateEntry> {
        self.remove(name, EntryKind::Certificate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use tempfile::tempdir;

    #[test]
    fn alias_lookup_and_removal() {
        let dir = tempdir().unwrap();
        let mut store = AliasStore::open(dir.path().join("test.lkas"), "pw").unwrap();
        let cert = Certificate::from_der(vec![0x30, 0x82, 0x01, 0x0A]);

        store.add(CertificateEntry::new("peer", cert.clone())).unwrap();
        assert_eq!(store.get_certificate("peer").unwrap(), Some(&cert));
        assert_eq!(
            store.get_certificate_entry("peer").unwrap().map(|e| e.to_string()),
            Some(CertificateEntry::new("peer", cert.clone()).to_string())
        );

        store.remove_certificate("peer").unwrap();
        assert_eq!(store.get_certificate("peer").unwrap(), None);
        assert!(matches!(
            store.remove_certificate("peer"),
            Err(StoreError::NotFound { .. })
        ));
    }
}
