//! Keystore: private keys, certificates and secret keys by name ("LKKS").

use crate::entry::credentials::{Certificate, PrivateKey, SecretKey};
use crate::entry::keystore::KeystoreEntry;
use crate::entry::{EntryKind, StoreEntry};
use crate::error::Result;
use crate::store::Store;

/// A store of [`KeystoreEntry`] values. One name may hold one entry of each
/// kind.
pub type Keystore = Store<KeystoreEntry>;

impl Store<KeystoreEntry> {
    pub fn get_private(&self, name: &str) -> Result<Option<&PrivateKey>> {
        Ok(self
            .get(name, EntryKind::Private)?
            .and_then(KeystoreEntry::as_private))
    }

    pub fn get_certificate(&self, name: &str) -> Result<Option<&Certificate>> {
        Ok(self
            .get(name, EntryKind::Certificate)?
            .and_then(KeystoreEntry::as_certificate))
    }

    pub fn get_secret(&self, name: &str) -> Result<Option<&SecretKey>> {
        Ok(self
            .get(name, EntryKind::Secret)?
            .and_then(KeystoreEntry::as_secret))
    }

    pub fn has_private(&self, name: &str) -> Result<bool> {
        Ok(self.get_private(name)?.is_some())
    }

    pub fn has_certificate(&self, name: &str) -> Result<bool> {
        Ok(self.get_certificate(name)?.is_some())
    }

    pub fn has_secret(&self, name: &str) -> Result<bool> {
        Ok(self.get_secret(name)?.is_some())
    }

    /// Names of all entries of one kind, in file order.
    pub fn names(&self, kind: EntryKind) -> Result<Vec<String>> {
        Ok(self
            .entries()?
            .iter()
            .filter(|e| e.kind() == kind)
            .map(|e| e.name().to_owned())
            .collect())
    }
}
