//! Password-protected, chunk-encrypted stores for keys and certificates.
//!
//! A store file is a plaintext header followed by independently encrypted
//! chunks, so single entries can be appended or cut out in place:
//!
//! ```text
//! MAGIC (4) | SALT (32) | CHUNK0 (verification + count) | ENTRY CHUNK ...
//! ```
//!
//! [`Keystore`] holds private keys, secret keys and certificates;
//! [`AliasStore`] binds peer names to certificates.

mod alias_store;
pub mod chunk;
pub mod crypto;
pub mod entry;
mod error;
pub mod format;
mod keystore;
mod storage;
mod store;

pub use crate::alias_store::AliasStore;
pub use crate::entry::certificate::CertificateEntry;
pub use crate::entry::credentials::{
    Certificate, CredentialFactory, KeyAlgorithm, PrivateKey, RandomCredentials, SecretKey,
};
pub use crate::entry::keystore::{EntryValue, KeystoreEntry};
pub use crate::entry::{EntryKind, StoreEntry};
pub use crate::error::{Result, StoreError};
pub use crate::keystore::Keystore;
pub use crate::store::Store;

use anyhow::Context;
use directories::ProjectDirs;
use std::path::PathBuf;

/// Default keystore location in the platform data directory.
pub fn default_keystore_path() -> anyhow::Result<PathBuf> {
    Ok(data_dir()?.join("keychain.lks"))
}

/// Default alias store location in the platform data directory.
pub fn default_alias_store_path() -> anyhow::Result<PathBuf> {
    Ok(data_dir()?.join("aliases.lkas"))
}

fn data_dir() -> anyhow::Result<PathBuf> {
    let project_dirs =
        ProjectDirs::from("", "", "keychain").context("could not determine platform directories")?;
    Ok(project_dirs.data_dir().to_path_buf())
}
