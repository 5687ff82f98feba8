//! Error types for store operations.

use thiserror::Error;

use crate::entry::EntryKind;

/// Errors surfaced by the chunk codec, the entry codecs and both stores.
///
/// Crypto and format failures are never retried or swallowed; a tampered or
/// corrupted store always reaches the caller as one of these.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Bad magic, malformed chunk framing or malformed entry encoding.
    #[error("invalid store format: {0}")]
    Format(String),

    /// Wrong password (verification pattern mismatch) or an AEAD tag failure.
    #[error("invalid password or corrupted data")]
    Authentication,

    /// A declared length runs past the available bytes.
    #[error("truncated data: need {needed} bytes, {available} available")]
    ShortBuffer {
        /// Bytes the framing asked for.
        needed: usize,
        /// Bytes actually present.
        available: usize,
    },

    /// No entry with this name and kind.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Requested entry name.
        name: String,
        /// Requested entry kind.
        kind: EntryKind,
    },

    /// An entry with this name and kind is already stored.
    #[error("{kind} '{name}' already exists")]
    AlreadyExists {
        /// Conflicting entry name.
        name: String,
        /// Conflicting entry kind.
        kind: EntryKind,
    },

    /// Entry names must be non-empty.
    #[error("entry name must not be empty")]
    InvalidName,

    /// Unknown entry kind byte or unrecognised key algorithm.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// The store was already closed or destroyed.
    #[error("store already closed or destroyed")]
    IllegalState,

    /// The OS random generator failed.
    #[error("OS random generator unavailable")]
    Random,

    /// Underlying file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        StoreError::Format(msg.into())
    }

    /// Returns `true` for framing failures, including truncation.
    pub fn is_format(&self) -> bool {
        matches!(self, StoreError::Format(_) | StoreError::ShortBuffer { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
