//! The chunked, password-protected store shared by the keystore and the
//! alias store.
//!
//! A store owns the file handle, the master key and an in-memory mirror of
//! every entry. Each mutation writes the file and the mirror in the same
//! call and returns only after the data has been synced.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use crate::chunk::{ChunkCodec, peek_length, read_chunk};
use crate::crypto::{self, MasterKey, SALT_LEN};
use crate::entry::{EntryKind, StoreEntry};
use crate::error::{Result, StoreError};
use crate::format::{CHUNK0_OFFSET, Header, Manifest};
use crate::storage::{self, ChunkFile};

/// A store file opened with its password.
///
/// Not synchronised: callers sharing one store across threads must
/// serialise access themselves.
pub struct Store<E: StoreEntry> {
    path: PathBuf,
    state: Option<OpenState<E>>,
}

struct OpenState<E> {
    file: ChunkFile,
    key: MasterKey,
    entries: Vec<E>,
    /// End of the last counted entry chunk.
    data_end: u64,
}

impl<E: StoreEntry> Store<E> {
    /// Opens the store at `path`, creating it when the file is missing or
    /// empty.
    ///
    /// # Errors
    ///
    /// - `Format`/`ShortBuffer` if the file is not a store of this type
    /// - `Authentication` if the password is wrong or a chunk was tampered with
    /// - `UnsupportedType` if an entry uses an unknown kind or algorithm
    pub fn open(path: impl AsRef<Path>, password: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = ChunkFile::open(&path)?;

        let state = if file.len()? == 0 {
            let state = Self::initialize(file, password)?;
            info!(store = E::STORE_NAME, path = %path.display(), "created new store");
            state
        } else {
            let state = Self::load(file, password)?;
            debug!(
                store = E::STORE_NAME,
                path = %path.display(),
                entries = state.entries.len(),
                "store opened"
            );
            state
        };

        Ok(Self {
            path,
            state: Some(state),
        })
    }

    fn initialize(mut file: ChunkFile, password: &str) -> Result<OpenState<E>> {
        let salt = crypto::generate_salt()?;
        let key = crypto::derive_key(password, &salt);
        let image = build_image::<E>(&key, &salt, &[])?;

        file.write_at(0, &image)?;
        file.sync()?;

        Ok(OpenState {
            file,
            key,
            entries: Vec::new(),
            data_end: image.len() as u64,
        })
    }

    fn load(mut file: ChunkFile, password: &str) -> Result<OpenState<E>> {
        file.seek(SeekFrom::Start(0))?;
        let header = Header::read(&mut file, E::MAGIC)?;
        let key = crypto::derive_key(password, header.salt());
        let codec = ChunkCodec::new(&key);

        // chunk 0 must open before any entry is looked at
        let chunk0 = read_chunk(&mut file)?;
        let manifest = Manifest::decode(&codec.decode(&chunk0)?)?;

        let count = manifest.entry_count();
        let mut entries = Vec::new();
        for _ in 0..count {
            let chunk = read_chunk(&mut file)?;
            entries.push(E::parse(&codec.decode(&chunk)?)?);
        }

        let data_end = file.stream_position()?;
        let len = file.len()?;
        if len > data_end {
            warn!(
                store = E::STORE_NAME,
                orphaned = len - data_end,
                "discarding bytes after the last counted entry"
            );
            file.truncate(data_end)?;
            file.sync()?;
        }

        Ok(OpenState {
            file,
            key,
            entries,
            data_end,
        })
    }

    fn state(&self) -> Result<&OpenState<E>> {
        self.state.as_ref().ok_or(StoreError::IllegalState)
    }

    fn state_mut(&mut self) -> Result<&mut OpenState<E>> {
        self.state.as_mut().ok_or(StoreError::IllegalState)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    /// Persists `entry` and adds it to the mirror.
    ///
    /// The entry chunk is appended and synced before chunk 0's count is
    /// bumped, so an interrupted add reopens as if it never started.
    pub fn add(&mut self, entry: E) -> Result<()> {
        let state = self.state_mut()?;

        if entry.name().is_empty() {
            return Err(StoreError::InvalidName);
        }
        if state.find(entry.name(), entry.kind()).is_some() {
            return Err(StoreError::AlreadyExists {
                name: entry.name().to_owned(),
                kind: entry.kind(),
            });
        }

        let chunk = ChunkCodec::new(&state.key).encode(&entry.encode()?)?;

        if state.file.len()? > state.data_end {
            state.file.truncate(state.data_end)?;
        }
        state.file.write_at(state.data_end, &chunk)?;
        state.file.sync()?;

        state.rewrite_count(|m| Ok(m.incremented()))?;
        state.data_end += chunk.len() as u64;

        debug!(
            store = E::STORE_NAME,
            name = entry.name(),
            kind = %entry.kind(),
            "entry added"
        );
        state.entries.push(entry);
        Ok(())
    }

    /// Deletes the entry with this name and kind from the file and the
    /// mirror, returning it.
    ///
    /// Later chunks are moved back over the removed one byte for byte, the
    /// file is shortened and chunk 0's count is decremented.
    pub fn remove(&mut self, name: &str, kind: EntryKind) -> Result<E> {
        let state = self.state_mut()?;

        let (start, size, removed) = state.locate(name, kind)?;

        let mut from = start + size;
        while from < state.data_end {
            state.file.seek(SeekFrom::Start(from))?;
            let len = peek_length(&mut state.file)?;
            state.file.relocate(from, from - size, len)?;
            from += len as u64;
        }
        state.file.truncate(state.data_end - size)?;
        state.data_end -= size;

        // the chunk is gone from disk; the mirror follows even if the count
        // update below fails
        if let Some(idx) = state.entries.iter().position(|e| e.matches(name, kind)) {
            state.entries.remove(idx);
        }

        state.file.sync()?;
        state.rewrite_count(Manifest::decremented)?;

        debug!(store = E::STORE_NAME, name, kind = %kind, "entry removed");
        Ok(removed)
    }

    pub fn get(&self, name: &str, kind: EntryKind) -> Result<Option<&E>> {
        Ok(self.state()?.find(name, kind))
    }

    /// Snapshot of all entries in file order.
    pub fn entries(&self) -> Result<Vec<E>> {
        Ok(self.state()?.entries.clone())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.state()?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.state()?.entries.is_empty())
    }

    /// Re-encrypts the whole store under `new_password`.
    ///
    /// A complete image with a fresh header salt is written next to the store
    /// and renamed over it, so either the old or the new store survives a
    /// crash.
    ///
    /// If the new file cannot be reopened after the rename, the store is
    /// closed: the old handle points at a file that is no longer at `path`.
    pub fn change_password(&mut self, new_password: &str) -> Result<()> {
        let entries = &self.state()?.entries;
        let salt = crypto::generate_salt()?;
        let key = crypto::derive_key(new_password, &salt);
        let image = build_image::<E>(&key, &salt, entries)?;

        storage::replace_file(&self.path, &image)?;

        let reopened = ChunkFile::open(&self.path);
        self.install_rekeyed(reopened, key, image.len() as u64)?;

        info!(store = E::STORE_NAME, path = %self.path.display(), "store re-keyed");
        Ok(())
    }

    fn install_rekeyed(
        &mut self,
        reopened: Result<ChunkFile>,
        key: MasterKey,
        data_end: u64,
    ) -> Result<()> {
        let file = match reopened {
            Ok(file) => file,
            Err(e) => {
                warn!(
                    store = E::STORE_NAME,
                    path = %self.path.display(),
                    error = %e,
                    "re-keyed store could not be reopened; closing"
                );
                self.state = None;
                return Err(e);
            }
        };

        let state = self.state_mut()?;
        state.file = file;
        state.key = key;
        state.data_end = data_end;
        Ok(())
    }

    /// Writes a complete store image holding `entries` to `out`.
    pub fn write_image<W: Write>(out: &mut W, password: &str, entries: &[E]) -> Result<()> {
        for (i, entry) in entries.iter().enumerate() {
            if entry.name().is_empty() {
                return Err(StoreError::InvalidName);
            }
            if entries[..i].iter().any(|e| e.matches(entry.name(), entry.kind())) {
                return Err(StoreError::AlreadyExists {
                    name: entry.name().to_owned(),
                    kind: entry.kind(),
                });
            }
        }

        let salt = crypto::generate_salt()?;
        let key = crypto::derive_key(password, &salt);
        let image = build_image::<E>(&key, &salt, entries)?;
        out.write_all(&image)?;
        out.flush()?;
        Ok(())
    }

    /// Syncs and releases the file, wiping the master key.
    pub fn close(&mut self) -> Result<()> {
        let state = self.state.take().ok_or(StoreError::IllegalState)?;
        let result = state.file.sync();
        drop(state);
        debug!(store = E::STORE_NAME, "store closed");
        result
    }

    /// Like [`close`](Self::close), but the key bytes and the mirror are
    /// wiped explicitly before anything else happens.
    pub fn destroy(&mut self) -> Result<()> {
        let mut state = self.state.take().ok_or(StoreError::IllegalState)?;
        state.key.zeroize();
        state.entries.clear();
        let result = state.file.sync();
        drop(state);
        debug!(store = E::STORE_NAME, "store destroyed");
        result
    }
}

impl<E: StoreEntry> OpenState<E> {
    fn find(&self, name: &str, kind: EntryKind) -> Option<&E> {
        self.entries.iter().find(|e| e.matches(name, kind))
    }

    /// Scans the entry chunks in file order for `(name, kind)`, returning the
    /// chunk's offset, its on-disk size and the decoded entry.
    fn locate(&mut self, name: &str, kind: EntryKind) -> Result<(u64, u64, E)> {
        let codec = ChunkCodec::new(&self.key);

        self.file.seek(SeekFrom::Start(CHUNK0_OFFSET))?;
        let mut offset = CHUNK0_OFFSET + peek_length(&mut self.file)? as u64;

        while offset < self.data_end {
            self.file.seek(SeekFrom::Start(offset))?;
            let chunk = read_chunk(&mut self.file)?;
            let entry = E::parse(&codec.decode(&chunk)?)?;
            if entry.matches(name, kind) {
                return Ok((offset, chunk.len() as u64, entry));
            }
            offset += chunk.len() as u64;
        }

        Err(StoreError::NotFound {
            name: name.to_owned(),
            kind,
        })
    }

    /// Re-reads chunk 0, applies `change` to the count and writes it back in
    /// place with the next IV.
    fn rewrite_count(&mut self, change: impl FnOnce(Manifest) -> Result<Manifest>) -> Result<()> {
        let codec = ChunkCodec::new(&self.key);

        self.file.seek(SeekFrom::Start(CHUNK0_OFFSET))?;
        let chunk0 = read_chunk(&mut self.file)?;
        let manifest = change(Manifest::decode(&codec.decode(&chunk0)?)?)?;

        let updated = codec.update(&chunk0, &manifest.encode())?;
        if updated.len() != chunk0.len() {
            return Err(StoreError::format("chunk 0 changed size"));
        }
        self.file.write_at(CHUNK0_OFFSET, &updated)?;
        self.file.sync()
    }
}

/// Header, chunk 0 and one chunk per entry.
fn build_image<E: StoreEntry>(
    key: &MasterKey,
    salt: &[u8; SALT_LEN],
    entries: &[E],
) -> Result<Vec<u8>> {
    let codec = ChunkCodec::new(key);

    let mut image = Header::new(E::MAGIC, *salt).to_bytes();
    image.extend(codec.encode(&Manifest::new(entries.len() as u64).encode())?);
    for entry in entries {
        image.extend(codec.encode(&entry.encode()?)?);
    }
    Ok(image)
}

/// Open stores are equal when their entries and master keys match.
///
/// Comparing with a closed store returns `false` instead of failing, since
/// `eq` has no error channel. `Hash` likewise writes a constant for a closed
/// store. Use [`Store::is_open`] first when the difference matters.
impl<E: StoreEntry> PartialEq for Store<E> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.state, &other.state) {
            (Some(a), Some(b)) => a.entries == b.entries && a.key == b.key,
            _ => false,
        }
    }
}

impl<E: StoreEntry> Hash for Store<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let Some(open) = &self.state else {
            state.write_u8(0);
            return;
        };

        // key material only enters through a one-way digest
        let mut digest = Sha256::new();
        digest.update(open.key.digest());
        for entry in &open.entries {
            digest.update(entry.name().as_bytes());
            digest.update([entry.kind().id()]);
            digest.update(entry.fingerprint());
        }
        let out = digest.finalize();
        state.write(&out[..8]);
    }
}

impl<E: StoreEntry> fmt::Debug for Store<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Store");
        s.field("kind", &E::STORE_NAME).field("path", &self.path);
        match &self.state {
            Some(state) => s.field("entries", &state.entries.len()),
            None => s.field("closed", &true),
        };
        s.finish()
    }
}
