//! File access for store files.
//!
//! `ChunkFile` is the single read/write handle an open store keeps for
//! in-place updates; `replace_file` rewrites a whole store atomically.

use crate::crypto::aead::secure_random;
use crate::error::{Result, StoreError};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Read exactly `buf.len()` bytes, reporting truncation as `ShortBuffer`.
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(StoreError::ShortBuffer {
                    needed: buf.len(),
                    available: filled,
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Positioned read/write handle on a store file.
#[derive(Debug)]
pub(crate) struct ChunkFile {
    file: File,
}

impl ChunkFile {
    /// Opens the file for reading and writing, creating it if missing.
    ///
    /// Creates parent directories if they don't exist. New files are only
    /// readable by the owner on Unix.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true).truncate(false);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        Ok(Self {
            file: options.open(path)?,
        })
    }

    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        read_full(&mut self.file, &mut buf)?;
        Ok(buf)
    }

    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }

    /// Moves `len` raw bytes from `from` to `to`. The regions may overlap
    /// only when `to < from`.
    pub fn relocate(&mut self, from: u64, to: u64, len: usize) -> Result<()> {
        let bytes = self.read_at(from, len)?;
        self.write_at(to, &bytes)
    }

    pub fn truncate(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        Ok(())
    }

    /// Flushes data and metadata to disk.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

impl Read for ChunkFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for ChunkFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

/// Replaces the file at `path` with `data` using an atomic write.
///
/// This method ensures crash-safety by:
/// 1. Writing data to a temporary file with random name
/// 2. Syncing the temporary file to disk
/// 3. Atomically replacing the old file with the new one
/// 4. Syncing the parent directory to ensure the rename is persisted
///
/// If a crash occurs, either the old or new file will be present,
/// never a corrupted partial write.
pub(crate) fn replace_file(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = random_tmp_path(path)?;

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    // securely create temp file (fail if exists)
    let mut tmp_file = options.open(&tmp_path)?;

    tmp_file.write_all(data)?;
    tmp_file.sync_all()?;
    drop(tmp_file);

    if let Err(e) = atomic_replace(path, &tmp_path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    #[cfg(not(target_os = "windows"))]
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        File::open(parent)?.sync_all()?;
    }

    Ok(())
}

/// Generates a unique temporary file path in the same directory.
///
/// Format: `filename.tmp.<randomhex>`
fn random_tmp_path(path: &Path) -> Result<PathBuf> {
    let mut buf = [0u8; 8]; // 64 bit entropy
    secure_random(&mut buf)?;

    let file_name = path
        .file_name()
        .ok_or_else(|| StoreError::Io(io::Error::other("store path has no file name")))?
        .to_string_lossy();

    let tmp_name = format!("{}.tmp.{}", file_name, hex::encode(buf));

    Ok(path.with_file_name(tmp_name))
}

/// Atomically replaces the target file with the temporary file.
///
/// Uses Windows `ReplaceFileW` API with `REPLACEFILE_WRITE_THROUGH` flag
/// so the replacement is persisted before returning.
#[cfg(target_os = "windows")]
fn atomic_replace(target: &Path, tmp_path: &Path) -> Result<()> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

    fn to_wide(s: &OsStr) -> Vec<u16> {
        s.encode_wide().chain(std::iter::once(0)).collect()
    }

    let target_w = to_wide(target.as_os_str());
    let tmp_w = to_wide(tmp_path.as_os_str());

    // SAFETY:
    // - Strings are valid UTF-16 and null-terminated
    // - Pointers remain valid during the call
    // - Windows does not retain the pointers after return
    let result = unsafe {
        ReplaceFileW(
            target_w.as_ptr(),
            tmp_w.as_ptr(),
            std::ptr::null(),
            REPLACEFILE_WRITE_THROUGH,
            std::ptr::null(),
            std::ptr::null(),
        )
    };

    if result == 0 {
        return Err(io::Error::last_os_error().into());
    }

    Ok(())
}

/// On Unix, `rename()` is atomic when both paths are on the same filesystem.
#[cfg(not(target_os = "windows"))]
fn atomic_replace(target: &Path, tmp_path: &Path) -> Result<()> {
    fs::rename(tmp_path, target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    // --------------------------------------------------
    // CHUNK FILE
    // --------------------------------------------------

    #[test]
    fn open_creates_missing_file_and_parents() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join("store.lks");

        let file = ChunkFile::open(&nested).unwrap();

        assert!(nested.exists());
        assert_eq!(file.len().unwrap(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn new_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("store.lks");
        ChunkFile::open(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[test]
    fn write_then_read_at_offset() {
        let dir = tempdir().unwrap();
        let mut file = ChunkFile::open(&dir.path().join("store.lks")).unwrap();

        file.write_at(0, b"hello world").unwrap();
        file.write_at(6, b"WORLD").unwrap();

        assert_eq!(file.read_at(0, 11).unwrap(), b"hello WORLD");
    }

    #[test]
    fn read_past_end_is_short_buffer() {
        let dir = tempdir().unwrap();
        let mut file = ChunkFile::open(&dir.path().join("store.lks")).unwrap();
        file.write_at(0, b"abc").unwrap();

        match file.read_at(1, 5) {
            Err(StoreError::ShortBuffer { needed, available }) => {
                assert_eq!(needed, 5);
                assert_eq!(available, 2);
            }
            other => panic!("expected ShortBuffer, got: {other:?}"),
        }
    }

    #[test]
    fn relocate_moves_bytes_backwards_then_truncate() {
        let dir = tempdir().unwrap();
        let mut file = ChunkFile::open(&dir.path().join("store.lks")).unwrap();
        file.write_at(0, b"AAAABBBBCCCC").unwrap();

        // drop the B block
        file.relocate(8, 4, 4).unwrap();
        file.truncate(8).unwrap();

        assert_eq!(file.len().unwrap(), 8);
        assert_eq!(file.read_at(0, 8).unwrap(), b"AAAACCCC");
    }

    // --------------------------------------------------
    // ATOMIC REPLACE
    // --------------------------------------------------

    #[test]
    fn replace_overwrites_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.lks");
        fs::write(&path, b"first version, longer").unwrap();

        replace_file(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn tmp_file_is_removed_after_success() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.lks");

        replace_file(&path, b"data").unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0], "store.lks");
    }

    #[test]
    fn tmp_paths_are_unique_siblings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.lks");

        let a = random_tmp_path(&path).unwrap();
        let b = random_tmp_path(&path).unwrap();

        assert_ne!(a, b);
        assert_ne!(a, path);
        assert_eq!(a.parent(), path.parent());
    }
}
