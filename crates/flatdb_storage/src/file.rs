//! File-based backing for persistent databases.

use crate::backing::Backing;
use crate::error::StorageResult;
use crate::span;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A file-based backing store.
///
/// The handle and its cached length live behind one mutex, taken once per
/// operation: positional reads have to seek the shared descriptor, so even
/// `&self` reads go through it. The cached length tracks every write and
/// truncation, which lets bounds checks and end-of-store placement run
/// without touching file metadata.
///
/// # Durability
///
/// - `flush()` pushes buffered data to the OS
/// - `sync()` additionally forces data and metadata to disk
///
/// # Example
///
/// ```no_run
/// use flatdb_storage::{Backing, FileBacking};
/// use std::path::Path;
///
/// let mut backing = FileBacking::open(Path::new("data.fdb")).unwrap();
/// backing.write_at(0, b"persistent data").unwrap();
/// backing.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBacking {
    path: PathBuf,
    inner: Mutex<FileInner>,
}

#[derive(Debug)]
struct FileInner {
    file: File,
    len: u64,
}

impl FileInner {
    /// Seeks the descriptor and reads exactly `buf.len()` bytes.
    fn read_span(&mut self, offset: u64, buf: &mut [u8]) -> StorageResult<()> {
        if buf.is_empty() {
            return Ok(());
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Seeks the descriptor, writes `data`, and grows the cached length
    /// when the write extends past the end.
    fn write_span(&mut self, offset: u64, data: &[u8]) -> StorageResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.len = self.len.max(offset + data.len() as u64);
        Ok(())
    }
}

impl FileBacking {
    /// Opens or creates a file backing at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Self::from_file(path, file)
    }

    /// Opens an existing file backing read-only at the file level.
    ///
    /// The file must exist. Writes through the [`Backing`] trait will fail
    /// with an I/O error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be opened.
    pub fn open_read_only(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Self::from_file(path, file)
    }

    fn from_file(path: &Path, file: File) -> StorageResult<Self> {
        let len = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(FileInner { file, len }),
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Backing for FileBacking {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let mut inner = self.inner.lock();
        span::check_read(offset, len, inner.len)?;

        let mut buf = vec![0u8; len];
        inner.read_span(offset, &mut buf)?;
        Ok(buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()> {
        self.inner.lock().write_span(offset, data)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        // Appending is placing at the current end
        let mut inner = self.inner.lock();
        let offset = inner.len;
        inner.write_span(offset, data)?;
        Ok(offset)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        span::check_truncate(new_size, inner.len)?;

        inner.file.set_len(new_size)?;
        inner.len = new_size;
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.lock().file.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.inner.lock().len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.fdb");

        let backing = FileBacking::open(&path).unwrap();
        assert_eq!(backing.size().unwrap(), 0);
        assert!(path.exists());
    }

    #[test]
    fn file_write_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.fdb");

        let mut backing = FileBacking::open(&path).unwrap();
        backing.write_at(0, b"hello world").unwrap();

        assert_eq!(backing.size().unwrap(), 11);
        assert_eq!(backing.read_at(0, 11).unwrap(), b"hello world");
        assert_eq!(backing.read_at(6, 5).unwrap(), b"world");
    }

    #[test]
    fn file_overwrite_in_place() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.fdb");

        let mut backing = FileBacking::open(&path).unwrap();
        backing.write_at(0, b"hello world").unwrap();
        backing.write_at(0, b"HELLO").unwrap();

        assert_eq!(backing.read_at(0, 11).unwrap(), b"HELLO world");
        assert_eq!(backing.size().unwrap(), 11);
    }

    #[test]
    fn file_append_is_write_at_end() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.fdb");

        let mut backing = FileBacking::open(&path).unwrap();
        assert_eq!(backing.append(b"hello").unwrap(), 0);
        assert_eq!(backing.append(b" world").unwrap(), 5);
        assert_eq!(backing.size().unwrap(), 11);

        // Appends continue after writes that grew the file
        backing.write_at(11, b"!!").unwrap();
        assert_eq!(backing.append(b"?").unwrap(), 13);
        assert_eq!(backing.read_at(11, 3).unwrap(), b"!!?");
    }

    #[test]
    fn file_read_past_end_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.fdb");

        let mut backing = FileBacking::open(&path).unwrap();
        backing.write_at(0, b"hello").unwrap();

        let result = backing.read_at(10, 5);
        assert!(matches!(result, Err(StorageError::ReadPastEnd { .. })));
    }

    #[test]
    fn file_empty_read_and_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.fdb");

        let mut backing = FileBacking::open(&path).unwrap();
        backing.write_at(0, b"hello").unwrap();

        assert!(backing.read_at(2, 0).unwrap().is_empty());
        backing.write_at(100, b"").unwrap();
        assert_eq!(backing.size().unwrap(), 5);
    }

    #[test]
    fn file_truncate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.fdb");

        let mut backing = FileBacking::open(&path).unwrap();
        backing.write_at(0, b"hello world").unwrap();
        backing.truncate(5).unwrap();

        assert_eq!(backing.size().unwrap(), 5);
        assert_eq!(backing.read_at(0, 5).unwrap(), b"hello");

        let result = backing.truncate(100);
        assert!(matches!(result, Err(StorageError::TruncateBeyondEnd { .. })));
    }

    #[test]
    fn file_persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.fdb");

        {
            let mut backing = FileBacking::open(&path).unwrap();
            backing.write_at(0, b"persistent data").unwrap();
            backing.sync().unwrap();
        }

        {
            let backing = FileBacking::open(&path).unwrap();
            assert_eq!(backing.size().unwrap(), 15);
            assert_eq!(backing.read_at(0, 15).unwrap(), b"persistent data");
        }
    }

    #[test]
    fn file_open_read_only_missing_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.fdb");

        assert!(FileBacking::open_read_only(&path).is_err());
    }

    #[test]
    fn file_path_accessor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.fdb");

        let backing = FileBacking::open(&path).unwrap();
        assert_eq!(backing.path(), path);
    }
}
