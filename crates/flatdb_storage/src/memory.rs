//! In-memory backing for tests and ephemeral databases.

use crate::backing::Backing;
use crate::error::StorageResult;
use crate::span;

/// An in-memory backing store.
///
/// The store is a plain byte buffer with no interior mutability: reads
/// borrow it through `&self` and never mutate, writes come in through
/// `&mut self` like every other mutation, so no locking is involved.
/// Suitable for:
/// - Unit and integration tests
/// - Ephemeral databases that don't need persistence
///
/// # Example
///
/// ```rust
/// use flatdb_storage::{Backing, MemoryBacking};
///
/// let mut backing = MemoryBacking::new();
/// backing.write_at(0, b"test data").unwrap();
/// assert_eq!(backing.size().unwrap(), 9);
/// ```
#[derive(Debug, Default)]
pub struct MemoryBacking {
    data: Vec<u8>,
}

impl MemoryBacking {
    /// Creates a new empty in-memory backing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an in-memory backing with pre-existing contents.
    ///
    /// Useful for testing reopen scenarios.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Returns a copy of the full contents.
    ///
    /// Useful for byte-level assertions in tests.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.clone()
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }
}

impl Backing for MemoryBacking {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        span::check_read(offset, len, self.len())?;
        let start = offset as usize;
        Ok(self.data[start..start + len].to_vec())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()> {
        let start = offset as usize;
        let end = start + data.len();
        if self.data.len() < end {
            // A write past the end grows the store; the gap reads as zero
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        // Appending is placing at the current end
        let offset = self.len();
        self.write_at(offset, data)?;
        Ok(offset)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        span::check_truncate(new_size, self.len())?;
        self.data.truncate(new_size as usize);
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        // Writes land in the buffer directly
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.len())
    }
}
