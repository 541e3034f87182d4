//! Backing store trait definition.

use crate::error::StorageResult;

/// A seekable byte store holding a FlatDB database.
///
/// Backings are **opaque byte stores**. They provide positional reads and
/// writes, truncation, and flushing. FlatDB owns all file-format
/// interpretation - backings do not understand headers, records, or the
/// index tail.
///
/// # Invariants
///
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `write_at` past the current end grows the store (the gap, if any, reads
///   as zero bytes)
/// - `flush` pushes buffered writes to the underlying medium
/// - Backings must be `Send + Sync`
///
/// # Implementors
///
/// - [`super::MemoryBacking`] - For tests and ephemeral databases
/// - [`super::FileBacking`] - For persistent storage
pub trait Backing: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read would extend beyond the current size or
    /// an I/O error occurs.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Writes `data` at `offset`, overwriting existing bytes and growing the
    /// store if the write extends past the end.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()>;

    /// Appends data at the end of the store.
    ///
    /// Returns the offset where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Truncates the store to the given size.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` is greater than the current size or
    /// the truncation fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Flushes all pending writes to the underlying medium.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Syncs data and metadata to durable storage.
    ///
    /// A stronger guarantee than `flush`: file metadata (size) is also made
    /// durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size of the store in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;
}
