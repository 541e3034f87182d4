//! Error types for backing-store operations.

use std::io;
use thiserror::Error;

/// Result type for backing-store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while accessing a backing store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of the store.
    #[error("read beyond end of store: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current store size.
        size: u64,
    },

    /// Attempted to grow the store past what truncate allows.
    #[error("cannot truncate to {requested} bytes: store is {size} bytes")]
    TruncateBeyondEnd {
        /// The requested new size.
        requested: u64,
        /// The current store size.
        size: u64,
    },
}
