//! # FlatDB Storage
//!
//! Backing store trait and implementations for FlatDB.
//!
//! This crate provides the lowest-level byte-stream abstraction for FlatDB.
//! Backings are **opaque byte stores** - they do not interpret the data they
//! hold. The database engine owns all file-format interpretation; a backing
//! only reads, writes, truncates, and flushes bytes at offsets.
//!
//! ## Available Backings
//!
//! - [`MemoryBacking`] - For tests and ephemeral databases; a plain byte
//!   buffer, no locking
//! - [`FileBacking`] - For persistent storage; one mutex guards the file
//!   descriptor and its cached length
//!
//! ## Example
//!
//! ```rust
//! use flatdb_storage::{Backing, MemoryBacking};
//!
//! let mut backing = MemoryBacking::new();
//! backing.write_at(0, b"hello world").unwrap();
//! let data = backing.read_at(0, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backing;
mod error;
mod file;
mod memory;
mod span;

pub use backing::Backing;
pub use error::{StorageError, StorageResult};
pub use file::FileBacking;
pub use memory::MemoryBacking;
