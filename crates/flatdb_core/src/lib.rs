//! # FlatDB Core
//!
//! Single-file embedded database engine: one table with a fixed typed
//! schema, stored in one backing store (file or memory) together with its
//! header, schema descriptor, record frames, and index tail.
//!
//! This crate provides:
//! - The on-disk format (header, schema descriptor, record frames, tail)
//! - The in-memory live index and free-list with first-fit slot reuse
//! - The mutation engine: add / update / delete by key, index, or filter
//! - Binary-search primary-key lookup
//! - A SQL-like filter language with parser and evaluator
//! - Cleanup, format upgrade, and schema evolution by staged rewrite
//! - Snapshot-copy transactions
//! - Optional per-record AES-256-GCM encryption (pluggable cipher trait)
//!
//! ## Example
//!
//! ```rust
//! use flatdb_core::{Database, Field, Record};
//! use flatdb_codec::DataType;
//! use flatdb_storage::MemoryBacking;
//!
//! let fields = vec![
//!     Field::new("id", DataType::Int32).primary_key().autoinc(1),
//!     Field::new("name", DataType::String),
//!     Field::new("age", DataType::Int32),
//! ];
//! let mut db = Database::create(Box::new(MemoryBacking::new()), fields, None).unwrap();
//!
//! db.add(&Record::new().with("name", "ann").with("age", 30)).unwrap();
//! db.add(&Record::new().with("name", "bob").with("age", 40)).unwrap();
//!
//! let adults = db.select_where("age > 35", None, None, false).unwrap();
//! assert_eq!(adults.len(), 1);
//! assert_eq!(adults[0].get("name").unwrap().as_text(), Some("bob"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod compact;
mod config;
mod crypto;
mod cursor;
mod database;
mod error;
mod filter;
mod header;
mod index;
mod record;
mod schema;
mod transaction;

pub use config::Config;
pub use crypto::RecordCipher;
pub use database::{Database, DbStats, Table, UserData};
pub use error::{DbError, DbResult};
pub use filter::{BoolOp, Filter, FilterAtom, FilterGroup, FilterNode, MatchMode, Op, Rhs};
pub use header::{CURRENT_MAJOR, CURRENT_MINOR, SIGNATURE};
pub use record::Record;
pub use schema::{Field, Schema};

#[cfg(feature = "encryption")]
pub use crypto::{AesGcmCipher, CipherKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};

// The value types travel through the public API; re-export them so callers
// need only this crate.
pub use flatdb_codec::{DataType, Decimal, TimeKind, Timestamp, Value};
