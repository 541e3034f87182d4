//! # FlatDB Codec
//!
//! Typed values and the scalar wire codec for FlatDB.
//!
//! This crate defines the twelve scalar data types a FlatDB table can hold,
//! the dynamic [`Value`] variant that carries them at runtime, and the
//! fixed little-endian byte layout each type uses on disk. The record codec
//! in `flatdb_core` composes these per-field encoders into whole record
//! frames.
//!
//! ## Wire layouts
//!
//! | Type | Layout |
//! |------|--------|
//! | Bool | 1 byte, `0` or `1` |
//! | Byte | 1 byte |
//! | Int32 / UInt32 | 4 bytes LE |
//! | Int64 | 8 bytes LE |
//! | Float32 / Float64 | IEEE-754 LE |
//! | Decimal | 4 × i32 LE (`lo, mid, hi, flags`) |
//! | DateTime | 10 bytes: `year:i16 month:u8 day:u8 hour:u8 min:u8 sec:u8 ms:u16 kind:u8` |
//! | String | 7-bit varint byte length, then UTF-8 |
//! | Guid | 16 bytes, little-endian struct order |
//! | Array of T | `count:i32`, then `count` elements |

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod data_type;
mod decimal;
mod decoder;
mod encoder;
mod error;
mod timestamp;
mod value;

pub use data_type::DataType;
pub use decimal::Decimal;
pub use decoder::{read_array, read_value, ByteReader};
pub use encoder::{
    array_size, len_prefixed_str_size, value_size, write_array, write_len_prefixed_str,
    write_value,
};
pub use error::{CodecError, CodecResult};
pub use timestamp::{TimeKind, Timestamp};
pub use value::Value;
