//! On-disk header and schema descriptor.
//!
//! Layout at major 6 (all little-endian):
//!
//! | Offset | Size | Meaning |
//! |--------|------|---------|
//! | 0 | 4 | Signature `0x0123BABE` |
//! | 4 | 1 | Major version |
//! | 5 | 1 | Minor version |
//! | 6 | 4 | Flags (bit 0 = encrypted) |
//! | 10 | 4 | Reserved |
//! | 14 | 4 | `num_records` |
//! | 18 | 4 | `num_deleted` |
//! | 22 | 4 | `index_start` |
//! | 26 | 4 | `user_version` (f32) |
//! | 30 | var | Schema descriptor |
//!
//! Older majors put the counters straight after the version bytes (no
//! flags/reserved words), drop `user_version` below major 3, and drop field
//! comments below major 2. FlatDB reads majors 2-5 and always writes 6.

use crate::error::{DbError, DbResult};
use crate::schema::{Field, Schema, FIELD_FLAG_ARRAY, FIELD_FLAG_AUTOINC};
use flatdb_codec::{write_len_prefixed_str, DataType};
use flatdb_storage::Backing;

/// File signature.
pub const SIGNATURE: u32 = 0x0123_BABE;
/// Major version this build writes.
pub const CURRENT_MAJOR: u8 = 6;
/// Minor version this build writes.
pub const CURRENT_MINOR: u8 = 0;

/// Header flag bit: records are encrypted.
const FLAG_ENCRYPTED: i32 = 0x1;

/// Fixed header portion preceding the counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    /// Major format version.
    pub major: u8,
    /// Minor format version.
    pub minor: u8,
    /// Whether record payloads are encrypted.
    pub encrypted: bool,
    /// Caller-defined version number (persisted when major >= 3).
    pub user_version: f32,
}

impl Header {
    /// A fresh header at the current version.
    #[must_use]
    pub fn current(encrypted: bool) -> Self {
        Self {
            major: CURRENT_MAJOR,
            minor: CURRENT_MINOR,
            encrypted,
            user_version: 0.0,
        }
    }

    /// Whether this header is at the version this build writes.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.major == CURRENT_MAJOR && self.minor == CURRENT_MINOR
    }

    /// Byte offset where the counters start for this major version.
    #[must_use]
    pub fn counters_offset(&self) -> u64 {
        if self.major >= 6 {
            14
        } else {
            6
        }
    }
}

/// Everything parsed from the file prefix: header, counters, schema, and
/// where the record data begins.
#[derive(Debug)]
pub struct FilePrefix {
    /// Parsed fixed header.
    pub header: Header,
    /// Live record count.
    pub num_records: u32,
    /// Tombstoned record count.
    pub num_deleted: u32,
    /// Offset of the index tail.
    pub index_start: u32,
    /// Parsed schema.
    pub schema: Schema,
    /// Offset of the first record frame.
    pub data_start: u32,
}

/// Serializes the fixed header bytes (offset 0 to the counters) at the
/// current major version.
#[must_use]
pub fn header_bytes(header: &Header) -> Vec<u8> {
    let mut buf = Vec::with_capacity(14);
    buf.extend_from_slice(&SIGNATURE.to_le_bytes());
    buf.push(header.major);
    buf.push(header.minor);
    let flags = if header.encrypted { FLAG_ENCRYPTED } else { 0 };
    buf.extend_from_slice(&flags.to_le_bytes());
    buf.extend_from_slice(&0i32.to_le_bytes()); // reserved
    buf
}

/// Serializes the counters and schema descriptor (the region from the
/// counters offset to `data_start`) at the current major version.
///
/// The byte length of this region depends only on field names, types, and
/// comments, so rewriting it in place after a mutation never moves
/// `data_start`.
#[must_use]
pub fn body_bytes(
    schema: &Schema,
    num_records: u32,
    num_deleted: u32,
    index_start: u32,
    user_version: f32,
) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(num_records as i32).to_le_bytes());
    buf.extend_from_slice(&(num_deleted as i32).to_le_bytes());
    buf.extend_from_slice(&(index_start as i32).to_le_bytes());
    buf.extend_from_slice(&user_version.to_le_bytes());

    let pk_name = schema.primary_key().map_or("", Field::name);
    write_len_prefixed_str(&mut buf, pk_name);
    buf.extend_from_slice(&(schema.len() as i32).to_le_bytes());

    for field in schema.fields() {
        write_len_prefixed_str(&mut buf, field.name());
        buf.extend_from_slice(&field.data_type().code().to_le_bytes());
        buf.extend_from_slice(&field.flags().to_le_bytes());
        if field.is_autoinc() {
            buf.extend_from_slice(&field.autoinc_start().unwrap_or(0).to_le_bytes());
            buf.extend_from_slice(&field.cur_autoinc().unwrap_or(0).to_le_bytes());
        }
        write_len_prefixed_str(&mut buf, field.comment().unwrap_or(""));
    }

    buf
}

/// Reads and validates the file prefix from a backing store.
///
/// # Errors
///
/// Returns [`DbError::InvalidSignature`] when the magic does not match,
/// [`DbError::UnsupportedNewerVersion`] when the file was written by a
/// newer major, and parse errors when the prefix is truncated or malformed.
pub fn read_prefix(backing: &dyn Backing) -> DbResult<FilePrefix> {
    let mut reader = BackingReader::new(backing);

    let signature = reader.read_u32()?;
    if signature != SIGNATURE {
        return Err(DbError::InvalidSignature);
    }

    let major = reader.read_u8()?;
    let minor = reader.read_u8()?;
    if major > CURRENT_MAJOR {
        return Err(DbError::UnsupportedNewerVersion { major });
    }
    if major < 2 {
        return Err(DbError::invalid_operation(format!(
            "database major version {major} predates the supported format range"
        )));
    }

    let mut encrypted = false;
    if major >= 6 {
        let flags = reader.read_i32()?;
        encrypted = flags & FLAG_ENCRYPTED != 0;
        let _reserved = reader.read_i32()?;
    }

    let num_records = read_count(&mut reader, "num_records")?;
    let num_deleted = read_count(&mut reader, "num_deleted")?;
    let index_start = read_count(&mut reader, "index_start")?;

    let user_version = if major >= 3 { reader.read_f32()? } else { 0.0 };

    let pk_name = reader.read_len_prefixed_str()?;
    let field_count = reader.read_i32()?;
    if field_count <= 0 {
        return Err(DbError::invalid_operation(format!(
            "schema descriptor holds {field_count} fields"
        )));
    }

    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        let name = reader.read_len_prefixed_str()?;
        let type_code = reader.read_i16()?;
        let data_type = DataType::from_code(type_code).map_err(|_| DbError::InvalidTypeInSchema {
            field: name.clone(),
        })?;
        let flags = reader.read_i32()?;

        let mut field = Field::new(&name, data_type);
        if flags & FIELD_FLAG_ARRAY != 0 {
            field = field.array();
        }
        if flags & FIELD_FLAG_AUTOINC != 0 {
            let start = reader.read_i32()?;
            let current = reader.read_i32()?;
            field = field.autoinc(start);
            field.cur_autoinc = Some(current);
        }
        if major >= 2 {
            let comment = reader.read_len_prefixed_str()?;
            if !comment.is_empty() {
                field = field.with_comment(comment);
            }
        }
        if !pk_name.is_empty() && name.eq_ignore_ascii_case(&pk_name) {
            field = field.primary_key();
        }

        fields.push(field);
    }

    let schema = Schema::new(fields)?;
    let data_start = u32::try_from(reader.position())
        .map_err(|_| DbError::invalid_operation("schema descriptor exceeds 4 GiB"))?;

    Ok(FilePrefix {
        header: Header {
            major,
            minor,
            encrypted,
            user_version,
        },
        num_records,
        num_deleted,
        index_start,
        schema,
        data_start,
    })
}

fn read_count(reader: &mut BackingReader<'_>, what: &str) -> DbResult<u32> {
    let raw = reader.read_i32()?;
    u32::try_from(raw)
        .map_err(|_| DbError::invalid_operation(format!("negative {what} counter {raw}")))
}

/// A typed little-endian reader advancing through a backing store.
struct BackingReader<'a> {
    backing: &'a dyn Backing,
    pos: u64,
}

impl<'a> BackingReader<'a> {
    fn new(backing: &'a dyn Backing) -> Self {
        Self { backing, pos: 0 }
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn read_bytes(&mut self, len: usize) -> DbResult<Vec<u8>> {
        let bytes = self.backing.read_at(self.pos, len)?;
        self.pos += len as u64;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> DbResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_i16(&mut self) -> DbResult<i16> {
        let b = self.read_bytes(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    fn read_i32(&mut self) -> DbResult<i32> {
        let b = self.read_bytes(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u32(&mut self) -> DbResult<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_f32(&mut self) -> DbResult<f32> {
        let b = self.read_bytes(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_len_prefixed_str(&mut self) -> DbResult<String> {
        let mut value: u32 = 0;
        let mut shift = 0;
        loop {
            if shift > 28 {
                return Err(DbError::invalid_operation("malformed string length prefix"));
            }
            let byte = self.read_u8()?;
            value |= u32::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let bytes = self.read_bytes(value as usize)?;
        String::from_utf8(bytes)
            .map_err(|_| DbError::invalid_operation("invalid UTF-8 in schema descriptor"))
    }
}
