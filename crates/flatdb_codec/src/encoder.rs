//! Scalar value encoding.
//!
//! One writer and one sizer per type; the two must agree byte-for-byte
//! because the record codec computes frame sizes before serializing.

use crate::data_type::DataType;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Writes a length as the 7-bit varint convention: low seven bits per byte,
/// high bit set while more bytes follow.
pub fn write_7bit_len(buf: &mut Vec<u8>, len: usize) {
    let mut remaining = len as u32;
    loop {
        let byte = (remaining & 0x7F) as u8;
        remaining >>= 7;
        if remaining == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

/// Encoded size of a 7-bit varint length.
#[must_use]
pub fn len_7bit_size(len: usize) -> usize {
    let mut remaining = len as u32;
    let mut size = 1;
    while remaining >= 0x80 {
        remaining >>= 7;
        size += 1;
    }
    size
}

/// Writes a string as a 7-bit varint byte length followed by UTF-8 bytes.
pub fn write_len_prefixed_str(buf: &mut Vec<u8>, s: &str) {
    write_7bit_len(buf, s.len());
    buf.extend_from_slice(s.as_bytes());
}

/// Encoded size of a length-prefixed string.
#[must_use]
pub fn len_prefixed_str_size(s: &str) -> usize {
    len_7bit_size(s.len()) + s.len()
}

/// Writes one scalar value of the given declared type.
///
/// The value must already match the declared type exactly (use
/// [`Value::convert_to`] first); nulls are handled by the record nullmask,
/// not here.
///
/// # Errors
///
/// Returns [`CodecError::InvalidDataType`] on a variant/type mismatch.
pub fn write_value(buf: &mut Vec<u8>, ty: DataType, value: &Value) -> CodecResult<()> {
    match (ty, value) {
        (DataType::Bool, Value::Bool(b)) => buf.push(u8::from(*b)),
        (DataType::Byte, Value::Byte(n)) => buf.push(*n),
        (DataType::Int32, Value::Int32(n)) => buf.extend_from_slice(&n.to_le_bytes()),
        (DataType::UInt32, Value::UInt32(n)) => buf.extend_from_slice(&n.to_le_bytes()),
        (DataType::Int64, Value::Int64(n)) => buf.extend_from_slice(&n.to_le_bytes()),
        (DataType::Float32, Value::Float32(n)) => buf.extend_from_slice(&n.to_le_bytes()),
        (DataType::Float64, Value::Float64(n)) => buf.extend_from_slice(&n.to_le_bytes()),
        (DataType::Decimal, Value::Decimal(d)) => {
            for word in d.words() {
                buf.extend_from_slice(&word.to_le_bytes());
            }
        }
        (DataType::DateTime, Value::DateTime(ts)) => {
            buf.extend_from_slice(&ts.year_i16()?.to_le_bytes());
            buf.push(ts.month());
            buf.push(ts.day());
            buf.push(ts.hour());
            buf.push(ts.minute());
            buf.push(ts.second());
            buf.extend_from_slice(&ts.millisecond().to_le_bytes());
            buf.push(ts.kind().as_byte());
        }
        (DataType::String, Value::Text(s)) => write_len_prefixed_str(buf, s),
        (DataType::Guid, Value::Guid(g)) => buf.extend_from_slice(&g.to_bytes_le()),
        _ => {
            return Err(CodecError::InvalidDataType {
                expected: ty.name(),
                actual: value.type_name(),
            })
        }
    }
    Ok(())
}

/// Encoded size of one scalar value of the given declared type.
///
/// # Errors
///
/// Returns [`CodecError::InvalidDataType`] on a variant/type mismatch.
pub fn value_size(ty: DataType, value: &Value) -> CodecResult<usize> {
    if let Some(fixed) = ty.fixed_size() {
        // Still verify the variant matches the declared type.
        if value.scalar_type() != Some(ty) {
            return Err(CodecError::InvalidDataType {
                expected: ty.name(),
                actual: value.type_name(),
            });
        }
        return Ok(fixed);
    }
    match value {
        Value::Text(s) => Ok(len_prefixed_str_size(s)),
        _ => Err(CodecError::InvalidDataType {
            expected: ty.name(),
            actual: value.type_name(),
        }),
    }
}

/// Writes an array field: `count:i32` then each element back-to-back.
///
/// # Errors
///
/// Returns an error if any element mismatches the element type.
pub fn write_array(buf: &mut Vec<u8>, element_type: DataType, items: &[Value]) -> CodecResult<()> {
    buf.extend_from_slice(&(items.len() as i32).to_le_bytes());
    for item in items {
        write_value(buf, element_type, item)?;
    }
    Ok(())
}

/// Encoded size of an array field.
///
/// # Errors
///
/// Returns an error if any element mismatches the element type.
pub fn array_size(element_type: DataType, items: &[Value]) -> CodecResult<usize> {
    let mut size = 4;
    for item in items {
        size += value_size(element_type, item)?;
    }
    Ok(size)
}
