//! Scalar value decoding.

use crate::data_type::DataType;
use crate::decimal::Decimal;
use crate::error::{CodecError, CodecResult};
use crate::timestamp::{TimeKind, Timestamp};
use crate::value::Value;
use uuid::Uuid;

/// A cursor over a byte slice with typed little-endian reads.
///
/// All reads advance the cursor; running off the end produces
/// [`CodecError::UnexpectedEof`] carrying the position, never a panic.
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader over the full slice.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current cursor position.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Reads `len` raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than `len` bytes remain.
    pub fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(CodecError::UnexpectedEof {
                needed: len,
                position: self.pos,
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Skips `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than `len` bytes remain.
    pub fn skip(&mut self, len: usize) -> CodecResult<()> {
        self.read_bytes(len).map(|_| ())
    }

    /// Reads one byte.
    ///
    /// # Errors
    ///
    /// Returns an error at end of input.
    pub fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Reads a little-endian `i16`.
    ///
    /// # Errors
    ///
    /// Returns an error at end of input.
    pub fn read_i16(&mut self) -> CodecResult<i16> {
        let b = self.read_bytes(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    /// Reads a little-endian `i32`.
    ///
    /// # Errors
    ///
    /// Returns an error at end of input.
    pub fn read_i32(&mut self) -> CodecResult<i32> {
        let b = self.read_bytes(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a little-endian `u32`.
    ///
    /// # Errors
    ///
    /// Returns an error at end of input.
    pub fn read_u32(&mut self) -> CodecResult<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a little-endian `i64`.
    ///
    /// # Errors
    ///
    /// Returns an error at end of input.
    pub fn read_i64(&mut self) -> CodecResult<i64> {
        let b = self.read_bytes(8)?;
        Ok(i64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Reads a little-endian `f32`.
    ///
    /// # Errors
    ///
    /// Returns an error at end of input.
    pub fn read_f32(&mut self) -> CodecResult<f32> {
        let b = self.read_bytes(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a little-endian `f64`.
    ///
    /// # Errors
    ///
    /// Returns an error at end of input.
    pub fn read_f64(&mut self) -> CodecResult<f64> {
        let b = self.read_bytes(8)?;
        Ok(f64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Reads a 7-bit varint length.
    ///
    /// # Errors
    ///
    /// Returns an error on a malformed prefix (more than five bytes) or at
    /// end of input.
    pub fn read_7bit_len(&mut self) -> CodecResult<usize> {
        let mut value: u32 = 0;
        let mut shift = 0;
        loop {
            if shift > 28 {
                return Err(CodecError::InvalidLengthPrefix);
            }
            let byte = self.read_u8()?;
            value |= u32::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value as usize);
            }
            shift += 7;
        }
    }

    /// Reads a 7-bit-length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns an error on a malformed prefix, truncated data, or invalid
    /// UTF-8.
    pub fn read_len_prefixed_str(&mut self) -> CodecResult<String> {
        let len = self.read_7bit_len()?;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }
}

/// Reads one scalar value of the given declared type.
///
/// # Errors
///
/// Returns an error on truncated or malformed input.
pub fn read_value(reader: &mut ByteReader<'_>, ty: DataType) -> CodecResult<Value> {
    match ty {
        DataType::Bool => Ok(Value::Bool(reader.read_u8()? != 0)),
        DataType::Byte => Ok(Value::Byte(reader.read_u8()?)),
        DataType::Int32 => Ok(Value::Int32(reader.read_i32()?)),
        DataType::UInt32 => Ok(Value::UInt32(reader.read_u32()?)),
        DataType::Int64 => Ok(Value::Int64(reader.read_i64()?)),
        DataType::Float32 => Ok(Value::Float32(reader.read_f32()?)),
        DataType::Float64 => Ok(Value::Float64(reader.read_f64()?)),
        DataType::Decimal => {
            let lo = reader.read_u32()?;
            let mid = reader.read_u32()?;
            let hi = reader.read_u32()?;
            let flags = reader.read_u32()?;
            Ok(Value::Decimal(Decimal::from_words(lo, mid, hi, flags)?))
        }
        DataType::DateTime => {
            let year = reader.read_i16()?;
            let month = reader.read_u8()?;
            let day = reader.read_u8()?;
            let hour = reader.read_u8()?;
            let minute = reader.read_u8()?;
            let second = reader.read_u8()?;
            let ms = u16::from_le_bytes([reader.read_u8()?, reader.read_u8()?]);
            let kind = TimeKind::from_byte(reader.read_u8()?)?;
            Ok(Value::DateTime(Timestamp::from_components(
                i32::from(year),
                u32::from(month),
                u32::from(day),
                u32::from(hour),
                u32::from(minute),
                u32::from(second),
                u32::from(ms),
                kind,
            )?))
        }
        DataType::String => Ok(Value::Text(reader.read_len_prefixed_str()?)),
        DataType::Guid => {
            let bytes: [u8; 16] = reader
                .read_bytes(16)?
                .try_into()
                .map_err(|_| CodecError::UnexpectedEof {
                    needed: 16,
                    position: reader.position(),
                })?;
            Ok(Value::Guid(Uuid::from_bytes_le(bytes)))
        }
    }
}

/// Reads an array field: `count:i32` then `count` elements.
///
/// # Errors
///
/// Returns an error on a negative count or malformed elements.
pub fn read_array(reader: &mut ByteReader<'_>, element_type: DataType) -> CodecResult<Value> {
    let count = reader.read_i32()?;
    if count < 0 {
        return Err(CodecError::ValueOutOfRange(format!(
            "negative array count {count}"
        )));
    }
    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        items.push(read_value(reader, element_type)?);
    }
    Ok(Value::Array(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{write_array, write_value};
    use proptest::prelude::*;

    fn roundtrip(ty: DataType, value: &Value) -> Value {
        let mut buf = Vec::new();
        write_value(&mut buf, ty, value).unwrap();
        let mut reader = ByteReader::new(&buf);
        let decoded = read_value(&mut reader, ty).unwrap();
        assert_eq!(reader.remaining(), 0, "trailing bytes for {ty}");
        decoded
    }

    #[test]
    fn scalar_roundtrips() {
        assert_eq!(roundtrip(DataType::Bool, &Value::Bool(true)), Value::Bool(true));
        assert_eq!(roundtrip(DataType::Byte, &Value::Byte(200)), Value::Byte(200));
        assert_eq!(
            roundtrip(DataType::Int32, &Value::Int32(i32::MIN)),
            Value::Int32(i32::MIN)
        );
        assert_eq!(
            roundtrip(DataType::UInt32, &Value::UInt32(u32::MAX)),
            Value::UInt32(u32::MAX)
        );
        assert_eq!(
            roundtrip(DataType::Int64, &Value::Int64(i64::MAX)),
            Value::Int64(i64::MAX)
        );
        assert_eq!(
            roundtrip(DataType::Float64, &Value::Float64(2.5)),
            Value::Float64(2.5)
        );
    }

    #[test]
    fn decimal_roundtrip_exact() {
        let d: Decimal = "-123456789.0123456789".parse().unwrap();
        assert_eq!(
            roundtrip(DataType::Decimal, &Value::Decimal(d)),
            Value::Decimal(d)
        );
    }

    #[test]
    fn datetime_roundtrip_exact() {
        let ts = Timestamp::from_components(1999, 12, 31, 23, 59, 59, 999, TimeKind::Local).unwrap();
        assert_eq!(
            roundtrip(DataType::DateTime, &Value::DateTime(ts)),
            Value::DateTime(ts)
        );
    }

    #[test]
    fn guid_roundtrip_exact() {
        let g = Uuid::new_v4();
        assert_eq!(roundtrip(DataType::Guid, &Value::Guid(g)), Value::Guid(g));
    }

    #[test]
    fn array_roundtrip() {
        let items = vec![Value::Text("a".to_string()), Value::Text("bb".to_string())];
        let mut buf = Vec::new();
        write_array(&mut buf, DataType::String, &items).unwrap();

        let mut reader = ByteReader::new(&buf);
        let decoded = read_array(&mut reader, DataType::String).unwrap();
        assert_eq!(decoded, Value::Array(items));

        // Empty array is distinct from null and round-trips as empty.
        let mut buf = Vec::new();
        write_array(&mut buf, DataType::Int32, &[]).unwrap();
        let mut reader = ByteReader::new(&buf);
        assert_eq!(
            read_array(&mut reader, DataType::Int32).unwrap(),
            Value::Array(vec![])
        );
    }

    #[test]
    fn truncated_input_fails_cleanly() {
        let mut buf = Vec::new();
        write_value(&mut buf, DataType::Int64, &Value::Int64(42)).unwrap();
        buf.truncate(5);

        let mut reader = ByteReader::new(&buf);
        assert!(matches!(
            read_value(&mut reader, DataType::Int64),
            Err(CodecError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn malformed_varint_fails() {
        let buf = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let mut reader = ByteReader::new(&buf);
        assert!(matches!(
            reader.read_7bit_len(),
            Err(CodecError::InvalidLengthPrefix)
        ));
    }

    #[test]
    fn invalid_utf8_fails() {
        let buf = [0x02, 0xFF, 0xFE];
        let mut reader = ByteReader::new(&buf);
        assert!(matches!(
            reader.read_len_prefixed_str(),
            Err(CodecError::InvalidUtf8)
        ));
    }

    proptest! {
        #[test]
        fn string_roundtrip(s in ".{0,300}") {
            let value = Value::Text(s.clone());
            prop_assert_eq!(roundtrip(DataType::String, &value), Value::Text(s));
        }

        #[test]
        fn int_roundtrip(n in any::<i32>()) {
            prop_assert_eq!(roundtrip(DataType::Int32, &Value::Int32(n)), Value::Int32(n));
        }

        #[test]
        fn varint_roundtrip(len in 0usize..1_000_000) {
            let mut buf = Vec::new();
            crate::encoder::write_7bit_len(&mut buf, len);
            prop_assert_eq!(buf.len(), crate::encoder::len_7bit_size(len));
            let mut reader = ByteReader::new(&buf);
            prop_assert_eq!(reader.read_7bit_len().unwrap(), len);
        }
    }
}
