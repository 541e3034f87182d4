//! Dynamic value type.

use crate::data_type::DataType;
use crate::decimal::Decimal;
use crate::error::{CodecError, CodecResult};
use crate::timestamp::Timestamp;
use std::fmt;
use uuid::Uuid;

/// A dynamic value carrying any of the FlatDB scalar types, an array of
/// one scalar type, or null.
///
/// Records travel through the engine as `{field name -> Value}` maps; the
/// record codec dispatches on the variant and on the field's declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Unsigned 8-bit integer.
    Byte(u8),
    /// Signed 32-bit integer.
    Int32(i32),
    /// Unsigned 32-bit integer.
    UInt32(u32),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Single-precision float.
    Float32(f32),
    /// Double-precision float.
    Float64(f64),
    /// 128-bit decimal.
    Decimal(Decimal),
    /// Date and time with millisecond precision.
    DateTime(Timestamp),
    /// UTF-8 string.
    Text(String),
    /// 128-bit GUID.
    Guid(Uuid),
    /// Array of same-typed elements. Elements are never null; an array
    /// field is either null as a whole (via the record nullmask) or holds
    /// zero or more concrete elements.
    Array(Vec<Value>),
}

impl Value {
    /// Whether this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The runtime type name, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Byte(_) => "Byte",
            Value::Int32(_) => "Int32",
            Value::UInt32(_) => "UInt32",
            Value::Int64(_) => "Int64",
            Value::Float32(_) => "Float32",
            Value::Float64(_) => "Float64",
            Value::Decimal(_) => "Decimal",
            Value::DateTime(_) => "DateTime",
            Value::Text(_) => "String",
            Value::Guid(_) => "Guid",
            Value::Array(_) => "Array",
        }
    }

    /// The scalar [`DataType`] this value matches, or `None` for null and
    /// arrays.
    #[must_use]
    pub fn scalar_type(&self) -> Option<DataType> {
        match self {
            Value::Bool(_) => Some(DataType::Bool),
            Value::Byte(_) => Some(DataType::Byte),
            Value::Int32(_) => Some(DataType::Int32),
            Value::UInt32(_) => Some(DataType::UInt32),
            Value::Int64(_) => Some(DataType::Int64),
            Value::Float32(_) => Some(DataType::Float32),
            Value::Float64(_) => Some(DataType::Float64),
            Value::Decimal(_) => Some(DataType::Decimal),
            Value::DateTime(_) => Some(DataType::DateTime),
            Value::Text(_) => Some(DataType::String),
            Value::Guid(_) => Some(DataType::Guid),
            Value::Null | Value::Array(_) => None,
        }
    }

    /// Gets this value as a bool, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Gets this value as an `i32`, if it is one.
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(n) => Some(*n),
            _ => None,
        }
    }

    /// Gets this value as an `i64`, if it is one.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(n) => Some(*n),
            _ => None,
        }
    }

    /// Gets this value as a string slice, if it is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Gets this value as a Guid, if it is one.
    #[must_use]
    pub fn as_guid(&self) -> Option<Uuid> {
        match self {
            Value::Guid(g) => Some(*g),
            _ => None,
        }
    }

    /// Gets this value's elements, if it is an array.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Converts this scalar value to `target`, applying the engine's
    /// coercion rules: exact matches pass through, integers widen where
    /// lossless, strings parse, and Guid accepts Guid or a 16-element byte
    /// array.
    ///
    /// Null converts to null for every target. Arrays are not converted
    /// here; the caller converts elements individually.
    ///
    /// # Errors
    ///
    /// Returns a typed conversion error when the value cannot represent the
    /// target type.
    pub fn convert_to(&self, target: DataType) -> CodecResult<Value> {
        if self.is_null() {
            return Ok(Value::Null);
        }
        if let Value::Array(_) = self {
            if target != DataType::Guid {
                return Err(CodecError::NonArrayValue);
            }
        }

        let fail = |message: String| {
            CodecError::cannot_convert(self.type_name(), target.name(), message)
        };

        match target {
            DataType::Bool => match self {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::Byte(n) => Ok(Value::Bool(*n != 0)),
                Value::Int32(n) => Ok(Value::Bool(*n != 0)),
                Value::Text(s) => match s.to_ascii_lowercase().as_str() {
                    "true" | "1" => Ok(Value::Bool(true)),
                    "false" | "0" => Ok(Value::Bool(false)),
                    _ => Err(fail(format!("cannot parse {s:?} as Bool"))),
                },
                _ => Err(fail("no Bool conversion".to_string())),
            },
            DataType::Byte => match self {
                Value::Byte(n) => Ok(Value::Byte(*n)),
                Value::Int32(n) => u8::try_from(*n)
                    .map(Value::Byte)
                    .map_err(|_| fail(format!("{n} out of Byte range"))),
                Value::Text(s) => s
                    .trim()
                    .parse::<u8>()
                    .map(Value::Byte)
                    .map_err(|e| fail(e.to_string())),
                _ => Err(fail("no Byte conversion".to_string())),
            },
            DataType::Int32 => match self {
                Value::Int32(n) => Ok(Value::Int32(*n)),
                Value::Byte(n) => Ok(Value::Int32(i32::from(*n))),
                Value::UInt32(n) => i32::try_from(*n)
                    .map(Value::Int32)
                    .map_err(|_| fail(format!("{n} out of Int32 range"))),
                Value::Int64(n) => i32::try_from(*n)
                    .map(Value::Int32)
                    .map_err(|_| fail(format!("{n} out of Int32 range"))),
                Value::Text(s) => s
                    .trim()
                    .parse::<i32>()
                    .map(Value::Int32)
                    .map_err(|e| fail(e.to_string())),
                _ => Err(fail("no Int32 conversion".to_string())),
            },
            DataType::UInt32 => match self {
                Value::UInt32(n) => Ok(Value::UInt32(*n)),
                Value::Byte(n) => Ok(Value::UInt32(u32::from(*n))),
                Value::Int32(n) => u32::try_from(*n)
                    .map(Value::UInt32)
                    .map_err(|_| fail(format!("{n} out of UInt32 range"))),
                Value::Int64(n) => u32::try_from(*n)
                    .map(Value::UInt32)
                    .map_err(|_| fail(format!("{n} out of UInt32 range"))),
                Value::Text(s) => s
                    .trim()
                    .parse::<u32>()
                    .map(Value::UInt32)
                    .map_err(|e| fail(e.to_string())),
                _ => Err(fail("no UInt32 conversion".to_string())),
            },
            DataType::Int64 => match self {
                Value::Int64(n) => Ok(Value::Int64(*n)),
                Value::Byte(n) => Ok(Value::Int64(i64::from(*n))),
                Value::Int32(n) => Ok(Value::Int64(i64::from(*n))),
                Value::UInt32(n) => Ok(Value::Int64(i64::from(*n))),
                Value::Text(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int64)
                    .map_err(|e| fail(e.to_string())),
                _ => Err(fail("no Int64 conversion".to_string())),
            },
            DataType::Float32 => match self {
                Value::Float32(n) => Ok(Value::Float32(*n)),
                Value::Byte(n) => Ok(Value::Float32(f32::from(*n))),
                Value::Int32(n) => Ok(Value::Float32(*n as f32)),
                Value::Text(s) => s
                    .trim()
                    .parse::<f32>()
                    .map(Value::Float32)
                    .map_err(|e| fail(e.to_string())),
                _ => Err(fail("no Float32 conversion".to_string())),
            },
            DataType::Float64 => match self {
                Value::Float64(n) => Ok(Value::Float64(*n)),
                Value::Float32(n) => Ok(Value::Float64(f64::from(*n))),
                Value::Byte(n) => Ok(Value::Float64(f64::from(*n))),
                Value::Int32(n) => Ok(Value::Float64(f64::from(*n))),
                Value::UInt32(n) => Ok(Value::Float64(f64::from(*n))),
                Value::Int64(n) => Ok(Value::Float64(*n as f64)),
                Value::Text(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float64)
                    .map_err(|e| fail(e.to_string())),
                _ => Err(fail("no Float64 conversion".to_string())),
            },
            DataType::Decimal => match self {
                Value::Decimal(d) => Ok(Value::Decimal(*d)),
                Value::Byte(n) => Ok(Value::Decimal(Decimal::from(u32::from(*n)))),
                Value::Int32(n) => Ok(Value::Decimal(Decimal::from(*n))),
                Value::UInt32(n) => Ok(Value::Decimal(Decimal::from(*n))),
                Value::Int64(n) => Ok(Value::Decimal(Decimal::from(*n))),
                Value::Text(s) => s.parse::<Decimal>().map(Value::Decimal),
                _ => Err(fail("no Decimal conversion".to_string())),
            },
            DataType::DateTime => match self {
                Value::DateTime(ts) => Ok(Value::DateTime(*ts)),
                Value::Text(s) => Timestamp::parse(s).map(Value::DateTime),
                _ => Err(fail("no DateTime conversion".to_string())),
            },
            DataType::String => Ok(Value::Text(self.to_text())),
            DataType::Guid => match self {
                Value::Guid(g) => Ok(Value::Guid(*g)),
                Value::Text(s) => Uuid::parse_str(s.trim())
                    .map(Value::Guid)
                    .map_err(|e| CodecError::CantConvertTypeToGuid(e.to_string())),
                Value::Array(items) => {
                    let mut bytes = [0u8; 16];
                    if items.len() != 16 {
                        return Err(CodecError::CantConvertTypeToGuid(format!(
                            "byte array has {} elements, need 16",
                            items.len()
                        )));
                    }
                    for (slot, item) in bytes.iter_mut().zip(items) {
                        match item {
                            Value::Byte(b) => *slot = *b,
                            _ => return Err(CodecError::GuidTypeMustBeGuidOrByteArray),
                        }
                    }
                    Ok(Value::Guid(Uuid::from_bytes_le(bytes)))
                }
                _ => Err(CodecError::GuidTypeMustBeGuidOrByteArray),
            },
        }
    }

    /// The textual form of this value, used by string conversion and the
    /// filter `CONTAINS` operator.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Byte(n) => n.to_string(),
            Value::Int32(n) => n.to_string(),
            Value::UInt32(n) => n.to_string(),
            Value::Int64(n) => n.to_string(),
            Value::Float32(n) => n.to_string(),
            Value::Float64(n) => n.to_string(),
            Value::Decimal(d) => d.to_string(),
            Value::DateTime(ts) => ts.to_string(),
            Value::Text(s) => s.clone(),
            Value::Guid(g) => g.to_string(),
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(Value::to_text).collect();
                format!("[{}]", parts.join(", "))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<u8> for Value {
    fn from(n: u8) -> Self {
        Value::Byte(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int32(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::UInt32(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int64(n)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Float32(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float64(n)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<Timestamp> for Value {
    fn from(ts: Timestamp) -> Self {
        Value::DateTime(ts)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Uuid> for Value {
    fn from(g: Uuid) -> Self {
        Value::Guid(g)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_converts_to_anything() {
        for target in [DataType::Bool, DataType::Int32, DataType::Guid, DataType::String] {
            assert_eq!(Value::Null.convert_to(target).unwrap(), Value::Null);
        }
    }

    #[test]
    fn integer_widening() {
        assert_eq!(
            Value::Byte(7).convert_to(DataType::Int32).unwrap(),
            Value::Int32(7)
        );
        assert_eq!(
            Value::Int32(7).convert_to(DataType::Int64).unwrap(),
            Value::Int64(7)
        );
        assert_eq!(
            Value::UInt32(7).convert_to(DataType::Int64).unwrap(),
            Value::Int64(7)
        );
    }

    #[test]
    fn narrowing_checks_range() {
        assert_eq!(
            Value::Int64(100).convert_to(DataType::Int32).unwrap(),
            Value::Int32(100)
        );
        assert!(Value::Int64(i64::MAX).convert_to(DataType::Int32).is_err());
        assert!(Value::Int32(-1).convert_to(DataType::UInt32).is_err());
        assert!(Value::Int32(300).convert_to(DataType::Byte).is_err());
    }

    #[test]
    fn string_parsing() {
        assert_eq!(
            Value::Text("42".to_string()).convert_to(DataType::Int32).unwrap(),
            Value::Int32(42)
        );
        assert_eq!(
            Value::Text("true".to_string()).convert_to(DataType::Bool).unwrap(),
            Value::Bool(true)
        );
        assert!(Value::Text("nope".to_string())
            .convert_to(DataType::Int32)
            .is_err());
    }

    #[test]
    fn anything_converts_to_string() {
        assert_eq!(
            Value::Int32(5).convert_to(DataType::String).unwrap(),
            Value::Text("5".to_string())
        );
        assert_eq!(
            Value::Bool(false).convert_to(DataType::String).unwrap(),
            Value::Text("false".to_string())
        );
    }

    #[test]
    fn guid_from_string_and_bytes() {
        let g = Uuid::new_v4();
        assert_eq!(
            Value::Text(g.to_string()).convert_to(DataType::Guid).unwrap(),
            Value::Guid(g)
        );

        let bytes_le = g.to_bytes_le();
        let array = Value::Array(bytes_le.iter().map(|b| Value::Byte(*b)).collect());
        assert_eq!(array.convert_to(DataType::Guid).unwrap(), Value::Guid(g));
    }

    #[test]
    fn guid_rejects_wrong_shapes() {
        assert!(matches!(
            Value::Text("not-a-guid".to_string()).convert_to(DataType::Guid),
            Err(CodecError::CantConvertTypeToGuid(_))
        ));
        assert!(matches!(
            Value::Int32(1).convert_to(DataType::Guid),
            Err(CodecError::GuidTypeMustBeGuidOrByteArray)
        ));
        let short = Value::Array(vec![Value::Byte(1), Value::Byte(2)]);
        assert!(short.convert_to(DataType::Guid).is_err());
    }

    #[test]
    fn array_rejected_for_scalar_targets() {
        let arr = Value::Array(vec![Value::Int32(1)]);
        assert!(matches!(
            arr.convert_to(DataType::Int32),
            Err(CodecError::NonArrayValue)
        ));
    }

    #[test]
    fn from_impls() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(42i32), Value::Int32(42));
        assert_eq!(Value::from("hello"), Value::Text("hello".to_string()));
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(
            Value::from(vec![1i32, 2, 3]),
            Value::Array(vec![Value::Int32(1), Value::Int32(2), Value::Int32(3)])
        );
    }
}
