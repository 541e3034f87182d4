//! Scalar data types and their on-disk codes.

use crate::error::{CodecError, CodecResult};
use std::fmt;

/// The scalar data types a FlatDB field can hold.
///
/// Each type has a fixed `i16` code persisted in the schema descriptor.
/// Array-ness is a separate flag on the field, not a distinct type code;
/// an array field stores elements of its scalar type with a length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum DataType {
    /// Boolean, 1 byte on disk.
    Bool = 1,
    /// Unsigned 8-bit integer.
    Byte = 2,
    /// Signed 32-bit integer. One of the two legal primary-key types.
    Int32 = 3,
    /// Unsigned 32-bit integer.
    UInt32 = 4,
    /// Signed 64-bit integer.
    Int64 = 5,
    /// IEEE-754 single-precision float.
    Float32 = 6,
    /// IEEE-754 double-precision float.
    Float64 = 7,
    /// 128-bit decimal (four 32-bit words).
    Decimal = 8,
    /// Wall-clock date and time with millisecond precision.
    DateTime = 9,
    /// UTF-8 string. One of the two legal primary-key types.
    String = 10,
    /// 128-bit globally unique identifier.
    Guid = 11,
}

impl DataType {
    /// Returns the on-disk `i16` code for this type.
    #[must_use]
    pub const fn code(self) -> i16 {
        self as i16
    }

    /// Looks up a type from its on-disk code.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidTypeCode`] for unknown codes.
    pub fn from_code(code: i16) -> CodecResult<Self> {
        match code {
            1 => Ok(Self::Bool),
            2 => Ok(Self::Byte),
            3 => Ok(Self::Int32),
            4 => Ok(Self::UInt32),
            5 => Ok(Self::Int64),
            6 => Ok(Self::Float32),
            7 => Ok(Self::Float64),
            8 => Ok(Self::Decimal),
            9 => Ok(Self::DateTime),
            10 => Ok(Self::String),
            11 => Ok(Self::Guid),
            other => Err(CodecError::InvalidTypeCode(other)),
        }
    }

    /// Returns the fixed encoded size in bytes, or `None` for
    /// variable-length types (String).
    #[must_use]
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Bool | Self::Byte => Some(1),
            Self::Int32 | Self::UInt32 | Self::Float32 => Some(4),
            Self::Int64 | Self::Float64 => Some(8),
            Self::DateTime => Some(10),
            Self::Decimal | Self::Guid => Some(16),
            Self::String => None,
        }
    }

    /// Whether this type may be used as a primary key.
    #[must_use]
    pub const fn is_valid_primary_key(self) -> bool {
        matches!(self, Self::Int32 | Self::String)
    }

    /// Returns the type's display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "Bool",
            Self::Byte => "Byte",
            Self::Int32 => "Int32",
            Self::UInt32 => "UInt32",
            Self::Int64 => "Int64",
            Self::Float32 => "Float32",
            Self::Float64 => "Float64",
            Self::Decimal => "Decimal",
            Self::DateTime => "DateTime",
            Self::String => "String",
            Self::Guid => "Guid",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_roundtrip() {
        for ty in [
            DataType::Bool,
            DataType::Byte,
            DataType::Int32,
            DataType::UInt32,
            DataType::Int64,
            DataType::Float32,
            DataType::Float64,
            DataType::Decimal,
            DataType::DateTime,
            DataType::String,
            DataType::Guid,
        ] {
            assert_eq!(DataType::from_code(ty.code()).unwrap(), ty);
        }
    }

    #[test]
    fn unknown_code_rejected() {
        assert!(matches!(
            DataType::from_code(99),
            Err(CodecError::InvalidTypeCode(99))
        ));
        assert!(DataType::from_code(0).is_err());
    }

    #[test]
    fn primary_key_types() {
        assert!(DataType::Int32.is_valid_primary_key());
        assert!(DataType::String.is_valid_primary_key());
        assert!(!DataType::Guid.is_valid_primary_key());
        assert!(!DataType::Int64.is_valid_primary_key());
    }

    #[test]
    fn fixed_sizes() {
        assert_eq!(DataType::Bool.fixed_size(), Some(1));
        assert_eq!(DataType::DateTime.fixed_size(), Some(10));
        assert_eq!(DataType::Decimal.fixed_size(), Some(16));
        assert_eq!(DataType::Guid.fixed_size(), Some(16));
        assert_eq!(DataType::String.fixed_size(), None);
    }
}
