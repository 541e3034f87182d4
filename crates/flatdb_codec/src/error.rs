//! Error types for the value codec.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding values.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Ran out of bytes while decoding.
    #[error("unexpected end of input: needed {needed} bytes at position {position}")]
    UnexpectedEof {
        /// Bytes required by the read.
        needed: usize,
        /// Cursor position when the read was attempted.
        position: usize,
    },

    /// Encountered an unknown data type code.
    #[error("invalid data type code: {0}")]
    InvalidTypeCode(i16),

    /// A decoded string was not valid UTF-8.
    #[error("invalid UTF-8 in string value")]
    InvalidUtf8,

    /// A 7-bit varint length was malformed or out of range.
    #[error("invalid length prefix")]
    InvalidLengthPrefix,

    /// A decoded value had components outside its legal range.
    #[error("value out of range: {0}")]
    ValueOutOfRange(String),

    /// A value's runtime type did not match the field's declared type.
    #[error("invalid data type: expected {expected}, got {actual}")]
    InvalidDataType {
        /// The declared field type.
        expected: &'static str,
        /// The runtime type of the supplied value.
        actual: &'static str,
    },

    /// A scalar value was supplied where an array was required, or vice versa.
    #[error("non-array value supplied for array field")]
    NonArrayValue,

    /// A value could not be converted to the target type.
    #[error("cannot convert {from} to {to}: {message}")]
    CannotConvert {
        /// Runtime type of the source value.
        from: &'static str,
        /// Name of the target type.
        to: &'static str,
        /// Why the conversion failed.
        message: String,
    },

    /// A value could not be converted to a Guid.
    #[error("cannot convert value to Guid: {0}")]
    CantConvertTypeToGuid(String),

    /// A Guid field was given a value that is neither a Guid nor a 16-byte array.
    #[error("Guid fields accept only Guid or byte-array values")]
    GuidTypeMustBeGuidOrByteArray,
}

impl CodecError {
    /// Creates a conversion error.
    pub fn cannot_convert(
        from: &'static str,
        to: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::CannotConvert {
            from,
            to,
            message: message.into(),
        }
    }
}
