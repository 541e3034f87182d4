//! Error types for the FlatDB engine.

use thiserror::Error;

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur in FlatDB operations.
///
/// Every failure mode the engine can surface has its own variant so callers
/// can match on the kind rather than parse messages.
#[derive(Debug, Error)]
pub enum DbError {
    // ---- wrapped lower layers -------------------------------------------

    /// Backing-store error.
    #[error("storage error: {0}")]
    Storage(#[from] flatdb_storage::StorageError),

    /// Value codec error.
    #[error("codec error: {0}")]
    Codec(#[from] flatdb_codec::CodecError),

    // ---- format ---------------------------------------------------------

    /// The file does not start with the FlatDB signature.
    #[error("invalid signature: not a FlatDB database")]
    InvalidSignature,

    /// The file was written by a newer major version.
    #[error("database major version {major} is newer than this build supports")]
    UnsupportedNewerVersion {
        /// Major version found in the file.
        major: u8,
    },

    /// `upgrade` was called on a file already at the current version.
    #[error("database schema is already at the current version")]
    SchemaAlreadyUpToDate,

    // ---- open / close ---------------------------------------------------

    /// Operation attempted on a closed handle.
    #[error("no open database")]
    NoOpenDatabase,

    /// The database file does not exist.
    #[error("database file not found: {path}")]
    DatabaseFileNotFound {
        /// Path that was looked up.
        path: String,
    },

    /// An empty filename was supplied.
    #[error("filename is empty")]
    EmptyFilename,

    /// The backing stream must be writable for this operation.
    #[error("stream must be writable")]
    StreamMustBeWritable,

    /// Mutation attempted on a read-only database.
    #[error("database is open in read-only mode")]
    DatabaseReadOnlyMode,

    // ---- schema ---------------------------------------------------------

    /// A schema field carried an unusable type.
    #[error("invalid type in schema for field {field}")]
    InvalidTypeInSchema {
        /// Offending field name.
        field: String,
    },

    /// The primary key field has a type other than Int32 or String, or is
    /// an array.
    #[error("invalid primary key type for field {field}: must be Int32 or String and not array")]
    InvalidPrimaryKeyType {
        /// Offending field name.
        field: String,
    },

    /// More than one field was flagged as primary key.
    #[error("database already has a primary key field")]
    DatabaseAlreadyHasPrimaryKey,

    /// A primary key cannot be introduced after creation.
    #[error("a primary key field cannot be added to an existing database")]
    PrimaryKeyCannotBeAdded,

    /// A field with this name already exists.
    #[error("field name already exists: {field}")]
    FieldNameAlreadyExists {
        /// Duplicate name.
        field: String,
    },

    /// The primary key field cannot be removed.
    #[error("cannot delete primary key field {field}")]
    CannotDeletePrimaryKeyField {
        /// Primary key field name.
        field: String,
    },

    /// A schema operation was given no fields.
    #[error("field list is empty")]
    FieldListIsEmpty,

    /// A field name was empty.
    #[error("field name is empty")]
    FieldNameIsEmpty,

    /// Schema changes require a database without deleted records.
    #[error("cannot add or remove fields while deleted records exist; run clean first")]
    CantAddOrRemoveFieldWithDeletedRecords,

    // ---- data -----------------------------------------------------------

    /// A value's type did not match the field's declared type.
    #[error("invalid data type for field {field}: expected {expected}, got {actual}")]
    InvalidDataType {
        /// Field being written.
        field: String,
        /// Declared type name.
        expected: &'static str,
        /// Supplied value's type name.
        actual: &'static str,
    },

    /// A value could not be converted to the field's type.
    #[error("error converting value for field {field}: {message}")]
    ErrorConvertingValueForField {
        /// Field being written.
        field: String,
        /// Why the conversion failed.
        message: String,
    },

    /// A scalar value was supplied for an array field.
    #[error("non-array value supplied for array field {field}")]
    NonArrayValue {
        /// Array field name.
        field: String,
    },

    /// The record is missing its primary key value.
    #[error("record is missing the primary key field {field}")]
    MissingPrimaryKey {
        /// Primary key field name.
        field: String,
    },

    /// A record with this primary key already exists.
    #[error("duplicate primary key value: {key}")]
    DuplicatePrimaryKey {
        /// Textual form of the key.
        key: String,
    },

    /// No record carries this primary key value.
    #[error("primary key value not found: {key}")]
    PrimaryKeyValueNotFound {
        /// Textual form of the key.
        key: String,
    },

    /// The lookup key's type cannot be converted to the key field's type.
    #[error("key value type {actual} does not match primary key type {expected}")]
    MismatchedKeyFieldTypes {
        /// Primary key type name.
        expected: &'static str,
        /// Supplied key's type name.
        actual: &'static str,
    },

    /// The lookup key has a type that can never be a key.
    #[error("invalid key field type: {actual}")]
    InvalidKeyFieldType {
        /// Supplied key's type name.
        actual: &'static str,
    },

    /// A field name does not exist in the schema.
    #[error("invalid field name: {field}")]
    InvalidFieldName {
        /// Unknown name.
        field: String,
    },

    /// A field was listed twice in a projection.
    #[error("field specified twice: {field}")]
    FieldSpecifiedTwice {
        /// Repeated name.
        field: String,
    },

    // ---- ranges and state -----------------------------------------------

    /// A record index was out of range.
    #[error("record index {index} out of range: {count} records")]
    IndexOutOfRange {
        /// Requested index.
        index: i64,
        /// Number of live records.
        count: usize,
    },

    /// The iterator moved past the last record.
    #[error("iterator moved past the end of the database")]
    IteratorPastEndOfFile,

    /// The database holds no records.
    #[error("database is empty")]
    DatabaseEmpty,

    /// An `IN` predicate needs a value set on its right-hand side.
    #[error("IN operator requires a set of values")]
    HashSetExpected,

    /// Commit or rollback without an active transaction.
    #[error("no current transaction")]
    NoCurrentTransaction,

    /// A filter string failed to parse.
    #[error("invalid filter construct near position {position}: {message}")]
    InvalidFilterConstruct {
        /// Byte position near the offending token.
        position: usize,
        /// What went wrong.
        message: String,
    },

    /// An order-by clause named an unknown field.
    #[error("invalid order-by field name: {field}")]
    InvalidOrderByFieldName {
        /// Unknown name.
        field: String,
    },

    /// An order-by clause named an array field.
    #[error("cannot order by array field {field}")]
    CannotOrderByOnArrayField {
        /// Array field name.
        field: String,
    },

    // ---- crypto ---------------------------------------------------------

    /// The database is encrypted but no cipher was supplied.
    #[error("database is encrypted; open it with the cipher it was created with")]
    DbIsEncrypted,

    /// An encryption API was invoked but the handle has no cipher.
    #[error("no encryptor configured")]
    NoEncryptor,

    // ---- metadata -------------------------------------------------------

    /// User data must be a String or a byte array.
    #[error("invalid metadata type: user data must be a String or byte array")]
    InvalidMetaDataType,

    // ---- catch-all state violations -------------------------------------

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Why the operation is invalid.
        message: String,
    },
}

impl DbError {
    /// Creates an invalid-operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a filter parse error.
    pub fn invalid_filter(position: usize, message: impl Into<String>) -> Self {
        Self::InvalidFilterConstruct {
            position,
            message: message.into(),
        }
    }

    /// Creates a conversion error for a field.
    pub fn conversion(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ErrorConvertingValueForField {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid-field-name error.
    pub fn invalid_field_name(field: impl Into<String>) -> Self {
        Self::InvalidFieldName {
            field: field.into(),
        }
    }
}
