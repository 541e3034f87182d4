//! Field descriptors and table schema.

use crate::error::{DbError, DbResult};
use flatdb_codec::DataType;

/// Schema-descriptor flag bit: the field is autoincrementing.
pub(crate) const FIELD_FLAG_AUTOINC: i32 = 0x1;
/// Schema-descriptor flag bit: the field holds an array.
pub(crate) const FIELD_FLAG_ARRAY: i32 = 0x2;

/// A field descriptor: one typed column of the table.
///
/// Build one with [`Field::new`] and the builder methods, then hand the
/// full list to [`Database::create`](crate::Database::create). Ordinals are
/// assigned by the schema; the primary key field is moved to ordinal 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub(crate) name: String,
    pub(crate) data_type: DataType,
    pub(crate) is_array: bool,
    pub(crate) is_primary_key: bool,
    pub(crate) autoinc_start: Option<i32>,
    pub(crate) cur_autoinc: Option<i32>,
    pub(crate) comment: Option<String>,
    pub(crate) ordinal: usize,
}

impl Field {
    /// Creates a scalar field of the given type.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            is_array: false,
            is_primary_key: false,
            autoinc_start: None,
            cur_autoinc: None,
            comment: None,
            ordinal: 0,
        }
    }

    /// Marks this field as an array of its scalar type.
    #[must_use]
    pub fn array(mut self) -> Self {
        self.is_array = true;
        self
    }

    /// Marks this field as the table's primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    /// Makes this field autoincrementing, starting at `start`.
    ///
    /// Only meaningful on Int32 fields; the schema rejects anything else.
    #[must_use]
    pub fn autoinc(mut self, start: i32) -> Self {
        self.autoinc_start = Some(start);
        self.cur_autoinc = Some(start);
        self
    }

    /// Attaches a descriptive comment, persisted in the schema.
    #[must_use]
    pub fn with_comment(mut self, text: impl Into<String>) -> Self {
        self.comment = Some(text.into());
        self
    }

    /// The field's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The field's scalar type (element type when an array).
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Whether this field holds an array.
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.is_array
    }

    /// Whether this field is the primary key.
    #[must_use]
    pub fn is_primary_key(&self) -> bool {
        self.is_primary_key
    }

    /// Whether this field autoincrements.
    #[must_use]
    pub fn is_autoinc(&self) -> bool {
        self.autoinc_start.is_some()
    }

    /// The autoincrement start value, if any.
    #[must_use]
    pub fn autoinc_start(&self) -> Option<i32> {
        self.autoinc_start
    }

    /// The next autoincrement value to be handed out, if any.
    #[must_use]
    pub fn cur_autoinc(&self) -> Option<i32> {
        self.cur_autoinc
    }

    /// The field's comment, if any.
    #[must_use]
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// The field's 0-based position in the record layout.
    #[must_use]
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub(crate) fn validate(&self) -> DbResult<()> {
        if self.name.trim().is_empty() {
            return Err(DbError::FieldNameIsEmpty);
        }
        if self.is_primary_key && (self.is_array || !self.data_type.is_valid_primary_key()) {
            return Err(DbError::InvalidPrimaryKeyType {
                field: self.name.clone(),
            });
        }
        if self.autoinc_start.is_some() && (self.data_type != DataType::Int32 || self.is_array) {
            return Err(DbError::InvalidTypeInSchema {
                field: self.name.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn flags(&self) -> i32 {
        let mut flags = 0;
        if self.is_autoinc() {
            flags |= FIELD_FLAG_AUTOINC;
        }
        if self.is_array {
            flags |= FIELD_FLAG_ARRAY;
        }
        flags
    }
}

/// An ordered list of field descriptors.
///
/// Field names are unique case-insensitively. If a primary key exists it
/// occupies ordinal 0; the remaining fields keep their declared order.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<Field>,
    primary_key: Option<usize>,
}

impl Schema {
    /// Builds and validates a schema from field descriptors.
    ///
    /// The primary key field, if any, is moved to the front and ordinals
    /// are assigned.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the list is empty, a name is empty or
    /// duplicated, more than one primary key is flagged, the primary key
    /// type is not Int32 or String, or autoincrement is requested on a
    /// non-Int32 field.
    pub fn new(mut fields: Vec<Field>) -> DbResult<Self> {
        if fields.is_empty() {
            return Err(DbError::FieldListIsEmpty);
        }

        for field in &fields {
            field.validate()?;
        }

        let pk_count = fields.iter().filter(|f| f.is_primary_key).count();
        if pk_count > 1 {
            return Err(DbError::DatabaseAlreadyHasPrimaryKey);
        }

        // Primary key moves to ordinal 0 and is persisted first.
        if let Some(pos) = fields.iter().position(|f| f.is_primary_key) {
            let pk = fields.remove(pos);
            fields.insert(0, pk);
        }

        let mut schema = Self {
            fields,
            primary_key: None,
        };
        schema.reindex_fields()?;
        Ok(schema)
    }

    /// Reassigns ordinals and rechecks name uniqueness.
    pub(crate) fn reindex_fields(&mut self) -> DbResult<()> {
        for i in 0..self.fields.len() {
            for j in (i + 1)..self.fields.len() {
                if self.fields[i].name.eq_ignore_ascii_case(&self.fields[j].name) {
                    return Err(DbError::FieldNameAlreadyExists {
                        field: self.fields[j].name.clone(),
                    });
                }
            }
        }
        for (ordinal, field) in self.fields.iter_mut().enumerate() {
            field.ordinal = ordinal;
        }
        self.primary_key = self.fields.iter().position(|f| f.is_primary_key);
        Ok(())
    }

    /// The fields in ordinal order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema has no fields. A valid schema never does.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Looks up a field by name, case-insensitively.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Looks up a field's ordinal by name, case-insensitively.
    #[must_use]
    pub fn field_ordinal(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// The primary key field, if one exists.
    #[must_use]
    pub fn primary_key(&self) -> Option<&Field> {
        self.primary_key.map(|i| &self.fields[i])
    }

    /// Bytes needed by the record nullmask: one bit per field.
    #[must_use]
    pub fn nullmask_len(&self) -> usize {
        self.fields.len().div_ceil(8)
    }

    /// Hands out the next autoincrement value for the field at `ordinal`
    /// and advances the counter.
    pub(crate) fn take_autoinc(&mut self, ordinal: usize) -> Option<i32> {
        let field = &mut self.fields[ordinal];
        let value = field.cur_autoinc?;
        field.cur_autoinc = Some(value.wrapping_add(1));
        Some(value)
    }

    pub(crate) fn field_mut(&mut self, ordinal: usize) -> &mut Field {
        &mut self.fields[ordinal]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_key_moves_to_front() {
        let schema = Schema::new(vec![
            Field::new("name", DataType::String),
            Field::new("id", DataType::Int32).primary_key(),
        ])
        .unwrap();

        assert_eq!(schema.fields()[0].name(), "id");
        assert_eq!(schema.fields()[0].ordinal(), 0);
        assert_eq!(schema.fields()[1].name(), "name");
        assert_eq!(schema.primary_key().unwrap().name(), "id");
    }

    #[test]
    fn empty_field_list_rejected() {
        assert!(matches!(Schema::new(vec![]), Err(DbError::FieldListIsEmpty)));
    }

    #[test]
    fn empty_name_rejected() {
        let result = Schema::new(vec![Field::new("  ", DataType::Int32)]);
        assert!(matches!(result, Err(DbError::FieldNameIsEmpty)));
    }

    #[test]
    fn duplicate_names_rejected_case_insensitively() {
        let result = Schema::new(vec![
            Field::new("Name", DataType::String),
            Field::new("name", DataType::Int32),
        ]);
        assert!(matches!(result, Err(DbError::FieldNameAlreadyExists { .. })));
    }

    #[test]
    fn two_primary_keys_rejected() {
        let result = Schema::new(vec![
            Field::new("a", DataType::Int32).primary_key(),
            Field::new("b", DataType::String).primary_key(),
        ]);
        assert!(matches!(result, Err(DbError::DatabaseAlreadyHasPrimaryKey)));
    }

    #[test]
    fn bad_primary_key_types_rejected() {
        let result = Schema::new(vec![Field::new("id", DataType::Guid).primary_key()]);
        assert!(matches!(result, Err(DbError::InvalidPrimaryKeyType { .. })));

        let result = Schema::new(vec![Field::new("id", DataType::Int32).array().primary_key()]);
        assert!(matches!(result, Err(DbError::InvalidPrimaryKeyType { .. })));
    }

    #[test]
    fn autoinc_requires_int32() {
        let result = Schema::new(vec![Field::new("n", DataType::Int64).autoinc(1)]);
        assert!(matches!(result, Err(DbError::InvalidTypeInSchema { .. })));

        let schema = Schema::new(vec![Field::new("n", DataType::Int32).autoinc(5)]).unwrap();
        assert_eq!(schema.fields()[0].cur_autoinc(), Some(5));
    }

    #[test]
    fn take_autoinc_advances() {
        let mut schema = Schema::new(vec![Field::new("id", DataType::Int32).autoinc(10)]).unwrap();
        assert_eq!(schema.take_autoinc(0), Some(10));
        assert_eq!(schema.take_autoinc(0), Some(11));
        assert_eq!(schema.fields()[0].cur_autoinc(), Some(12));
    }

    #[test]
    fn case_insensitive_lookup() {
        let schema = Schema::new(vec![
            Field::new("Id", DataType::Int32).primary_key(),
            Field::new("Name", DataType::String),
        ])
        .unwrap();

        assert_eq!(schema.field("id").unwrap().name(), "Id");
        assert_eq!(schema.field_ordinal("NAME"), Some(1));
        assert!(schema.field("missing").is_none());
    }

    #[test]
    fn nullmask_len() {
        let fields: Vec<Field> = (0..9)
            .map(|i| Field::new(format!("f{i}"), DataType::Int32))
            .collect();
        let schema = Schema::new(fields).unwrap();
        assert_eq!(schema.nullmask_len(), 2);

        let one = Schema::new(vec![Field::new("a", DataType::Bool)]).unwrap();
        assert_eq!(one.nullmask_len(), 1);
    }
}
