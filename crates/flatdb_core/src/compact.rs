//! Cleanup, format upgrade, and schema evolution.
//!
//! All three operations share one mechanism: the whole database is rebuilt
//! into an in-memory staging image (header, schema, live records, fresh
//! index tail), then swapped into the backing store in a single write
//! burst. Tombstones never survive a rewrite. A failure before the swap
//! leaves the original store untouched.

use crate::database::{user_blob_bytes, Database};
use crate::error::{DbError, DbResult};
use crate::header::{self, Header};
use crate::schema::{Field, Schema};
use flatdb_codec::Value;
use std::collections::BTreeSet;
use tracing::info;

impl Database {
    /// Rewrites the database without its tombstones.
    ///
    /// Live records keep their values, order, and encryption; deleted
    /// slots are physically removed and the free-list empties. A no-op
    /// when nothing is deleted.
    ///
    /// # Errors
    ///
    /// Returns an I/O error; the original store is untouched on failure
    /// before the final swap.
    pub fn clean(&mut self) -> DbResult<()> {
        self.ensure_writable()?;
        if self.index.free_len() == 0 {
            return Ok(());
        }

        let reclaimed = self.index.free_len();
        self.rewrite(self.schema.clone(), None)?;
        info!(reclaimed, "cleanup pass complete");
        Ok(())
    }

    /// Rewrites an older-major database at the current format version,
    /// re-enabling mutation.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::SchemaAlreadyUpToDate`] when the file is already
    /// current and [`DbError::DatabaseReadOnlyMode`] when the handle was
    /// opened read-only by configuration.
    pub fn upgrade(&mut self) -> DbResult<()> {
        self.ensure_open()?;
        if self.config.read_only {
            return Err(DbError::DatabaseReadOnlyMode);
        }
        if self.header.is_current() {
            return Err(DbError::SchemaAlreadyUpToDate);
        }

        let from = (self.header.major, self.header.minor);
        self.rewrite(self.schema.clone(), None)?;
        info!(
            from_major = from.0,
            from_minor = from.1,
            to_major = header::CURRENT_MAJOR,
            "format upgraded"
        );
        Ok(())
    }

    /// Appends new fields to the schema, populating them on every existing
    /// record.
    ///
    /// `defaults` is either empty (new fields start null) or one value per
    /// new field.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::FieldListIsEmpty`],
    /// [`DbError::PrimaryKeyCannotBeAdded`],
    /// [`DbError::FieldNameAlreadyExists`],
    /// [`DbError::CantAddOrRemoveFieldWithDeletedRecords`], a default
    /// conversion error, or an I/O error.
    pub fn add_fields(&mut self, fields: Vec<Field>, defaults: &[Value]) -> DbResult<()> {
        self.ensure_writable()?;
        if fields.is_empty() {
            return Err(DbError::FieldListIsEmpty);
        }
        if !defaults.is_empty() && defaults.len() != fields.len() {
            return Err(DbError::invalid_operation(format!(
                "{} defaults supplied for {} new fields",
                defaults.len(),
                fields.len()
            )));
        }
        if self.index.free_len() > 0 {
            return Err(DbError::CantAddOrRemoveFieldWithDeletedRecords);
        }

        for field in &fields {
            field.validate()?;
            if field.is_primary_key() {
                return Err(DbError::PrimaryKeyCannotBeAdded);
            }
            if self.schema.field(field.name()).is_some() {
                return Err(DbError::FieldNameAlreadyExists {
                    field: field.name().to_string(),
                });
            }
        }

        // Convert defaults against the new fields before any rewrite work.
        let mut converted = Vec::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            let default = defaults.get(i).cloned().unwrap_or(Value::Null);
            converted.push(self.convert_for_field(field, &default)?);
        }

        let mut all = self.schema.fields().to_vec();
        all.extend(fields.iter().cloned());
        let new_schema = Schema::new(all)?;

        let added = fields.len();
        self.rewrite(
            new_schema,
            Some(&|mut values: Vec<Value>| {
                values.extend(converted.iter().cloned());
                values
            }),
        )?;
        info!(added, "fields added");
        Ok(())
    }

    /// Removes fields from the schema, dropping their values from every
    /// record.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::FieldListIsEmpty`], [`DbError::InvalidFieldName`],
    /// [`DbError::CannotDeletePrimaryKeyField`],
    /// [`DbError::CantAddOrRemoveFieldWithDeletedRecords`], or an I/O
    /// error.
    pub fn delete_fields(&mut self, names: &[&str]) -> DbResult<()> {
        self.ensure_writable()?;
        if names.is_empty() {
            return Err(DbError::FieldListIsEmpty);
        }
        if self.index.free_len() > 0 {
            return Err(DbError::CantAddOrRemoveFieldWithDeletedRecords);
        }

        let mut removed = BTreeSet::new();
        for name in names {
            let field = self
                .schema
                .field(name)
                .ok_or_else(|| DbError::invalid_field_name(*name))?;
            if field.is_primary_key() {
                return Err(DbError::CannotDeletePrimaryKeyField {
                    field: field.name().to_string(),
                });
            }
            removed.insert(field.ordinal());
        }

        let kept: Vec<Field> = self
            .schema
            .fields()
            .iter()
            .filter(|f| !removed.contains(&f.ordinal()))
            .cloned()
            .collect();
        let new_schema = Schema::new(kept)?;

        let dropped = removed.clone();
        self.rewrite(
            new_schema,
            Some(&move |values: Vec<Value>| {
                values
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| !dropped.contains(i))
                    .map(|(_, v)| v)
                    .collect()
            }),
        )?;
        info!(removed = removed.len(), "fields removed");
        Ok(())
    }

    /// Renames a field, keeping every stored value.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::FieldNameIsEmpty`], [`DbError::InvalidFieldName`],
    /// [`DbError::FieldNameAlreadyExists`], or an I/O error.
    pub fn rename_field(&mut self, old: &str, new: &str) -> DbResult<()> {
        self.ensure_writable()?;
        if new.trim().is_empty() {
            return Err(DbError::FieldNameIsEmpty);
        }
        let ordinal = self
            .schema
            .field_ordinal(old)
            .ok_or_else(|| DbError::invalid_field_name(old))?;
        if let Some(existing) = self.schema.field_ordinal(new) {
            if existing != ordinal {
                return Err(DbError::FieldNameAlreadyExists {
                    field: new.to_string(),
                });
            }
        }

        let mut fields = self.schema.fields().to_vec();
        fields[ordinal].name = new.to_string();
        let new_schema = Schema::new(fields)?;

        // Record payloads are untouched; only the descriptor changes.
        self.rewrite(new_schema, None)?;
        info!(old, new, "field renamed");
        Ok(())
    }

    /// Rebuilds the whole store under `new_schema`.
    ///
    /// With no transform, live frames are copied verbatim (ciphertext
    /// included); with one, each record is decoded under the old schema,
    /// mapped, and re-encoded (and re-encrypted) under the new schema.
    /// Record order is preserved, so primary-key ordering survives.
    fn rewrite(
        &mut self,
        new_schema: Schema,
        transform: Option<&dyn Fn(Vec<Value>) -> Vec<Value>>,
    ) -> DbResult<()> {
        let new_header = Header {
            major: header::CURRENT_MAJOR,
            minor: header::CURRENT_MINOR,
            encrypted: self.header.encrypted,
            user_version: self.header.user_version,
        };

        let head = header::header_bytes(&new_header);
        let body_probe = header::body_bytes(&new_schema, 0, 0, 0, new_header.user_version);
        let data_start = u64::try_from(head.len() + body_probe.len())
            .map_err(|_| DbError::invalid_operation("schema descriptor exceeds 4 GiB"))?;

        // Stage every live record, noting its new offset.
        let mut records: Vec<u8> = Vec::new();
        let mut live: Vec<u32> = Vec::with_capacity(self.index.live_len());
        for &offset in self.index.live() {
            let new_offset = data_start + records.len() as u64;
            if new_offset > i32::MAX as u64 {
                return Err(DbError::invalid_operation(
                    "database would exceed the 2 GiB format limit",
                ));
            }
            live.push(new_offset as u32);

            match transform {
                None => records.extend(self.read_raw_frame(offset)?),
                Some(map) => {
                    let values = self.read_values(offset)?;
                    let mapped = map(values);
                    let plain = crate::record::encode_payload(&new_schema, &mapped)?;
                    let sealed = match &self.cipher {
                        Some(cipher) => cipher.encrypt(&plain),
                        None => plain,
                    };
                    records.extend_from_slice(&(sealed.len() as i32).to_le_bytes());
                    records.extend_from_slice(&sealed);
                }
            }
        }

        let index_start = data_start + records.len() as u64;
        if index_start > i32::MAX as u64 {
            return Err(DbError::invalid_operation(
                "database would exceed the 2 GiB format limit",
            ));
        }

        let body = header::body_bytes(
            &new_schema,
            live.len() as u32,
            0,
            index_start as u32,
            new_header.user_version,
        );

        let mut staged = head;
        staged.extend(body);
        staged.extend(records);
        for &offset in &live {
            staged.extend_from_slice(&(offset as i32).to_le_bytes());
        }
        staged.extend(user_blob_bytes(self.user_data.as_ref()));

        // Swap the staging image in as one write burst.
        self.backing.truncate(0)?;
        self.backing.write_at(0, &staged)?;
        self.backing.flush()?;
        self.backing.sync()?;

        self.header = new_header;
        self.schema = new_schema;
        self.index.replace(live, Vec::new());
        self.data_start = data_start as u32;
        self.index_start = index_start as u32;
        self.read_only = self.config.read_only;
        self.cursor.clear();
        Ok(())
    }
}
