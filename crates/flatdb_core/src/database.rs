//! Database handle: open/create, mutation engine, and queries.

use crate::config::Config;
use crate::crypto::RecordCipher;
use crate::cursor::CursorState;
use crate::error::{DbError, DbResult};
use crate::filter::{Filter, PreparedFilter};
use crate::header::{self, Header};
use crate::index::RecordIndex;
use crate::record::{compare_scalars, decode_key, decode_payload, encode_payload, Record};
use crate::schema::{Field, Schema};
use flatdb_codec::{ByteReader, CodecError, DataType, Value};
use flatdb_storage::{Backing, FileBacking};
use std::cmp::Ordering;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use tracing::{debug, info, warn};

/// A set of records returned by a query.
pub type Table = Vec<Record>;

/// The optional user blob stored after the index tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserData {
    /// A text blob.
    Text(String),
    /// A binary blob.
    Bytes(Vec<u8>),
}

/// A snapshot of the database's counters and layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DbStats {
    /// Live record count.
    pub num_records: usize,
    /// Tombstoned record count.
    pub num_deleted: usize,
    /// Offset of the first record frame.
    pub data_start: u32,
    /// Offset of the index tail.
    pub index_start: u32,
    /// Total backing size in bytes.
    pub file_size: u64,
    /// Format major version.
    pub major: u8,
    /// Format minor version.
    pub minor: u8,
    /// Whether records are encrypted.
    pub encrypted: bool,
}

type AddCallback = Box<dyn Fn(usize) + Send + Sync>;
type UpdateCallback = Box<dyn Fn(usize, &Record) + Send + Sync>;
type DeleteCallback = Box<dyn Fn(usize) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Callbacks {
    on_add: Option<AddCallback>,
    on_update: Option<UpdateCallback>,
    on_delete: Option<DeleteCallback>,
}

/// A single-file embedded database: one table with a fixed typed schema.
///
/// The whole database lives in one backing store: header, schema, record
/// frames, and the index tail. A handle owns its backing exclusively while
/// open; share a handle across threads by wrapping it in a mutex.
///
/// # Example
///
/// ```rust
/// use flatdb_core::{Database, Field, Record};
/// use flatdb_codec::DataType;
/// use flatdb_storage::MemoryBacking;
///
/// let fields = vec![
///     Field::new("id", DataType::Int32).primary_key().autoinc(1),
///     Field::new("name", DataType::String),
/// ];
/// let mut db = Database::create(Box::new(MemoryBacking::new()), fields, None).unwrap();
///
/// db.add(&Record::new().with("name", "alice")).unwrap();
/// let rec = db.get_by_key(&1i32.into()).unwrap().unwrap();
/// assert_eq!(rec.get("name").unwrap().as_text(), Some("alice"));
/// ```
pub struct Database {
    pub(crate) backing: Box<dyn Backing>,
    pub(crate) cipher: Option<Box<dyn RecordCipher>>,
    pub(crate) config: Config,
    pub(crate) header: Header,
    pub(crate) schema: Schema,
    pub(crate) index: RecordIndex,
    pub(crate) data_start: u32,
    pub(crate) index_start: u32,
    pub(crate) user_data: Option<UserData>,
    pub(crate) cursor: CursorState,
    pub(crate) read_only: bool,
    pub(crate) is_open: bool,
    pub(crate) autoinc_suspended: bool,
    pub(crate) snapshot: Option<Vec<u8>>,
    pub(crate) callbacks: Callbacks,
}

impl Database {
    // ---- lifecycle ------------------------------------------------------

    /// Creates a new database in `backing`, writing the header, schema,
    /// and an empty index tail.
    ///
    /// Pass a cipher to encrypt every record payload at rest; the choice
    /// is permanent for the database's lifetime.
    ///
    /// # Errors
    ///
    /// Returns a schema validation error or an I/O error.
    pub fn create(
        backing: Box<dyn Backing>,
        fields: Vec<Field>,
        cipher: Option<Box<dyn RecordCipher>>,
    ) -> DbResult<Self> {
        Self::create_with_config(backing, fields, cipher, Config::default())
    }

    /// Creates a new database with explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns a schema validation error or an I/O error.
    pub fn create_with_config(
        mut backing: Box<dyn Backing>,
        fields: Vec<Field>,
        cipher: Option<Box<dyn RecordCipher>>,
        config: Config,
    ) -> DbResult<Self> {
        if config.read_only {
            return Err(DbError::StreamMustBeWritable);
        }

        let schema = Schema::new(fields)?;
        let hdr = Header::current(cipher.is_some());

        // The body length is independent of the counter values, so the
        // data start can be computed before the final body is written.
        let head = header::header_bytes(&hdr);
        let probe = header::body_bytes(&schema, 0, 0, 0, hdr.user_version);
        let data_start = u32::try_from(head.len() + probe.len())
            .map_err(|_| DbError::invalid_operation("schema descriptor exceeds 4 GiB"))?;

        let body = header::body_bytes(&schema, 0, 0, data_start, hdr.user_version);
        backing.truncate(0)?;
        backing.write_at(0, &head)?;
        backing.write_at(head.len() as u64, &body)?;
        backing.truncate(u64::from(data_start))?;
        backing.flush()?;

        debug!(fields = schema.len(), encrypted = cipher.is_some(), "database created");

        Ok(Self {
            backing,
            cipher,
            config,
            header: hdr,
            schema,
            index: RecordIndex::new(),
            data_start,
            index_start: data_start,
            user_data: None,
            cursor: CursorState::default(),
            read_only: false,
            is_open: true,
            autoinc_suspended: false,
            snapshot: None,
            callbacks: Callbacks::default(),
        })
    }

    /// Opens an existing database from `backing`.
    ///
    /// An encrypted database requires the cipher it was created with; a
    /// plaintext database refuses a cipher. Databases at older major
    /// versions (2-5) open read-only until [`upgrade`](Self::upgrade).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidSignature`],
    /// [`DbError::UnsupportedNewerVersion`], [`DbError::DbIsEncrypted`],
    /// or a parse/I/O error.
    pub fn open(
        backing: Box<dyn Backing>,
        cipher: Option<Box<dyn RecordCipher>>,
        config: Config,
    ) -> DbResult<Self> {
        let mut db = Self {
            backing,
            cipher,
            config,
            header: Header::current(false),
            schema: Schema::new(vec![Field::new("placeholder", DataType::Int32)])?,
            index: RecordIndex::new(),
            data_start: 0,
            index_start: 0,
            user_data: None,
            cursor: CursorState::default(),
            read_only: false,
            is_open: true,
            autoinc_suspended: false,
            snapshot: None,
            callbacks: Callbacks::default(),
        };
        db.load_state()?;

        debug!(
            records = db.index.live_len(),
            deleted = db.index.free_len(),
            major = db.header.major,
            "database opened"
        );
        Ok(db)
    }

    /// Creates a file-backed database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::EmptyFilename`] for an empty path, plus anything
    /// [`create`](Self::create) can return.
    pub fn create_file(
        path: &Path,
        fields: Vec<Field>,
        cipher: Option<Box<dyn RecordCipher>>,
    ) -> DbResult<Self> {
        if path.as_os_str().is_empty() {
            return Err(DbError::EmptyFilename);
        }
        let backing = FileBacking::open(path).map_err(map_open_error)?;
        Self::create(Box::new(backing), fields, cipher)
    }

    /// Opens a file-backed database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::EmptyFilename`] for an empty path,
    /// [`DbError::DatabaseFileNotFound`] when no file exists, plus
    /// anything [`open`](Self::open) can return.
    pub fn open_file(
        path: &Path,
        cipher: Option<Box<dyn RecordCipher>>,
        config: Config,
    ) -> DbResult<Self> {
        if path.as_os_str().is_empty() {
            return Err(DbError::EmptyFilename);
        }
        if !path.exists() {
            return Err(DbError::DatabaseFileNotFound {
                path: path.display().to_string(),
            });
        }
        let backing = if config.read_only {
            FileBacking::open_read_only(path)?
        } else {
            FileBacking::open(path).map_err(map_open_error)?
        };
        Self::open(Box::new(backing), cipher, config)
    }

    /// Deletes the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::EmptyFilename`] for an empty path and
    /// [`DbError::DatabaseFileNotFound`] when no file exists.
    pub fn drop_database(path: &Path) -> DbResult<()> {
        if path.as_os_str().is_empty() {
            return Err(DbError::EmptyFilename);
        }
        if !path.exists() {
            return Err(DbError::DatabaseFileNotFound {
                path: path.display().to_string(),
            });
        }
        std::fs::remove_file(path).map_err(|e| DbError::Storage(e.into()))?;
        Ok(())
    }

    /// Flushes and closes the handle. Further operations fail with
    /// [`DbError::NoOpenDatabase`].
    ///
    /// # Errors
    ///
    /// Returns an I/O error from the final flush.
    pub fn close(&mut self) -> DbResult<()> {
        if self.is_open {
            if !self.read_only {
                self.backing.flush()?;
                self.backing.sync()?;
            }
            self.is_open = false;
        }
        Ok(())
    }

    /// Flushes buffered writes to the backing store.
    ///
    /// # Errors
    ///
    /// Returns an I/O error.
    pub fn flush(&mut self) -> DbResult<()> {
        self.ensure_open()?;
        self.backing.flush()?;
        Ok(())
    }

    // ---- accessors ------------------------------------------------------

    /// The table schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of live records.
    #[must_use]
    pub fn num_records(&self) -> usize {
        self.index.live_len()
    }

    /// Number of tombstoned records awaiting cleanup.
    #[must_use]
    pub fn num_deleted(&self) -> usize {
        self.index.free_len()
    }

    /// Whether record payloads are encrypted.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.header.encrypted
    }

    /// Whether the handle refuses mutations.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// The caller-defined version number stored in the header.
    #[must_use]
    pub fn user_version(&self) -> f32 {
        self.header.user_version
    }

    /// Sets the caller-defined version number.
    ///
    /// # Errors
    ///
    /// Returns an error when the database is closed or read-only.
    pub fn set_user_version(&mut self, version: f32) -> DbResult<()> {
        self.ensure_writable()?;
        self.header.user_version = version;
        self.persist_state()?;
        self.maybe_flush()
    }

    /// Counters and layout snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error when the handle is closed.
    pub fn stats(&self) -> DbResult<DbStats> {
        self.ensure_open()?;
        Ok(DbStats {
            num_records: self.index.live_len(),
            num_deleted: self.index.free_len(),
            data_start: self.data_start,
            index_start: self.index_start,
            file_size: self.backing.size()?,
            major: self.header.major,
            minor: self.header.minor,
            encrypted: self.header.encrypted,
        })
    }

    /// Suspends or resumes autoincrement assignment; suspended adds use
    /// the caller's values verbatim.
    pub fn set_autoinc_suspended(&mut self, suspended: bool) {
        self.autoinc_suspended = suspended;
    }

    /// Changes the auto-flush policy at runtime.
    pub fn set_auto_flush(&mut self, auto_flush: bool) {
        self.config.auto_flush = auto_flush;
    }

    /// Changes the auto-clean threshold at runtime.
    pub fn set_auto_clean_threshold(&mut self, threshold: Option<u32>) {
        self.config.auto_clean_threshold = threshold;
    }

    /// Installs or clears the callback fired after each add.
    pub fn set_on_add(&mut self, callback: Option<Box<dyn Fn(usize) + Send + Sync>>) {
        self.callbacks.on_add = callback;
    }

    /// Installs or clears the callback fired after each update.
    pub fn set_on_update(&mut self, callback: Option<Box<dyn Fn(usize, &Record) + Send + Sync>>) {
        self.callbacks.on_update = callback;
    }

    /// Installs or clears the callback fired after each delete.
    pub fn set_on_delete(&mut self, callback: Option<Box<dyn Fn(usize) + Send + Sync>>) {
        self.callbacks.on_delete = callback;
    }

    // ---- user data ------------------------------------------------------

    /// The user blob, if one is stored.
    #[must_use]
    pub fn user_data(&self) -> Option<&UserData> {
        self.user_data.as_ref()
    }

    /// Stores, replaces, or clears the user blob.
    ///
    /// Accepts `Value::Text`, an array of `Value::Byte`, or `Value::Null`
    /// to clear.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidMetaDataType`] for any other value shape.
    pub fn set_user_data(&mut self, value: Value) -> DbResult<()> {
        self.ensure_writable()?;
        self.user_data = match value {
            Value::Null => None,
            Value::Text(text) => Some(UserData::Text(text)),
            Value::Array(items) => {
                let mut bytes = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Byte(b) => bytes.push(b),
                        _ => return Err(DbError::InvalidMetaDataType),
                    }
                }
                Some(UserData::Bytes(bytes))
            }
            _ => return Err(DbError::InvalidMetaDataType),
        };
        self.write_tail()?;
        self.maybe_flush()
    }

    // ---- mutation: add --------------------------------------------------

    /// Adds a record, returning its position in the live index.
    ///
    /// Missing fields become null. Autoincrement fields are assigned from
    /// their counters (unless suspended). The returned position is
    /// volatile: any later mutation may move the record.
    ///
    /// # Errors
    ///
    /// Returns a validation, conversion, [`DbError::DuplicatePrimaryKey`],
    /// or I/O error.
    pub fn add(&mut self, record: &Record) -> DbResult<usize> {
        self.ensure_writable()?;

        let mut ordered = self.build_ordered(record, None)?;
        let consumed = self.fill_autoinc(&mut ordered);

        // A failed add must leave the autoinc counters where they were.
        match self.add_prepared(ordered) {
            Ok(pos) => {
                self.fire_on_add(pos);
                Ok(pos)
            }
            Err(e) => {
                self.restore_autoinc(&consumed);
                Err(e)
            }
        }
    }

    fn add_prepared(&mut self, ordered: Vec<Value>) -> DbResult<usize> {
        // Primary-key validation and sorted position
        let insert_pos = if let Some(pk) = self.schema.primary_key() {
            let key = ordered[0].clone();
            if key.is_null() {
                return Err(DbError::MissingPrimaryKey {
                    field: pk.name().to_string(),
                });
            }
            match self.search_key(&key)? {
                Ok(_) => {
                    return Err(DbError::DuplicatePrimaryKey {
                        key: key.to_text(),
                    })
                }
                Err(pos) => pos,
            }
        } else {
            self.index.live_len()
        };

        let payload = self.seal_payload(&ordered)?;
        let offset = self.place_record(&payload)?;
        self.index.insert_live(insert_pos, offset);

        self.finish_mutation()?;
        Ok(insert_pos)
    }

    // ---- mutation: update -----------------------------------------------

    /// Updates the record at live-index position `pos`.
    ///
    /// A partial record merges over the stored one: supplied fields
    /// override, missing fields keep their old values.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::IndexOutOfRange`] / [`DbError::DatabaseEmpty`],
    /// a validation or conversion error, or an I/O error.
    pub fn update_by_index(&mut self, pos: usize, record: &Record) -> DbResult<()> {
        self.ensure_writable()?;
        self.check_index(pos)?;

        let offset = self.index.live_at(pos);
        let old_values = self.read_values(offset)?;
        let old_key = self.schema.primary_key().map(|_| old_values[0].clone());

        let ordered = self.build_ordered(record, Some(old_values))?;

        // A changed primary key must stay unique and keep the index sorted.
        let new_sort_pos = match (&old_key, self.schema.primary_key()) {
            (Some(old), Some(_)) => {
                let new_key = &ordered[0];
                if new_key.is_null() {
                    let pk = self.schema.primary_key().map_or(String::new(), |f| {
                        f.name().to_string()
                    });
                    return Err(DbError::MissingPrimaryKey { field: pk });
                }
                if compare_scalars(old, new_key, false) == Some(Ordering::Equal) {
                    None
                } else {
                    match self.search_key(new_key)? {
                        Ok(_) => {
                            return Err(DbError::DuplicatePrimaryKey {
                                key: new_key.to_text(),
                            })
                        }
                        Err(p) => Some(p),
                    }
                }
            }
            _ => None,
        };

        let payload = self.seal_payload(&ordered)?;
        let capacity = self.slot_capacity(offset)?;

        let new_offset = if payload.len() as u32 <= capacity {
            // In-place rewrite
            self.write_frame(offset, &payload)?;
            offset
        } else {
            let relocated = self.place_record(&payload)?;
            self.tombstone_frame(offset)?;
            self.index.push_free(offset);
            relocated
        };
        self.index.set_live(pos, new_offset);

        // Reposition when the key changed
        if let Some(target) = new_sort_pos {
            let moved = self.index.remove_live(pos);
            let target = if target > pos { target - 1 } else { target };
            self.index.insert_live(target, moved);
        }

        self.finish_mutation()?;
        self.fire_on_update(pos, record);
        self.maybe_auto_clean()?;
        Ok(())
    }

    /// Updates the record carrying the given primary key.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::PrimaryKeyValueNotFound`] when no record has the
    /// key, plus anything [`update_by_index`](Self::update_by_index) can
    /// return.
    pub fn update_by_key(&mut self, key: &Value, record: &Record) -> DbResult<()> {
        self.ensure_writable()?;
        let key = self.convert_key(key)?;
        match self.search_key(&key)? {
            Ok(pos) => self.update_by_index(pos, record),
            Err(_) => Err(DbError::PrimaryKeyValueNotFound {
                key: key.to_text(),
            }),
        }
    }

    /// Updates every record matching the filter, returning how many.
    ///
    /// # Errors
    ///
    /// Returns a filter parse/prepare error or anything per-record update
    /// can return.
    pub fn update_where(&mut self, filter: &str, record: &Record) -> DbResult<usize> {
        let parsed = Filter::parse(filter)?;
        self.update_where_expr(&parsed, record)
    }

    /// [`update_where`](Self::update_where) over a pre-built filter tree.
    ///
    /// # Errors
    ///
    /// Returns a filter prepare error or anything per-record update can
    /// return.
    pub fn update_where_expr(&mut self, filter: &Filter, record: &Record) -> DbResult<usize> {
        self.ensure_writable()?;
        let matches = self.collect_matches(filter)?;

        // Updates can reorder the live index when the primary key changes,
        // so matched records are re-addressed by key where one exists.
        if self.schema.primary_key().is_some() {
            let keys: Vec<Value> = matches
                .iter()
                .map(|&pos| self.read_key_at(self.index.live_at(pos)))
                .collect::<DbResult<_>>()?;
            for key in &keys {
                self.update_by_key(key, record)?;
            }
            Ok(keys.len())
        } else {
            for &pos in &matches {
                self.update_by_index(pos, record)?;
            }
            Ok(matches.len())
        }
    }

    // ---- mutation: delete -----------------------------------------------

    /// Deletes the record at live-index position `pos`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::IndexOutOfRange`] / [`DbError::DatabaseEmpty`]
    /// or an I/O error.
    pub fn delete_by_index(&mut self, pos: usize) -> DbResult<bool> {
        self.ensure_writable()?;
        self.check_index(pos)?;

        let offset = self.index.remove_live(pos);
        self.tombstone_frame(offset)?;
        self.index.push_free(offset);

        self.finish_mutation()?;
        self.fire_on_delete(pos);
        self.maybe_auto_clean()?;
        Ok(true)
    }

    /// Deletes the record carrying the given primary key.
    ///
    /// Returns whether a record was deleted.
    ///
    /// # Errors
    ///
    /// Returns a key conversion or I/O error.
    pub fn delete_by_key(&mut self, key: &Value) -> DbResult<bool> {
        self.ensure_writable()?;
        let key = self.convert_key(key)?;
        match self.search_key(&key)? {
            Ok(pos) => self.delete_by_index(pos),
            Err(_) => Ok(false),
        }
    }

    /// Deletes every record matching the filter, returning how many.
    ///
    /// # Errors
    ///
    /// Returns a filter parse/prepare error or an I/O error.
    pub fn delete_where(&mut self, filter: &str) -> DbResult<usize> {
        let parsed = Filter::parse(filter)?;
        self.delete_where_expr(&parsed)
    }

    /// [`delete_where`](Self::delete_where) over a pre-built filter tree.
    ///
    /// # Errors
    ///
    /// Returns a filter prepare error or an I/O error.
    pub fn delete_where_expr(&mut self, filter: &Filter) -> DbResult<usize> {
        self.ensure_writable()?;
        let matches = self.collect_matches(filter)?;

        // Deleting from the highest position down keeps the remaining
        // matched positions valid.
        for &pos in matches.iter().rev() {
            let offset = self.index.remove_live(pos);
            self.tombstone_frame(offset)?;
            self.index.push_free(offset);
        }
        if !matches.is_empty() {
            self.finish_mutation()?;
            for &pos in &matches {
                self.fire_on_delete(pos);
            }
            self.maybe_auto_clean()?;
        }
        Ok(matches.len())
    }

    /// Deletes every record, returning how many.
    ///
    /// # Errors
    ///
    /// Returns an I/O error.
    pub fn delete_all(&mut self) -> DbResult<usize> {
        self.ensure_writable()?;
        let count = self.index.live_len();
        for pos in (0..count).rev() {
            let offset = self.index.remove_live(pos);
            self.tombstone_frame(offset)?;
            self.index.push_free(offset);
        }
        if count > 0 {
            self.finish_mutation()?;
            for pos in 0..count {
                self.fire_on_delete(pos);
            }
            self.maybe_auto_clean()?;
        }
        Ok(count)
    }

    // ---- queries --------------------------------------------------------

    /// Fetches the record carrying the given primary key, or `None`.
    ///
    /// # Errors
    ///
    /// Returns a key conversion or I/O error.
    pub fn get_by_key(&self, key: &Value) -> DbResult<Option<Record>> {
        self.get_by_key_projected(key, None, false)
    }

    /// [`get_by_key`](Self::get_by_key) with field projection and optional
    /// index reporting.
    ///
    /// # Errors
    ///
    /// Returns a projection validation, key conversion, or I/O error.
    pub fn get_by_key_projected(
        &self,
        key: &Value,
        fields: Option<&[&str]>,
        include_index: bool,
    ) -> DbResult<Option<Record>> {
        self.ensure_open()?;
        let projection = self.validate_projection(fields)?;
        let key = self.convert_key(key)?;
        match self.search_key(&key)? {
            Ok(pos) => {
                let values = self.read_values(self.index.live_at(pos))?;
                Ok(Some(self.make_record(
                    values,
                    projection.as_deref(),
                    include_index.then_some(pos),
                )))
            }
            Err(_) => Ok(None),
        }
    }

    /// Fetches the record at live-index position `pos`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::DatabaseEmpty`] / [`DbError::IndexOutOfRange`]
    /// or an I/O error.
    pub fn get_by_index(&self, pos: usize) -> DbResult<Record> {
        self.get_by_index_projected(pos, None, false)
    }

    /// [`get_by_index`](Self::get_by_index) with field projection and
    /// optional index reporting.
    ///
    /// # Errors
    ///
    /// Returns a projection validation or I/O error.
    pub fn get_by_index_projected(
        &self,
        pos: usize,
        fields: Option<&[&str]>,
        include_index: bool,
    ) -> DbResult<Record> {
        self.ensure_open()?;
        self.check_index(pos)?;
        let projection = self.validate_projection(fields)?;
        let values = self.read_values(self.index.live_at(pos))?;
        Ok(self.make_record(values, projection.as_deref(), include_index.then_some(pos)))
    }

    /// Returns every record, optionally projected and ordered.
    ///
    /// Order-by entries accept a leading `!` for descending and `~` for
    /// case-insensitive string comparison.
    ///
    /// # Errors
    ///
    /// Returns a projection or order-by validation error, or an I/O error.
    pub fn select_all(
        &self,
        fields: Option<&[&str]>,
        order_by: Option<&[&str]>,
        include_index: bool,
    ) -> DbResult<Table> {
        self.ensure_open()?;
        self.scan(None, fields, order_by, include_index)
    }

    /// Returns every record matching the filter string.
    ///
    /// # Errors
    ///
    /// Returns a filter parse/prepare error, a projection or order-by
    /// validation error, or an I/O error.
    pub fn select_where(
        &self,
        filter: &str,
        fields: Option<&[&str]>,
        order_by: Option<&[&str]>,
        include_index: bool,
    ) -> DbResult<Table> {
        let parsed = Filter::parse(filter)?;
        self.select_where_expr(&parsed, fields, order_by, include_index)
    }

    /// [`select_where`](Self::select_where) over a pre-built filter tree.
    ///
    /// # Errors
    ///
    /// Returns a filter prepare error, a projection or order-by validation
    /// error, or an I/O error.
    pub fn select_where_expr(
        &self,
        filter: &Filter,
        fields: Option<&[&str]>,
        order_by: Option<&[&str]>,
        include_index: bool,
    ) -> DbResult<Table> {
        self.ensure_open()?;
        let prepared = PreparedFilter::prepare(&self.schema, filter)?;
        self.scan(Some(&prepared), fields, order_by, include_index)
    }

    // ---- cursor ---------------------------------------------------------

    /// Positions the cursor on the first record.
    ///
    /// Returns whether at least one record exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the handle is closed.
    pub fn move_first(&mut self) -> DbResult<bool> {
        self.ensure_open()?;
        Ok(self.cursor.move_first(self.index.live_len()))
    }

    /// Advances the cursor, returning whether it still points at a record.
    ///
    /// # Errors
    ///
    /// Returns an error when the handle is closed.
    pub fn move_next(&mut self) -> DbResult<bool> {
        self.ensure_open()?;
        Ok(self.cursor.move_next(self.index.live_len()))
    }

    /// Fetches the record under the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::DatabaseEmpty`] when no records exist and
    /// [`DbError::IteratorPastEndOfFile`] when the cursor ran off the end
    /// or was invalidated by a mutation.
    pub fn current(&self) -> DbResult<Record> {
        self.current_projected(None, false)
    }

    /// [`current`](Self::current) with field projection and optional index
    /// reporting.
    ///
    /// # Errors
    ///
    /// Returns a projection validation error or anything
    /// [`current`](Self::current) can return.
    pub fn current_projected(
        &self,
        fields: Option<&[&str]>,
        include_index: bool,
    ) -> DbResult<Record> {
        self.ensure_open()?;
        if self.index.live_len() == 0 {
            return Err(DbError::DatabaseEmpty);
        }
        let pos = self
            .cursor
            .current(self.index.live_len())
            .ok_or(DbError::IteratorPastEndOfFile)?;
        let projection = self.validate_projection(fields)?;
        let values = self.read_values(self.index.live_at(pos))?;
        Ok(self.make_record(values, projection.as_deref(), include_index.then_some(pos)))
    }

    // ---- maintenance ----------------------------------------------------

    /// Rebuilds the live index ordering from the stored records and
    /// rewrites the tail. Useful after the sort order is damaged by an
    /// interrupted write.
    ///
    /// # Errors
    ///
    /// Returns an I/O error.
    pub fn reindex(&mut self) -> DbResult<()> {
        self.ensure_writable()?;

        if self.schema.primary_key().is_some() {
            let mut keyed: Vec<(Value, u32)> = Vec::with_capacity(self.index.live_len());
            for &offset in self.index.live() {
                keyed.push((self.read_key_at(offset)?, offset));
            }
            keyed.sort_by(|a, b| {
                compare_scalars(&a.0, &b.0, false).unwrap_or(Ordering::Equal)
            });
            let live: Vec<u32> = keyed.into_iter().map(|(_, offset)| offset).collect();
            let free = self.index.free().to_vec();
            self.index.replace(live, free);
        }

        self.finish_mutation()?;
        info!(records = self.index.live_len(), "index rebuilt");
        Ok(())
    }

    // ---- internals: validation ------------------------------------------

    pub(crate) fn ensure_open(&self) -> DbResult<()> {
        if self.is_open {
            Ok(())
        } else {
            Err(DbError::NoOpenDatabase)
        }
    }

    pub(crate) fn ensure_writable(&self) -> DbResult<()> {
        self.ensure_open()?;
        if self.read_only {
            return Err(DbError::DatabaseReadOnlyMode);
        }
        Ok(())
    }

    fn check_index(&self, pos: usize) -> DbResult<()> {
        if self.index.live_len() == 0 {
            return Err(DbError::DatabaseEmpty);
        }
        if pos >= self.index.live_len() {
            return Err(DbError::IndexOutOfRange {
                index: pos as i64,
                count: self.index.live_len(),
            });
        }
        Ok(())
    }

    /// Resolves a projection list to ordinals, rejecting unknown and
    /// repeated names.
    fn validate_projection(&self, fields: Option<&[&str]>) -> DbResult<Option<Vec<usize>>> {
        let Some(names) = fields else {
            return Ok(None);
        };
        let mut ordinals = Vec::with_capacity(names.len());
        for name in names {
            let ordinal = self
                .schema
                .field_ordinal(name)
                .ok_or_else(|| DbError::invalid_field_name(*name))?;
            if ordinals.contains(&ordinal) {
                return Err(DbError::FieldSpecifiedTwice {
                    field: (*name).to_string(),
                });
            }
            ordinals.push(ordinal);
        }
        Ok(Some(ordinals))
    }

    /// Builds the full ordinal-ordered value list for a record, merging
    /// over `base` when updating.
    fn build_ordered(&self, record: &Record, base: Option<Vec<Value>>) -> DbResult<Vec<Value>> {
        let mut ordered = base.unwrap_or_else(|| vec![Value::Null; self.schema.len()]);

        for (name, value) in record.iter() {
            let ordinal = self
                .schema
                .field_ordinal(name)
                .ok_or_else(|| DbError::invalid_field_name(name))?;
            let field = &self.schema.fields()[ordinal];
            ordered[ordinal] = self.convert_for_field(field, value)?;
        }
        Ok(ordered)
    }

    pub(crate) fn convert_for_field(&self, field: &Field, value: &Value) -> DbResult<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        if field.is_array() {
            let items = value.as_array().ok_or_else(|| DbError::NonArrayValue {
                field: field.name().to_string(),
            })?;
            let converted = items
                .iter()
                .map(|item| self.convert_scalar(field, item))
                .collect::<DbResult<Vec<_>>>()?;
            return Ok(Value::Array(converted));
        }
        self.convert_scalar(field, value)
    }

    fn convert_scalar(&self, field: &Field, value: &Value) -> DbResult<Value> {
        value.convert_to(field.data_type()).map_err(|e| match e {
            CodecError::CannotConvert { message, .. } => DbError::conversion(field.name(), message),
            CodecError::InvalidDataType { expected, actual } => DbError::InvalidDataType {
                field: field.name().to_string(),
                expected,
                actual,
            },
            other => DbError::Codec(other),
        })
    }

    /// Assigns autoinc values and advances the counters, returning the
    /// prior counter values so a failed add can put them back.
    fn fill_autoinc(&mut self, ordered: &mut [Value]) -> Vec<(usize, i32)> {
        if self.autoinc_suspended {
            return Vec::new();
        }
        let mut consumed = Vec::new();
        for ordinal in 0..self.schema.len() {
            if self.schema.fields()[ordinal].is_autoinc() {
                if let Some(value) = self.schema.take_autoinc(ordinal) {
                    ordered[ordinal] = Value::Int32(value);
                    consumed.push((ordinal, value));
                }
            }
        }
        consumed
    }

    fn restore_autoinc(&mut self, consumed: &[(usize, i32)]) {
        for &(ordinal, value) in consumed {
            self.schema.field_mut(ordinal).cur_autoinc = Some(value);
        }
    }

    /// Converts a lookup key to the primary key's type.
    pub(crate) fn convert_key(&self, key: &Value) -> DbResult<Value> {
        let pk = self
            .schema
            .primary_key()
            .ok_or_else(|| DbError::invalid_operation("table has no primary key"))?;
        if key.is_null() {
            return Err(DbError::MissingPrimaryKey {
                field: pk.name().to_string(),
            });
        }
        if key.as_array().is_some() {
            return Err(DbError::InvalidKeyFieldType {
                actual: key.type_name(),
            });
        }
        key.convert_to(pk.data_type())
            .map_err(|_| DbError::MismatchedKeyFieldTypes {
                expected: pk.data_type().name(),
                actual: key.type_name(),
            })
    }

    // ---- internals: record I/O ------------------------------------------

    /// Serializes and, when a cipher is set, encrypts a record payload.
    fn seal_payload(&self, ordered: &[Value]) -> DbResult<Vec<u8>> {
        let plain = encode_payload(&self.schema, ordered)?;
        Ok(match &self.cipher {
            Some(cipher) => cipher.encrypt(&plain),
            None => plain,
        })
    }

    /// Reads a frame's stored size word.
    fn read_size(&self, offset: u32) -> DbResult<i32> {
        let bytes = self.backing.read_at(u64::from(offset), 4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// A tombstone or live frame's payload capacity.
    pub(crate) fn slot_capacity(&self, offset: u32) -> DbResult<u32> {
        Ok(self.read_size(offset)?.unsigned_abs())
    }

    /// Reads a live record's payload, decrypting when needed.
    pub(crate) fn read_payload(&self, offset: u32) -> DbResult<Vec<u8>> {
        let size = self.read_size(offset)?;
        if size < 0 {
            return Err(DbError::invalid_operation(
                "live index references a tombstoned record",
            ));
        }
        let raw = self
            .backing
            .read_at(u64::from(offset) + 4, size as usize)?;
        match &self.cipher {
            Some(cipher) => cipher.decrypt(&raw),
            None => Ok(raw),
        }
    }

    /// Reads a live record's raw frame bytes (size word plus payload,
    /// ciphertext included), for verbatim copying.
    pub(crate) fn read_raw_frame(&self, offset: u32) -> DbResult<Vec<u8>> {
        let size = self.read_size(offset)?;
        let len = 4 + size.unsigned_abs() as usize;
        self.backing
            .read_at(u64::from(offset), len)
            .map_err(DbError::Storage)
    }

    /// Decodes a live record into ordinal-ordered values.
    pub(crate) fn read_values(&self, offset: u32) -> DbResult<Vec<Value>> {
        let payload = self.read_payload(offset)?;
        decode_payload(&self.schema, &payload)
    }

    /// Decodes only the primary key of a live record.
    pub(crate) fn read_key_at(&self, offset: u32) -> DbResult<Value> {
        let payload = self.read_payload(offset)?;
        decode_key(&self.schema, &payload)
    }

    fn search_key(&self, key: &Value) -> DbResult<Result<usize, usize>> {
        self.index
            .binary_search_key(key, |offset| self.read_key_at(offset))
    }

    /// Writes a live frame at `offset`.
    fn write_frame(&mut self, offset: u32, payload: &[u8]) -> DbResult<()> {
        let mut frame = Vec::with_capacity(4 + payload.len());
        frame.extend_from_slice(&(payload.len() as i32).to_le_bytes());
        frame.extend_from_slice(payload);
        self.backing.write_at(u64::from(offset), &frame)?;
        Ok(())
    }

    /// Negates a frame's size word, tombstoning the slot.
    fn tombstone_frame(&mut self, offset: u32) -> DbResult<()> {
        let size = self.read_size(offset)?;
        if size > 0 {
            self.backing
                .write_at(u64::from(offset), &(-size).to_le_bytes())?;
        }
        Ok(())
    }

    /// Places a sealed payload: first-fit into the free-list, otherwise
    /// appended at the current index start.
    fn place_record(&mut self, payload: &[u8]) -> DbResult<u32> {
        let needed = payload.len() as u32;

        let fit = self
            .index
            .first_fit(needed, |offset| self.slot_capacity(offset))?;
        if let Some(slot) = fit {
            let offset = self.index.remove_free(slot);
            self.write_frame(offset, payload)?;
            return Ok(offset);
        }

        let offset = self.index_start;
        let end = u64::from(offset) + 4 + u64::from(needed);
        if end > i32::MAX as u64 {
            return Err(DbError::invalid_operation(
                "database would exceed the 2 GiB format limit",
            ));
        }
        self.write_frame(offset, payload)?;
        self.index_start = end as u32;
        Ok(offset)
    }

    // ---- internals: persistence -----------------------------------------

    /// Rewrites the counters and schema descriptor in place.
    pub(crate) fn persist_state(&mut self) -> DbResult<()> {
        let body = header::body_bytes(
            &self.schema,
            self.index.live_len() as u32,
            self.index.free_len() as u32,
            self.index_start,
            self.header.user_version,
        );
        self.backing
            .write_at(self.header.counters_offset(), &body)?;
        Ok(())
    }

    /// Rewrites the tail region: live index, free-list, user blob; then
    /// truncates the backing to the tail's end.
    pub(crate) fn write_tail(&mut self) -> DbResult<()> {
        let mut tail = self.index.tail_bytes();
        tail.extend(user_blob_bytes(self.user_data.as_ref()));

        let start = u64::from(self.index_start);
        if start < self.backing.size()? {
            // Shrink first so stale tail bytes never survive
            self.backing.truncate(start)?;
        }
        self.backing.write_at(start, &tail)?;
        Ok(())
    }

    pub(crate) fn maybe_flush(&mut self) -> DbResult<()> {
        if self.config.auto_flush {
            self.backing.flush()?;
        }
        Ok(())
    }

    /// Post-mutation bookkeeping: invalidate the cursor, persist counters
    /// and the tail, honor auto-flush.
    pub(crate) fn finish_mutation(&mut self) -> DbResult<()> {
        self.cursor.clear();
        self.persist_state()?;
        self.write_tail()?;
        self.maybe_flush()
    }

    fn maybe_auto_clean(&mut self) -> DbResult<()> {
        if let Some(threshold) = self.config.auto_clean_threshold {
            if self.index.free_len() > threshold as usize {
                debug!(
                    deleted = self.index.free_len(),
                    threshold, "auto-clean triggered"
                );
                self.clean()?;
            }
        }
        Ok(())
    }

    // ---- internals: loading ---------------------------------------------

    /// Loads header, schema, index, and user blob from the backing store.
    pub(crate) fn load_state(&mut self) -> DbResult<()> {
        let prefix = header::read_prefix(self.backing.as_ref())?;

        if prefix.header.encrypted && self.cipher.is_none() {
            return Err(DbError::DbIsEncrypted);
        }
        if !prefix.header.encrypted && self.cipher.is_some() {
            return Err(DbError::invalid_operation(
                "database is not encrypted; open it without a cipher",
            ));
        }

        let size = self.backing.size()?;
        let tail_start = u64::from(prefix.index_start);
        if tail_start > size {
            return Err(DbError::invalid_operation(
                "index start offset beyond end of file",
            ));
        }
        let tail = self
            .backing
            .read_at(tail_start, (size - tail_start) as usize)?;
        let (index, consumed) = RecordIndex::from_tail(
            &tail,
            prefix.num_records as usize,
            prefix.num_deleted as usize,
        )?;

        self.user_data = parse_user_blob(&tail[consumed..])?;
        self.read_only = self.config.read_only || !prefix.header.is_current();
        self.header = prefix.header;
        self.schema = prefix.schema;
        self.data_start = prefix.data_start;
        self.index_start = prefix.index_start;
        self.index = index;
        self.cursor.clear();
        Ok(())
    }

    // ---- internals: queries ---------------------------------------------

    /// Collects live-index positions matching a filter, ascending.
    fn collect_matches(&self, filter: &Filter) -> DbResult<Vec<usize>> {
        let prepared = PreparedFilter::prepare(&self.schema, filter)?;
        let mut matches = Vec::new();
        for pos in 0..self.index.live_len() {
            let values = self.read_values(self.index.live_at(pos))?;
            if prepared.matches(&values) {
                matches.push(pos);
            }
        }
        Ok(matches)
    }

    fn scan(
        &self,
        filter: Option<&PreparedFilter>,
        fields: Option<&[&str]>,
        order_by: Option<&[&str]>,
        include_index: bool,
    ) -> DbResult<Table> {
        let projection = self.validate_projection(fields)?;
        let order = self.parse_order_by(order_by)?;

        let mut rows: Vec<(Vec<Value>, usize)> = Vec::new();
        for pos in 0..self.index.live_len() {
            let values = self.read_values(self.index.live_at(pos))?;
            if filter.map_or(true, |f| f.matches(&values)) {
                rows.push((values, pos));
            }
        }

        if !order.is_empty() {
            rows.sort_by(|a, b| compare_rows(&a.0, &b.0, &order));
        }

        Ok(rows
            .into_iter()
            .map(|(values, pos)| {
                self.make_record(values, projection.as_deref(), include_index.then_some(pos))
            })
            .collect())
    }

    /// Parses order-by entries: optional `!` (descending) and `~`
    /// (case-insensitive) prefixes, then a field name.
    fn parse_order_by(&self, order_by: Option<&[&str]>) -> DbResult<Vec<OrderSpec>> {
        let Some(entries) = order_by else {
            return Ok(Vec::new());
        };
        let mut specs = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut name = *entry;
            let mut descending = false;
            let mut case_insensitive = false;
            loop {
                if let Some(rest) = name.strip_prefix('!') {
                    descending = true;
                    name = rest;
                } else if let Some(rest) = name.strip_prefix('~') {
                    case_insensitive = true;
                    name = rest;
                } else {
                    break;
                }
            }
            let field = self
                .schema
                .field(name)
                .ok_or_else(|| DbError::InvalidOrderByFieldName {
                    field: name.to_string(),
                })?;
            if field.is_array() {
                return Err(DbError::CannotOrderByOnArrayField {
                    field: name.to_string(),
                });
            }
            specs.push(OrderSpec {
                ordinal: field.ordinal(),
                descending,
                case_insensitive,
            });
        }
        Ok(specs)
    }

    fn make_record(
        &self,
        values: Vec<Value>,
        projection: Option<&[usize]>,
        index: Option<usize>,
    ) -> Record {
        let mut record = Record::new();
        match projection {
            Some(ordinals) => {
                for &ordinal in ordinals {
                    record.set(
                        self.schema.fields()[ordinal].name(),
                        values[ordinal].clone(),
                    );
                }
            }
            None => {
                for (field, value) in self.schema.fields().iter().zip(values) {
                    record.set(field.name(), value);
                }
            }
        }
        if let Some(pos) = index {
            record.set_index(pos);
        }
        record
    }

    // ---- internals: callbacks -------------------------------------------

    fn fire_on_add(&self, pos: usize) {
        if let Some(callback) = &self.callbacks.on_add {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(pos))).is_err() {
                warn!(pos, "on_add callback panicked");
            }
        }
    }

    fn fire_on_update(&self, pos: usize, record: &Record) {
        if let Some(callback) = &self.callbacks.on_update {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(pos, record))).is_err() {
                warn!(pos, "on_update callback panicked");
            }
        }
    }

    fn fire_on_delete(&self, pos: usize) {
        if let Some(callback) = &self.callbacks.on_delete {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(pos))).is_err() {
                warn!(pos, "on_delete callback panicked");
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct OrderSpec {
    ordinal: usize,
    descending: bool,
    case_insensitive: bool,
}

fn compare_rows(a: &[Value], b: &[Value], specs: &[OrderSpec]) -> Ordering {
    for spec in specs {
        let (va, vb) = (&a[spec.ordinal], &b[spec.ordinal]);
        let order = match (va.is_null(), vb.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => {
                compare_scalars(va, vb, spec.case_insensitive).unwrap_or(Ordering::Equal)
            }
        };
        let order = if spec.descending { order.reverse() } else { order };
        if order != Ordering::Equal {
            return order;
        }
    }
    Ordering::Equal
}

/// Serializes the optional user blob: `[type_tag:i32][payload]`.
pub(crate) fn user_blob_bytes(user_data: Option<&UserData>) -> Vec<u8> {
    let mut buf = Vec::new();
    match user_data {
        None => {}
        Some(UserData::Text(text)) => {
            buf.extend_from_slice(&i32::from(DataType::String.code()).to_le_bytes());
            flatdb_codec::write_len_prefixed_str(&mut buf, text);
        }
        Some(UserData::Bytes(bytes)) => {
            buf.extend_from_slice(&i32::from(DataType::Byte.code()).to_le_bytes());
            buf.extend_from_slice(&(bytes.len() as i32).to_le_bytes());
            buf.extend_from_slice(bytes);
        }
    }
    buf
}

fn parse_user_blob(bytes: &[u8]) -> DbResult<Option<UserData>> {
    if bytes.is_empty() {
        return Ok(None);
    }
    let mut reader = ByteReader::new(bytes);
    let tag = reader.read_i32().map_err(DbError::Codec)?;

    if tag == i32::from(DataType::String.code()) {
        let text = reader.read_len_prefixed_str().map_err(DbError::Codec)?;
        Ok(Some(UserData::Text(text)))
    } else if tag == i32::from(DataType::Byte.code()) {
        let len = reader.read_i32().map_err(DbError::Codec)?;
        if len < 0 {
            return Err(DbError::InvalidMetaDataType);
        }
        let data = reader.read_bytes(len as usize).map_err(DbError::Codec)?;
        Ok(Some(UserData::Bytes(data.to_vec())))
    } else {
        Err(DbError::InvalidMetaDataType)
    }
}

fn map_open_error(e: flatdb_storage::StorageError) -> DbError {
    if let flatdb_storage::StorageError::Io(io) = &e {
        if io.kind() == std::io::ErrorKind::PermissionDenied {
            return DbError::StreamMustBeWritable;
        }
    }
    DbError::Storage(e)
}
