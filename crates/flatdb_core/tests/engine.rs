//! API-surface behavior: cursors, projections, ordering, callbacks,
//! error paths, and runtime toggles.

use flatdb_codec::DataType;
use flatdb_core::{Config, Database, DbError, Field, Record, Value};
use flatdb_storage::MemoryBacking;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

fn people_db() -> Database {
    let mut db = Database::create(
        Box::new(MemoryBacking::new()),
        vec![
            Field::new("id", DataType::Int32).primary_key().autoinc(1),
            Field::new("name", DataType::String),
            Field::new("age", DataType::Int32),
        ],
        None,
    )
    .unwrap();

    for (name, age) in [("carol", 35), ("alice", 30), ("bob", 25)] {
        db.add(&Record::new().with("name", name).with("age", age))
            .unwrap();
    }
    db
}

#[test]
fn cursor_walks_and_mutation_invalidates() {
    let mut db = people_db();

    assert!(db.move_first().unwrap());
    let mut names = vec![db.current().unwrap().get("name").unwrap().to_text()];
    while db.move_next().unwrap() {
        names.push(db.current().unwrap().get("name").unwrap().to_text());
    }
    assert_eq!(names, vec!["carol", "alice", "bob"]);
    assert!(matches!(db.current(), Err(DbError::IteratorPastEndOfFile)));

    db.move_first().unwrap();
    db.add(&Record::new().with("name", "dave").with("age", 50))
        .unwrap();
    assert!(matches!(db.current(), Err(DbError::IteratorPastEndOfFile)));
}

#[test]
fn cursor_on_empty_database() {
    let mut db = Database::create(
        Box::new(MemoryBacking::new()),
        vec![Field::new("n", DataType::Int32)],
        None,
    )
    .unwrap();

    assert!(!db.move_first().unwrap());
    assert!(matches!(db.current(), Err(DbError::DatabaseEmpty)));
}

#[test]
fn projection_and_include_index() {
    let db = people_db();

    let rows = db
        .select_all(Some(&["name"]), Some(&["id"]), true)
        .unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows[0].get("age").is_none());
    assert_eq!(rows[0].get("name").unwrap().as_text(), Some("carol"));
    assert_eq!(rows[0].index(), Some(0));
    assert_eq!(rows[2].index(), Some(2));

    assert!(matches!(
        db.select_all(Some(&["ghost"]), None, false),
        Err(DbError::InvalidFieldName { .. })
    ));
    assert!(matches!(
        db.select_all(Some(&["name", "NAME"]), None, false),
        Err(DbError::FieldSpecifiedTwice { .. })
    ));
}

#[test]
fn order_by_directions_and_case() {
    let db = people_db();

    let by_age_desc = db.select_all(None, Some(&["!age"]), false).unwrap();
    let ages: Vec<i32> = by_age_desc
        .iter()
        .map(|r| r.get("age").unwrap().as_i32().unwrap())
        .collect();
    assert_eq!(ages, vec![35, 30, 25]);

    let by_name = db.select_all(None, Some(&["~name"]), false).unwrap();
    let names: Vec<&str> = by_name
        .iter()
        .map(|r| r.get("name").unwrap().as_text().unwrap())
        .collect();
    assert_eq!(names, vec!["alice", "bob", "carol"]);

    assert!(matches!(
        db.select_all(None, Some(&["ghost"]), false),
        Err(DbError::InvalidOrderByFieldName { .. })
    ));
}

#[test]
fn order_by_array_field_rejected() {
    let db = Database::create(
        Box::new(MemoryBacking::new()),
        vec![
            Field::new("id", DataType::Int32).primary_key(),
            Field::new("tags", DataType::String).array(),
        ],
        None,
    )
    .unwrap();

    assert!(matches!(
        db.select_all(None, Some(&["tags"]), false),
        Err(DbError::CannotOrderByOnArrayField { .. })
    ));
}

#[test]
fn partial_update_merges_over_old_values() {
    let mut db = people_db();

    db.update_by_key(&2i32.into(), &Record::new().with("age", 31))
        .unwrap();

    let updated = db.get_by_key(&2i32.into()).unwrap().unwrap();
    assert_eq!(updated.get("name").unwrap().as_text(), Some("alice"));
    assert_eq!(updated.get("age").unwrap().as_i32(), Some(31));
}

#[test]
fn update_can_move_the_primary_key() {
    let mut db = people_db();

    db.update_by_key(&1i32.into(), &Record::new().with("id", 99))
        .unwrap();

    assert!(db.get_by_key(&1i32.into()).unwrap().is_none());
    let moved = db.get_by_key(&99i32.into()).unwrap().unwrap();
    assert_eq!(moved.get("name").unwrap().as_text(), Some("carol"));

    // Index stays sorted after the move
    let ids: Vec<i32> = db
        .select_all(None, None, false)
        .unwrap()
        .iter()
        .map(|r| r.get("id").unwrap().as_i32().unwrap())
        .collect();
    assert_eq!(ids, vec![2, 3, 99]);

    // Moving onto an existing key is rejected
    assert!(matches!(
        db.update_by_key(&2i32.into(), &Record::new().with("id", 3)),
        Err(DbError::DuplicatePrimaryKey { .. })
    ));
}

#[test]
fn update_where_and_delete_where() {
    let mut db = people_db();

    let touched = db
        .update_where("age < 35", &Record::new().with("age", 99))
        .unwrap();
    assert_eq!(touched, 2);
    let old = db.select_where("age = 99", None, None, false).unwrap();
    assert_eq!(old.len(), 2);

    let removed = db.delete_where("age = 99").unwrap();
    assert_eq!(removed, 2);
    assert_eq!(db.num_records(), 1);
    assert_eq!(db.num_deleted(), 2);

    assert_eq!(db.delete_where("age = 12345").unwrap(), 0);
}

#[test]
fn delete_all() {
    let mut db = people_db();
    assert_eq!(db.delete_all().unwrap(), 3);
    assert_eq!(db.num_records(), 0);
    assert_eq!(db.num_deleted(), 3);
    assert_eq!(db.delete_all().unwrap(), 0);
}

#[test]
fn missing_key_paths() {
    let mut db = people_db();

    assert!(db.get_by_key(&777i32.into()).unwrap().is_none());
    assert!(!db.delete_by_key(&777i32.into()).unwrap());
    assert!(matches!(
        db.update_by_key(&777i32.into(), &Record::new().with("age", 1)),
        Err(DbError::PrimaryKeyValueNotFound { .. })
    ));
    assert!(matches!(
        db.get_by_index(50),
        Err(DbError::IndexOutOfRange { .. })
    ));
}

#[test]
fn key_type_mismatch() {
    let db = people_db();
    assert!(matches!(
        db.get_by_key(&"not a number".into()),
        Err(DbError::MismatchedKeyFieldTypes { .. })
    ));
    // Coercible keys are accepted
    assert!(db.get_by_key(&"2".into()).unwrap().is_some());
}

#[test]
fn unknown_field_in_record_rejected() {
    let mut db = people_db();
    let result = db.add(&Record::new().with("name", "x").with("ghost", 1));
    assert!(matches!(result, Err(DbError::InvalidFieldName { .. })));
}

#[test]
fn value_conversion_on_add() {
    let mut db = people_db();

    // Numeric strings convert into Int32 fields
    let pos = db
        .add(&Record::new().with("name", "eve").with("age", "44"))
        .unwrap();
    let record = db.get_by_index(pos).unwrap();
    assert_eq!(record.get("age").unwrap().as_i32(), Some(44));

    let result = db.add(&Record::new().with("name", "mallory").with("age", "old"));
    assert!(matches!(
        result,
        Err(DbError::ErrorConvertingValueForField { .. })
    ));
}

#[test]
fn autoinc_suspension_uses_caller_values() {
    let mut db = people_db();

    db.set_autoinc_suspended(true);
    db.add(&Record::new().with("id", 500).with("name", "manual").with("age", 1))
        .unwrap();
    assert!(db.get_by_key(&500i32.into()).unwrap().is_some());

    db.set_autoinc_suspended(false);
    db.add(&Record::new().with("name", "auto").with("age", 2)).unwrap();
    // Counter continued from where suspension left it
    assert!(db.get_by_key(&4i32.into()).unwrap().is_some());
}

#[test]
fn callbacks_fire_and_panics_are_swallowed() {
    let mut db = people_db();

    let adds = Arc::new(AtomicUsize::new(0));
    let deletes = Arc::new(AtomicUsize::new(0));

    let adds_counter = Arc::clone(&adds);
    db.set_on_add(Some(Box::new(move |_| {
        adds_counter.fetch_add(1, Ordering::SeqCst);
    })));
    let deletes_counter = Arc::clone(&deletes);
    db.set_on_delete(Some(Box::new(move |_| {
        deletes_counter.fetch_add(1, Ordering::SeqCst);
        panic!("listener misbehaves");
    })));

    db.add(&Record::new().with("name", "dave").with("age", 1)).unwrap();
    assert_eq!(adds.load(Ordering::SeqCst), 1);

    // The panic in on_delete never reaches the caller
    db.delete_by_index(0).unwrap();
    assert_eq!(deletes.load(Ordering::SeqCst), 1);
    assert_eq!(db.num_records(), 3);
}

#[test]
fn auto_clean_threshold_triggers() {
    let mut db = Database::create_with_config(
        Box::new(MemoryBacking::new()),
        vec![
            Field::new("id", DataType::Int32).primary_key(),
            Field::new("s", DataType::String),
        ],
        None,
        Config::new().auto_clean_threshold(Some(2)),
    )
    .unwrap();

    for id in 1..=5 {
        db.add(&Record::new().with("id", id).with("s", "x")).unwrap();
    }
    db.delete_by_key(&1i32.into()).unwrap();
    db.delete_by_key(&2i32.into()).unwrap();
    assert_eq!(db.num_deleted(), 2);

    // Crossing the threshold runs the cleanup pass
    db.delete_by_key(&3i32.into()).unwrap();
    assert_eq!(db.num_deleted(), 0);
    assert_eq!(db.num_records(), 2);
}

#[test]
fn user_data_type_validation() {
    let mut db = people_db();

    db.set_user_data(Value::Text("notes".to_string())).unwrap();
    assert!(matches!(
        db.user_data(),
        Some(flatdb_core::UserData::Text(t)) if t == "notes"
    ));

    db.set_user_data(Value::Array(vec![Value::Byte(1), Value::Byte(2)]))
        .unwrap();
    assert!(matches!(
        db.user_data(),
        Some(flatdb_core::UserData::Bytes(b)) if b == &[1, 2]
    ));

    assert!(matches!(
        db.set_user_data(Value::Int32(5)),
        Err(DbError::InvalidMetaDataType)
    ));

    db.set_user_data(Value::Null).unwrap();
    assert!(db.user_data().is_none());
}

#[test]
fn read_only_mode_blocks_mutation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db.fdb");

    {
        let mut db = Database::create_file(
            &path,
            vec![
                Field::new("id", DataType::Int32).primary_key(),
                Field::new("s", DataType::String),
            ],
            None,
        )
        .unwrap();
        db.add(&Record::new().with("id", 1).with("s", "x")).unwrap();
        db.close().unwrap();
    }

    let mut db = Database::open_file(&path, None, Config::new().read_only(true)).unwrap();
    assert!(db.get_by_key(&1i32.into()).unwrap().is_some());
    assert!(matches!(
        db.add(&Record::new().with("id", 2).with("s", "y")),
        Err(DbError::DatabaseReadOnlyMode)
    ));
    assert!(matches!(db.clean(), Err(DbError::DatabaseReadOnlyMode)));
}

#[test]
fn closed_handle_refuses_operations() {
    let mut db = people_db();
    db.close().unwrap();

    assert!(matches!(db.get_by_index(0), Err(DbError::NoOpenDatabase)));
    assert!(matches!(
        db.add(&Record::new().with("name", "x").with("age", 1)),
        Err(DbError::NoOpenDatabase)
    ));
    assert!(matches!(db.flush(), Err(DbError::NoOpenDatabase)));
}

#[test]
fn drop_database_paths() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db.fdb");

    assert!(matches!(
        Database::drop_database(&path),
        Err(DbError::DatabaseFileNotFound { .. })
    ));
    assert!(matches!(
        Database::drop_database(Path::new("")),
        Err(DbError::EmptyFilename)
    ));

    let mut db = Database::create_file(
        &path,
        vec![Field::new("n", DataType::Int32)],
        None,
    )
    .unwrap();
    db.close().unwrap();

    Database::drop_database(&path).unwrap();
    assert!(!path.exists());
}

#[test]
fn upgrade_on_current_version_is_rejected() {
    let mut db = people_db();
    assert!(matches!(db.upgrade(), Err(DbError::SchemaAlreadyUpToDate)));
}

#[test]
fn schema_change_guards() {
    let mut db = people_db();

    assert!(matches!(
        db.add_fields(vec![], &[]),
        Err(DbError::FieldListIsEmpty)
    ));
    assert!(matches!(
        db.add_fields(
            vec![Field::new("id2", DataType::Int32).primary_key()],
            &[]
        ),
        Err(DbError::PrimaryKeyCannotBeAdded)
    ));
    assert!(matches!(
        db.add_fields(vec![Field::new("NAME", DataType::String)], &[]),
        Err(DbError::FieldNameAlreadyExists { .. })
    ));
    assert!(matches!(
        db.delete_fields(&["id"]),
        Err(DbError::CannotDeletePrimaryKeyField { .. })
    ));
    assert!(matches!(
        db.delete_fields(&["ghost"]),
        Err(DbError::InvalidFieldName { .. })
    ));

    // Deleted records block add/remove until a clean
    db.delete_by_index(0).unwrap();
    assert!(matches!(
        db.add_fields(vec![Field::new("extra", DataType::Bool)], &[]),
        Err(DbError::CantAddOrRemoveFieldWithDeletedRecords)
    ));
    db.clean().unwrap();
    db.add_fields(vec![Field::new("extra", DataType::Bool)], &[])
        .unwrap();
    assert!(db.schema().field("extra").is_some());
}

#[test]
fn delete_fields_drops_values() {
    let mut db = people_db();
    db.delete_fields(&["age"]).unwrap();

    assert!(db.schema().field("age").is_none());
    let record = db.get_by_key(&1i32.into()).unwrap().unwrap();
    assert!(record.get("age").is_none());
    assert_eq!(record.get("name").unwrap().as_text(), Some("carol"));
}

#[test]
fn reindex_restores_sort_order() {
    let mut db = people_db();
    db.reindex().unwrap();

    let ids: Vec<i32> = db
        .select_all(None, None, false)
        .unwrap()
        .iter()
        .map(|r| r.get("id").unwrap().as_i32().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn stats_snapshot() {
    let db = people_db();
    let stats = db.stats().unwrap();

    assert_eq!(stats.num_records, 3);
    assert_eq!(stats.num_deleted, 0);
    assert_eq!(stats.major, 6);
    assert!(!stats.encrypted);
    assert!(stats.index_start > stats.data_start);
    assert!(stats.file_size >= u64::from(stats.index_start));
}

#[test]
fn user_version_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db.fdb");

    {
        let mut db = Database::create_file(
            &path,
            vec![Field::new("n", DataType::Int32)],
            None,
        )
        .unwrap();
        db.set_user_version(3.5).unwrap();
        db.close().unwrap();
    }

    let db = Database::open_file(&path, None, Config::default()).unwrap();
    assert!((db.user_version() - 3.5).abs() < f32::EPSILON);
}
