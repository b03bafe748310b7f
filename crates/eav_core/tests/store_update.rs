use chrono::{Duration, TimeZone, Utc};
use eav_core::db::{open_db, open_db_in_memory, DbError};
use eav_core::{
    Attributes, Changes, DataType, Datom, EntityId, RawValue, RepoError, SqliteStore, StoreError,
    Value,
};
use rusqlite::Connection;
use std::collections::BTreeMap;
use uuid::Uuid;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

#[test]
fn smoke_update_read_and_forget_attribute() {
    let conn = setup();
    let store = SqliteStore::try_new(&conn, 1).unwrap();
    store.define_attribute("count", DataType::Number).unwrap();

    assert!(store.attributes("abcdefg").unwrap().is_empty());

    let merged = store
        .update("abcdefg", Changes::new().set("count", 359))
        .unwrap();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged["count"], Value::Number(359.0));
    assert_eq!(store.attributes("abcdefg").unwrap(), merged);

    store.forget_attribute("count").unwrap();
    assert!(store.attributes("abcdefg").unwrap().is_empty());
}

#[test]
fn stores_isolate_types_and_data() {
    let conn = setup();
    let first = SqliteStore::try_new(&conn, 1).unwrap();
    let second = SqliteStore::try_new(&conn, 2).unwrap();
    first.define_attribute("country", DataType::String).unwrap();
    second.define_attribute("country", DataType::Number).unwrap();

    first
        .update("thing", Changes::new().set("country", "Kanada"))
        .unwrap();
    let numeric = second
        .update("thing", Changes::new().set("country", 49))
        .unwrap();
    assert_eq!(numeric["country"], Value::Number(49.0));

    let err = first
        .update("thing", Changes::new().set("country", 49))
        .unwrap_err();
    assert!(matches!(
        &err,
        StoreError::TypeMismatch { attribute, expected: DataType::String, .. } if attribute == "country"
    ));
    assert_eq!(
        err.to_string(),
        "cannot assign integer to string attribute \"country\""
    );

    first.forget_attribute("country").unwrap();
    assert!(first.attributes("thing").unwrap().is_empty());

    let expected: Attributes = BTreeMap::from([("country".to_string(), Value::Number(49.0))]);
    assert_eq!(second.attributes("thing").unwrap(), expected);

    let updated = second
        .update("thing", Changes::new().set("country", 32))
        .unwrap();
    assert_eq!(updated["country"].as_number(), Some(32.0));
}

#[test]
fn every_datatype_survives_update_and_read_back() {
    let conn = setup();
    let store = SqliteStore::try_new(&conn, 1).unwrap();
    store.define_attribute("someTime", DataType::Time).unwrap();
    store.define_attribute("regionCode", DataType::String).unwrap();
    store.define_attribute("maxBudget", DataType::Number).unwrap();
    store.define_attribute("exclusive", DataType::Boolean).unwrap();

    let base =
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 15, 30).unwrap() + Duration::nanoseconds(123_456_789);
    let rounds = [
        ("V8Z3T3", 124561.36, true, base),
        ("V83ZT3", 1261.6, false, base + Duration::days(1)),
    ];

    for (region, budget, exclusive, at) in rounds {
        let changes = Changes::new()
            .set("regionCode", region)
            .set("maxBudget", budget)
            .set("exclusive", exclusive)
            .set("someTime", at);
        let expected: Attributes = BTreeMap::from([
            ("regionCode".to_string(), Value::String(region.to_string())),
            ("maxBudget".to_string(), Value::Number(budget)),
            ("exclusive".to_string(), Value::Boolean(exclusive)),
            ("someTime".to_string(), Value::Time(at)),
        ]);

        assert_eq!(store.update("first", changes).unwrap(), expected);
        assert_eq!(store.attributes("first").unwrap(), expected);
    }
}

#[test]
fn explicit_removal_drops_attribute_and_sets_others() {
    let conn = setup();
    let store = SqliteStore::try_new(&conn, 1).unwrap();
    store.define_attribute("label", DataType::String).unwrap();
    store.define_attribute("other", DataType::String).unwrap();

    store
        .update(1, Changes::new().set("label", "whatever"))
        .unwrap();
    assert_eq!(
        store.attributes(1).unwrap()["label"].as_str(),
        Some("whatever")
    );

    let merged = store
        .update(1, Changes::new().remove("label").set("other", "hi"))
        .unwrap();
    let expected: Attributes = BTreeMap::from([("other".to_string(), Value::String("hi".into()))]);
    assert_eq!(merged, expected);
    assert_eq!(store.attributes(1).unwrap(), expected);
}

#[test]
fn removing_an_attribute_the_entity_lacks_is_noop() {
    let conn = setup();
    let store = SqliteStore::try_new(&conn, 1).unwrap();
    store.define_attribute("label", DataType::String).unwrap();
    store.define_attribute("count", DataType::Number).unwrap();
    store.update("e", Changes::new().set("count", 3)).unwrap();

    let merged = store.update("e", Changes::new().remove("label")).unwrap();

    assert!(!merged.contains_key("label"));
    assert_eq!(merged["count"], Value::Number(3.0));
    assert_eq!(store.attributes("e").unwrap(), merged);
}

#[test]
fn update_keeps_untouched_attributes_in_merged_result() {
    let conn = setup();
    let store = SqliteStore::try_new(&conn, 1).unwrap();
    store.define_attribute("a", DataType::String).unwrap();
    store.define_attribute("b", DataType::Number).unwrap();

    store.update("e", Changes::new().set("a", "kept")).unwrap();
    let merged = store.update("e", Changes::new().set("b", 2_u64)).unwrap();

    assert_eq!(merged["a"].as_str(), Some("kept"));
    assert_eq!(merged["b"].as_number(), Some(2.0));
}

#[test]
fn undefined_attribute_fails_whole_update() {
    let conn = setup();
    let store = SqliteStore::try_new(&conn, 1).unwrap();
    store.define_attribute("aaa", DataType::String).unwrap();

    let err = store
        .update(
            1,
            Changes::new().set("aaa", "staged").set("non-existant", "ok"),
        )
        .unwrap_err();

    assert!(matches!(&err, StoreError::UndefinedAttribute(name) if name == "non-existant"));
    assert_eq!(err.to_string(), "attribute \"non-existant\" is not defined");
    assert!(store.attributes(1).unwrap().is_empty());
}

#[test]
fn failed_update_leaves_stored_facts_untouched() {
    let conn = setup();
    let store = SqliteStore::try_new(&conn, 1).unwrap();
    store.define_attribute("label", DataType::String).unwrap();
    store.define_attribute("zcount", DataType::Number).unwrap();
    store
        .update("e", Changes::new().set("label", "keep").set("zcount", 1))
        .unwrap();
    let before = store.attributes("e").unwrap();

    let err = store
        .update(
            "e",
            Changes::new().remove("label").set("zcount", "not a number"),
        )
        .unwrap_err();

    assert!(matches!(err, StoreError::TypeMismatch { .. }));
    assert_eq!(store.attributes("e").unwrap(), before);
}

#[test]
fn forget_entity_clears_only_that_entity() {
    let conn = setup();
    let store = SqliteStore::try_new(&conn, 1).unwrap();
    store.define_attribute("rrr", DataType::String).unwrap();
    store.define_attribute("sss", DataType::String).unwrap();

    store
        .update("thing/1", Changes::new().set("rrr", "ok").set("sss", "blah"))
        .unwrap();
    store
        .update("thing/2", Changes::new().set("rrr", "still here"))
        .unwrap();
    let schema = store.schema().unwrap();

    store.forget_entity("thing/1").unwrap();
    store.forget_entity("never-seen").unwrap();

    assert_eq!(store.attributes("thing/1").unwrap(), Attributes::new());
    assert_eq!(
        store.attributes("thing/2").unwrap()["rrr"].as_str(),
        Some("still here")
    );
    assert_eq!(store.schema().unwrap(), schema);
}

#[test]
fn entity_id_variants_do_not_alias() {
    let conn = setup();
    let store = SqliteStore::try_new(&conn, 1).unwrap();
    store.define_attribute("n", DataType::Number).unwrap();
    let id = Uuid::new_v4();

    store.update("1", Changes::new().set("n", 1)).unwrap();
    store.update(1, Changes::new().set("n", 2)).unwrap();
    store.update(id, Changes::new().set("n", 3)).unwrap();

    assert_eq!(store.attributes("1").unwrap()["n"], Value::Number(1.0));
    assert_eq!(store.attributes(1).unwrap()["n"], Value::Number(2.0));
    assert_eq!(
        store.attributes(EntityId::Uuid(id)).unwrap()["n"],
        Value::Number(3.0)
    );
    assert!(store
        .attributes(EntityId::Text(id.to_string()))
        .unwrap()
        .is_empty());
}

#[test]
fn assert_and_retract_are_idempotent_primitives() {
    let conn = setup();
    let store = SqliteStore::try_new(&conn, 1).unwrap();
    let label = store.define_attribute("label", DataType::String).unwrap();

    let first = label.datom("e", "one").unwrap();
    let second = label.datom("e", "two").unwrap();
    store.assert(&[first.clone()]).unwrap();
    store.assert(&[second.clone()]).unwrap();
    assert_eq!(store.attributes("e").unwrap()["label"].as_str(), Some("two"));

    store.retract(&[second.clone()]).unwrap();
    store.retract(&[second]).unwrap();
    store.retract(&[]).unwrap();
    assert!(store.attributes("e").unwrap().is_empty());
}

#[test]
fn assert_for_undefined_attribute_surfaces_persistence_error() {
    let conn = setup();
    let store = SqliteStore::try_new(&conn, 1).unwrap();

    let err = store
        .assert(&[Datom::new("e", "ghost", Value::Boolean(true))])
        .unwrap_err();

    assert!(matches!(
        err,
        StoreError::Repo(RepoError::Db(DbError::Sqlite(_)))
    ));
}

#[test]
fn unknown_stored_datatype_is_reported_not_masked() {
    let conn = setup();
    conn.execute_batch(
        "INSERT INTO eav_schema (store_id, name, datatype) VALUES (1, 'broken', 9);
         INSERT INTO eav_datoms (store_id, entity_id, attribute_name, stringval)
         VALUES (1, 'e', 'broken', 'x');",
    )
    .unwrap();
    let store = SqliteStore::try_new(&conn, 1).unwrap();

    let err = store.attributes("e").unwrap_err();
    assert!(matches!(
        err,
        StoreError::Repo(RepoError::InvalidData(message)) if message.contains("`9`")
    ));
    assert!(matches!(
        store.schema(),
        Err(StoreError::Repo(RepoError::InvalidData(_)))
    ));
}

#[test]
fn empty_value_slot_for_declared_type_is_reported() {
    let conn = setup();
    let store = SqliteStore::try_new(&conn, 1).unwrap();
    store.define_attribute("label", DataType::String).unwrap();
    conn.execute(
        "INSERT INTO eav_datoms (store_id, entity_id, attribute_name, numberval)
         VALUES (1, 'e', 'label', 4.0);",
        [],
    )
    .unwrap();

    let err = store.attributes("e").unwrap_err();
    assert!(matches!(err, StoreError::Repo(RepoError::InvalidData(_))));
}

#[test]
fn update_inside_rolled_back_transaction_leaves_nothing() {
    let mut conn = setup();
    {
        let store = SqliteStore::try_new(&conn, 1).unwrap();
        store.define_attribute("count", DataType::Number).unwrap();
    }

    let tx = conn.transaction().unwrap();
    {
        let store = SqliteStore::try_new(&tx, 1).unwrap();
        let merged = store.update("e", Changes::new().set("count", 5)).unwrap();
        assert_eq!(merged["count"], Value::Number(5.0));
    }
    tx.rollback().unwrap();

    let store = SqliteStore::try_new(&conn, 1).unwrap();
    assert!(store.attributes("e").unwrap().is_empty());
    assert!(store.schema().unwrap().contains_key("count"));
}

#[test]
fn facts_persist_across_file_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("eav.db");

    {
        let conn = open_db(&path).unwrap();
        let store = SqliteStore::try_new(&conn, 3).unwrap();
        store.define_attribute("flag", DataType::Boolean).unwrap();
        store.update("e", Changes::new().set("flag", true)).unwrap();
    }

    let conn = open_db(&path).unwrap();
    let store = SqliteStore::try_new(&conn, 3).unwrap();
    assert_eq!(store.attributes("e").unwrap()["flag"], Value::Boolean(true));
}

#[test]
fn changes_collect_from_plain_maps() {
    let conn = setup();
    let store = SqliteStore::try_new(&conn, 1).unwrap();
    store.define_attribute("count", DataType::Number).unwrap();

    let raw: BTreeMap<String, Option<RawValue>> =
        BTreeMap::from([("count".to_string(), Some(RawValue::from(7_i64)))]);
    let merged = store.update("e", raw).unwrap();
    assert_eq!(merged["count"], Value::Number(7.0));

    let changes: Changes = vec![("count".to_string(), None)].into_iter().collect();
    assert_eq!(changes.len(), 1);
    assert!(store.update("e", changes).unwrap().is_empty());
}

#[test]
fn special_floats_survive_update_and_read_back() {
    let conn = setup();
    let store = SqliteStore::try_new(&conn, 1).unwrap();
    store.define_attribute("n", DataType::Number).unwrap();

    for special in [f64::INFINITY, f64::NEG_INFINITY, -0.0, 0.0, f64::MAX, f64::MIN_POSITIVE] {
        let updated = store.update("e", Changes::new().set("n", special)).unwrap();
        assert_eq!(updated["n"], Value::Number(special));
        assert_eq!(store.attributes("e").unwrap()["n"], Value::Number(special));
    }
}

#[test]
fn nan_update_is_rejected_and_entity_stays_readable() {
    let conn = setup();
    let store = SqliteStore::try_new(&conn, 1).unwrap();
    store.define_attribute("n", DataType::Number).unwrap();
    store.define_attribute("s", DataType::String).unwrap();
    store.update("e", Changes::new().set("n", 1.5)).unwrap();

    let err = store
        .update("e", Changes::new().set("n", f64::NAN).set("s", "x"))
        .unwrap_err();
    match &err {
        StoreError::TypeMismatch {
            attribute,
            offered,
            expected,
        } => {
            assert_eq!(attribute, "n");
            assert_eq!(*offered, "NaN");
            assert_eq!(*expected, DataType::Number);
        }
        other => panic!("unexpected error: {other}"),
    }

    let facts = store.attributes("e").unwrap();
    assert_eq!(facts.len(), 1);
    assert_eq!(facts["n"], Value::Number(1.5));
    store.update("e", Changes::new().set("s", "y")).unwrap();
    store.forget_entity("e").unwrap();
    assert!(store.attributes("e").unwrap().is_empty());
}

#[test]
fn asserting_nan_directly_fails_without_writing() {
    let conn = setup();
    let store = SqliteStore::try_new(&conn, 1).unwrap();
    store.define_attribute("n", DataType::Number).unwrap();
    store.define_attribute("s", DataType::String).unwrap();

    let err = store
        .assert(&[
            Datom::new("e", "s", Value::String("x".to_string())),
            Datom::new("e", "n", Value::Number(f64::NAN)),
        ])
        .unwrap_err();

    assert!(matches!(err, StoreError::Repo(RepoError::InvalidData(_))));
    assert!(store.attributes("e").unwrap().is_empty());
}
