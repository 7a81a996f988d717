mod common;

use std::num::NonZeroU32;

use common::{key, payload, setup_db};
use serde_json::json;
use slot_sync::{
    checkpoint::{CheckpointStore, SqliteCheckpointStore},
    grid::TimeGrid,
    lookup::{LookupError, LookupOutcome, lookup},
    preallocate::run_preallocation,
};

fn day_grid() -> TimeGrid {
    TimeGrid::new(
        key("1990-05-17 00:00:00"),
        key("1990-05-17 23:00:00"),
        NonZeroU32::new(2).unwrap(),
    )
    .unwrap()
}

#[test]
fn pending_slot_is_not_found_until_filled() {
    let (_db, mut conn) = setup_db();
    let store = SqliteCheckpointStore::new();
    let report = run_preallocation(&store, &mut conn, &day_grid()).unwrap();
    assert_eq!(report.inserted, 12);

    let outcome = lookup(&store, &mut conn, Some("1990-05-17"), Some("09-11")).unwrap();
    assert_eq!(outcome, LookupOutcome::NotFound);

    store
        .upsert(
            &mut conn,
            key("1990-05-17 10:00:00"),
            "bz-42",
            &payload(&[
                ("yearPillar", json!("庚午")),
                ("wuXing", json!("{\"water\":1}")),
            ]),
        )
        .unwrap();

    match lookup(&store, &mut conn, Some("1990-05-17"), Some("09-11")).unwrap() {
        LookupOutcome::Found(found) => {
            assert_eq!(found.slot.to_string(), "1990-05-17 10:00:00");
            assert_eq!(found.external_id, "bz-42");
            assert_eq!(found.payload.get("yearPillar"), Some(&json!("庚午")));
            assert_eq!(found.payload.decoded("wuXing"), Some(json!({ "water": 1 })));
        }
        LookupOutcome::NotFound => panic!("filled slot should be found"),
    }
}

#[test]
fn out_of_range_and_malformed_inputs_are_not_found() {
    let (_db, mut conn) = setup_db();
    let store = SqliteCheckpointStore::new();
    run_preallocation(&store, &mut conn, &day_grid()).unwrap();

    for (date, bucket) in [
        ("1890-01-01", "09-11"),
        ("1990-05-17", "08-10"),
        ("1990-13-40", "09-11"),
    ] {
        let outcome = lookup(&store, &mut conn, Some(date), Some(bucket)).unwrap();
        assert_eq!(outcome, LookupOutcome::NotFound, "{date} {bucket}");
    }
}

#[test]
fn missing_inputs_are_validation_errors() {
    let (_db, mut conn) = setup_db();
    let store = SqliteCheckpointStore::new();

    assert!(matches!(
        lookup(&store, &mut conn, None, Some("09-11")),
        Err(LookupError::MissingDate)
    ));
    assert!(matches!(
        lookup(&store, &mut conn, Some("  "), Some("09-11")),
        Err(LookupError::MissingDate)
    ));
    assert!(matches!(
        lookup(&store, &mut conn, Some("1990-05-17"), None),
        Err(LookupError::MissingTimeBucket)
    ));
}
