mod common;

use common::{assert_sqlite_pragmas, grid, key, payload, row_count, setup_db};
use serde_json::json;
use slot_sync::{
    checkpoint::{CheckpointStore, SqliteCheckpointStore},
    grid::SlotRange,
};

#[test]
fn connection_applies_pragmas() {
    let (_db, mut conn) = setup_db();
    assert_sqlite_pragmas(&mut conn);
}

#[test]
fn preallocate_is_idempotent() {
    let (_db, mut conn) = setup_db();
    let store = SqliteCheckpointStore::with_batch_size(3);
    let g = grid("2000-01-01 00:00:00", 10);

    let first = store.preallocate(&mut conn, &g).unwrap();
    assert_eq!(first.slots, 10);
    assert_eq!(first.inserted, 10);
    assert_eq!(row_count(&mut conn), 10);

    let second = store.preallocate(&mut conn, &g).unwrap();
    assert_eq!(second.slots, 10);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.skipped(), 10);
    assert_eq!(row_count(&mut conn), 10);
}

#[test]
fn overlapping_preallocation_keeps_filled_rows() {
    let (_db, mut conn) = setup_db();
    let store = SqliteCheckpointStore::new();
    store
        .preallocate(&mut conn, &grid("2000-01-01 00:00:00", 4))
        .unwrap();
    store
        .upsert(
            &mut conn,
            key("2000-01-01 02:00:00"),
            "ext-1",
            &payload(&[("yearPillar", json!("己卯"))]),
        )
        .unwrap();

    let wider = grid("2000-01-01 00:00:00", 8);
    let report = store.preallocate(&mut conn, &wider).unwrap();
    assert_eq!(report.inserted, 4);
    assert_eq!(row_count(&mut conn), 8);

    let row = store
        .find(&mut conn, key("2000-01-01 02:00:00"))
        .unwrap()
        .unwrap();
    assert_eq!(row.external_id.as_deref(), Some("ext-1"));
    let doc = row.payload_document().unwrap().unwrap();
    assert_eq!(doc.get("yearPillar"), Some(&json!("己卯")));
}

#[test]
fn earliest_pending_follows_fills_in_order() {
    let (_db, mut conn) = setup_db();
    let store = SqliteCheckpointStore::new();
    let g = grid("2000-01-01 00:00:00", 10);
    store.preallocate(&mut conn, &g).unwrap();

    let slots: Vec<_> = g.iter().collect();
    for (k, slot) in slots.iter().enumerate() {
        assert_eq!(
            store.earliest_pending(&mut conn, g.range()).unwrap(),
            Some(*slot),
            "after {k} fills"
        );
        store
            .upsert(&mut conn, *slot, &format!("ext-{k}"), &payload(&[]))
            .unwrap();
    }
    assert_eq!(store.earliest_pending(&mut conn, g.range()).unwrap(), None);
}

#[test]
fn earliest_pending_is_limited_to_the_window() {
    let (_db, mut conn) = setup_db();
    let store = SqliteCheckpointStore::new();
    let g = grid("2000-01-01 00:00:00", 10);
    store.preallocate(&mut conn, &g).unwrap();

    let window = SlotRange::new(key("2000-01-01 09:00:00"), key("2000-01-01 13:00:00"));
    assert_eq!(
        store.earliest_pending(&mut conn, window).unwrap(),
        Some(key("2000-01-01 10:00:00"))
    );

    let empty = SlotRange::new(key("2000-01-02 00:00:00"), key("2000-01-01 00:00:00"));
    assert_eq!(store.earliest_pending(&mut conn, empty).unwrap(), None);
}

#[test]
fn double_upsert_keeps_one_row_with_second_values() {
    let (_db, mut conn) = setup_db();
    let store = SqliteCheckpointStore::new();
    store
        .preallocate(&mut conn, &grid("2000-01-01 00:00:00", 3))
        .unwrap();
    let slot = key("2000-01-01 04:00:00");

    store
        .upsert(&mut conn, slot, "first", &payload(&[("mingGe", json!("正官格"))]))
        .unwrap();
    store
        .upsert(&mut conn, slot, "second", &payload(&[("mingGe", json!("七殺格"))]))
        .unwrap();

    assert_eq!(row_count(&mut conn), 3);
    let row = store.find(&mut conn, slot).unwrap().unwrap();
    assert_eq!(row.external_id.as_deref(), Some("second"));
    let doc = row.payload_document().unwrap().unwrap();
    assert_eq!(doc.get("mingGe"), Some(&json!("七殺格")));
}

#[test]
fn upsert_creates_a_row_that_was_never_preallocated() {
    let (_db, mut conn) = setup_db();
    let store = SqliteCheckpointStore::new();
    store
        .preallocate(&mut conn, &grid("2000-01-01 00:00:00", 2))
        .unwrap();

    let off_grid = key("2000-01-01 01:00:00");
    store.upsert(&mut conn, off_grid, "ext", &payload(&[])).unwrap();

    assert_eq!(row_count(&mut conn), 3);
    assert!(store.find(&mut conn, off_grid).unwrap().unwrap().is_filled());
}

#[test]
fn progress_counts_rows_in_range() {
    let (_db, mut conn) = setup_db();
    let store = SqliteCheckpointStore::new();
    let g = grid("2000-01-01 00:00:00", 10);
    store.preallocate(&mut conn, &g).unwrap();
    for slot in g.iter().take(3) {
        store.upsert(&mut conn, slot, "ext", &payload(&[])).unwrap();
    }

    let all = store.progress(&mut conn, g.range()).unwrap();
    assert_eq!((all.total, all.filled, all.pending()), (10, 3, 7));

    let tail = SlotRange::new(key("2000-01-01 04:00:00"), g.end());
    let part = store.progress(&mut conn, tail).unwrap();
    assert_eq!((part.total, part.filled, part.pending()), (8, 1, 7));
}

#[test]
fn missing_slot_is_not_found() {
    let (_db, mut conn) = setup_db();
    let store = SqliteCheckpointStore::new();
    assert!(
        store
            .find(&mut conn, key("1999-12-31 22:00:00"))
            .unwrap()
            .is_none()
    );
}
