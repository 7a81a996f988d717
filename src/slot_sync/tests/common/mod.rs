#![allow(dead_code)]

use std::{num::NonZeroU32, path::PathBuf};

use diesel::{QueryableByName, prelude::*, sql_types::{Integer, Text}};
use indexmap::IndexMap;
use serde_json::Value;
use slot_sync::{
    db::{connection, migrate},
    grid::{SlotKey, TimeGrid},
    models::PayloadDocument,
    schema::slot_records,
};
use tempfile::TempDir;

#[derive(QueryableByName)]
struct JournalMode {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}
#[derive(QueryableByName)]
struct ForeignKeys {
    #[diesel(sql_type = Integer)]
    foreign_keys: i32,
}
#[derive(QueryableByName)]
struct BusyTimeout {
    #[diesel(sql_type = Integer, column_name = "timeout")]
    busy_timeout: i32,
}

pub struct TestDb {
    _dir: TempDir,    // keep alive for the life of the test
    pub path: String, // <tmpdir>/slots.db
}

impl TestDb {
    /// Fresh connection to the same file, as a restarted process would open it.
    pub fn reopen(&self) -> SqliteConnection {
        connection::connect_sqlite(&self.path).expect("reconnect")
    }
}

pub fn setup_db() -> (TestDb, SqliteConnection) {
    let dir = TempDir::new().expect("tempdir");
    let mut p = PathBuf::from(dir.path());
    p.push("slots.db");
    let path = p.to_string_lossy().to_string();

    migrate::run_all(&path).expect("migrations");

    let conn = connection::connect_sqlite(&path).expect("connect");
    (TestDb { _dir: dir, path }, conn)
}

pub fn assert_sqlite_pragmas(conn: &mut SqliteConnection) {
    use diesel::sql_query;

    let jm: JournalMode = sql_query("PRAGMA journal_mode;").get_result(conn).unwrap();
    assert_eq!(jm.journal_mode.to_lowercase(), "wal");

    let fk: ForeignKeys = sql_query("PRAGMA foreign_keys;").get_result(conn).unwrap();
    assert_eq!(fk.foreign_keys, 1);

    let bt: BusyTimeout = sql_query("PRAGMA busy_timeout;").get_result(conn).unwrap();
    assert_eq!(bt.busy_timeout, connection::BUSY_TIMEOUT_MS as i32);
}

pub fn key(s: &str) -> SlotKey {
    s.parse().expect("slot key")
}

/// `n` slots two hours apart starting at `start`.
pub fn grid(start: &str, n: u32) -> TimeGrid {
    let start = key(start);
    let end = SlotKey::new(start.as_naive() + chrono::Duration::hours(2 * i64::from(n - 1)));
    TimeGrid::new(start, end, NonZeroU32::new(2).unwrap()).unwrap()
}

pub fn payload(pairs: &[(&str, Value)]) -> PayloadDocument {
    PayloadDocument(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<IndexMap<_, _>>(),
    )
}

pub fn row_count(conn: &mut SqliteConnection) -> i64 {
    slot_records::table.count().get_result(conn).unwrap()
}
