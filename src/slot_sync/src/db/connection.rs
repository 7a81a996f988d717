//! Opening the slot store.
//!
//! Every process (`ingest`, `status`, `lookup`) opens its own connection to
//! the same file. The store runs in WAL mode so readers see committed slots
//! while the ingester keeps writing, and a writer that finds the file locked
//! waits up to five seconds before the statement fails.

use diesel::{Connection, RunQueryDsl, SqliteConnection, sql_query};

use crate::db::migrate::sqlite_path;

/// Busy wait before a locked statement gives up, in milliseconds.
pub const BUSY_TIMEOUT_MS: u32 = 5000;

/// Connect to the store named by `database_url` (`sqlite://`, `sqlite:` or a path).
pub fn connect_sqlite(database_url: &str) -> anyhow::Result<SqliteConnection> {
    let path = sqlite_path(database_url)?;
    let mut conn = SqliteConnection::establish(path)?;

    for pragma in [
        "PRAGMA journal_mode=WAL;".to_string(),
        "PRAGMA foreign_keys=ON;".to_string(),
        format!("PRAGMA busy_timeout={BUSY_TIMEOUT_MS};"),
    ] {
        sql_query(pragma).execute(&mut conn)?;
    }
    Ok(conn)
}
