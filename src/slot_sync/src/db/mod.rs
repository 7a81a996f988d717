//! Database utilities for connections and schema migrations.
//!
//! This module provides:
//! - SQLite connection helpers: [`connection::connect_sqlite`] applies WAL, foreign_keys=ON, and a 5000ms busy_timeout.
//! - Embedded Diesel migrations and runners: [`migrate::run_sqlite`] and [`migrate::run_all`],
//!   which accepts `sqlite://`/`sqlite:` URLs as well as bare file paths.
//! - [`open`]: migrate then connect, the usual entry point for the binary.
//!
//! Example:
//! ```no_run
//! use slot_sync::db::{migrate, connection};
//!
//! let db_path = std::env::temp_dir().join("slot_sync_example.db");
//! migrate::run_all(db_path.to_str().unwrap()).expect("migrations");
//!
//! let _conn = connection::connect_sqlite(db_path.to_str().unwrap()).expect("connect");
//! ```

pub mod connection;
pub mod migrate;

use anyhow::Context;
use diesel::SqliteConnection;

/// Apply pending migrations, then open a tuned connection.
///
/// Any failure here is fatal for the caller: without a reachable, migrated
/// store there is no resumption cursor.
pub fn open(database_url: &str) -> anyhow::Result<SqliteConnection> {
    migrate::run_all(database_url).context("failed to migrate slot store")?;
    connection::connect_sqlite(database_url).context("failed to open slot store")
}
