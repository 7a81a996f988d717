//! Embedded schema migrations for the slot store.

use anyhow::{anyhow, bail};
use diesel::{Connection, SqliteConnection, connection::SimpleConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::info;

/// Embedded Diesel migrations bundled with this crate.
///
/// These are applied by `run_sqlite` to bring the database schema up to date.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Map a configured database URL to what `SqliteConnection::establish` expects.
///
/// `sqlite://path`, `sqlite:path` and bare paths are accepted; other schemes
/// (e.g. `postgres://`) are rejected.
pub fn sqlite_path(database_url: &str) -> anyhow::Result<&str> {
    if let Some(rest) = database_url.strip_prefix("sqlite://") {
        return Ok(rest);
    }
    if let Some(rest) = database_url.strip_prefix("sqlite:") {
        return Ok(rest);
    }
    if database_url.contains("://") {
        bail!("Unsupported DATABASE_URL scheme (only SQLite is supported)");
    }
    Ok(database_url)
}

/// Runs pending Diesel migrations on a SQLite database at the given URL.
///
/// This sets the SQLite journal mode to WAL and applies all embedded migrations, returning an error on failure.
pub fn run_sqlite(path: &str) -> anyhow::Result<()> {
    let mut conn = SqliteConnection::establish(path)?;
    conn.batch_execute("PRAGMA journal_mode=WAL;")?;
    let applied = conn.run_pending_migrations(MIGRATIONS).map_err(|e| anyhow!(e))?;
    if !applied.is_empty() {
        info!(count = applied.len(), "applied slot store migrations");
    }

    Ok(())
}

/// Runs pending migrations for the given database URL.
///
/// See [`sqlite_path`] for the accepted URL shapes.
pub fn run_all(database_url: &str) -> anyhow::Result<()> {
    run_sqlite(sqlite_path(database_url)?)
}
