//! Resumable ingestion of a fixed time grid through a rate-limited remote
//! calculation service into a SQLite checkpoint table.
//!
//! Flow: [`preallocate`] seeds one pending row per [`grid`] slot, then the
//! [`ingest`] loop fetches the earliest pending slot, commits the response
//! through the [`writer`] and moves on. [`lookup`] is the read path for
//! consumers of the finished table.

#![deny(missing_docs)]

pub mod checkpoint;
pub mod config;
pub mod db;
pub mod grid;
pub mod ingest;
pub mod lookup;
pub mod models;
pub mod preallocate;
#[allow(missing_docs)]
pub mod schema;
pub mod writer;
