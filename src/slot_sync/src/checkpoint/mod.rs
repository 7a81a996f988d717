//! Checkpoint store: the persistent slot table that makes ingestion resumable.
//!
//! ## Contract
//! - [`CheckpointStore::preallocate`] inserts a pending row for every grid slot
//!   that is not already present. Existing rows (pending or filled) are never
//!   touched, so the call is idempotent and can extend a range later.
//! - [`CheckpointStore::earliest_pending`] is the resumption cursor: the
//!   smallest key in the window whose `external_id` is NULL. `None` means the
//!   window is drained, which is not an error.
//! - [`CheckpointStore::upsert`] writes identifier + payload onto the row for a
//!   key, overwriting in place if it was already filled (and inserting it if
//!   the key was never pre-allocated).
//!
//! Connectivity or constraint failures from `preallocate`/`upsert` surface as
//! errors and must stop whatever is driving the store.
//!
//! The SQLite implementation lives in `repo.rs`.

pub mod repo;

use diesel::SqliteConnection;

use crate::{
    grid::{SlotKey, SlotRange, TimeGrid},
    models::{PayloadDocument, SlotRecord},
};

pub use repo::SqliteCheckpointStore;

/// Result type used throughout the checkpoint store for fallible operations.
pub type RepoResult<T> = anyhow::Result<T>;

/// Outcome of one pre-allocation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreallocateReport {
    /// Grid slots visited.
    pub slots: u64,
    /// Rows actually inserted (the rest already existed).
    pub inserted: u64,
}

impl PreallocateReport {
    /// Slots that were already present.
    pub fn skipped(&self) -> u64 {
        self.slots - self.inserted
    }
}

/// Fill counts inside a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Rows in the window.
    pub total: u64,
    /// Rows with a remote identifier.
    pub filled: u64,
}

impl Progress {
    /// Rows still waiting for the remote.
    pub fn pending(&self) -> u64 {
        self.total - self.filled
    }
}

/// Portable surface over the slot table.
pub trait CheckpointStore {
    /// Seed pending rows for every slot of `grid`; existing keys are skipped silently.
    fn preallocate(
        &self,
        conn: &mut SqliteConnection,
        grid: &TimeGrid,
    ) -> RepoResult<PreallocateReport>;

    /// Smallest pending key inside `range`, ascending by key.
    fn earliest_pending(
        &self,
        conn: &mut SqliteConnection,
        range: SlotRange,
    ) -> RepoResult<Option<SlotKey>>;

    /// Set identifier and payload on `slot`'s row (overwrite-in-place).
    fn upsert(
        &self,
        conn: &mut SqliteConnection,
        slot: SlotKey,
        external_id: &str,
        payload: &PayloadDocument,
    ) -> RepoResult<()>;

    /// Row for `slot`, pending or filled.
    fn find(&self, conn: &mut SqliteConnection, slot: SlotKey) -> RepoResult<Option<SlotRecord>>;

    /// Total and filled row counts inside `range`.
    fn progress(&self, conn: &mut SqliteConnection, range: SlotRange) -> RepoResult<Progress>;
}

impl<T: CheckpointStore + ?Sized> CheckpointStore for &T {
    fn preallocate(
        &self,
        conn: &mut SqliteConnection,
        grid: &TimeGrid,
    ) -> RepoResult<PreallocateReport> {
        (**self).preallocate(conn, grid)
    }

    fn earliest_pending(
        &self,
        conn: &mut SqliteConnection,
        range: SlotRange,
    ) -> RepoResult<Option<SlotKey>> {
        (**self).earliest_pending(conn, range)
    }

    fn upsert(
        &self,
        conn: &mut SqliteConnection,
        slot: SlotKey,
        external_id: &str,
        payload: &PayloadDocument,
    ) -> RepoResult<()> {
        (**self).upsert(conn, slot, external_id, payload)
    }

    fn find(&self, conn: &mut SqliteConnection, slot: SlotKey) -> RepoResult<Option<SlotRecord>> {
        (**self).find(conn, slot)
    }

    fn progress(&self, conn: &mut SqliteConnection, range: SlotRange) -> RepoResult<Progress> {
        (**self).progress(conn, range)
    }
}
