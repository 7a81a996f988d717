//! SQLite implementation of [`CheckpointStore`] over the `slot_records` table.

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use diesel::{prelude::*, upsert::excluded};
use tracing::{debug, info};

use crate::{
    checkpoint::{CheckpointStore, PreallocateReport, Progress, RepoResult},
    grid::{SlotKey, SlotRange, TimeGrid},
    models::{NewSlot, PayloadDocument, SlotFill, SlotRecord},
    schema::slot_records,
};

use crate::schema::slot_records::dsl as sr;

/// Rows per INSERT during pre-allocation.
pub const DEFAULT_PREALLOCATE_BATCH: usize = 5000;

/// Checkpoint store backed by the `slot_records` table in SQLite.
#[derive(Debug, Clone, Copy)]
pub struct SqliteCheckpointStore {
    batch_size: usize,
}

impl SqliteCheckpointStore {
    /// Store with the default pre-allocation batch size.
    pub fn new() -> Self {
        Self {
            batch_size: DEFAULT_PREALLOCATE_BATCH,
        }
    }

    /// Override the pre-allocation batch size (minimum 1).
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    fn insert_batch(&self, conn: &mut SqliteConnection, batch: &[NewSlot]) -> RepoResult<u64> {
        // one statement per row: SQLite has no ON CONFLICT for multi-row inserts in diesel
        conn.immediate_transaction::<_, anyhow::Error, _>(|conn| {
            let mut inserted = 0u64;
            for row in batch {
                inserted += diesel::insert_into(slot_records::table)
                    .values(row)
                    .on_conflict(sr::solar_date_time)
                    .do_nothing()
                    .execute(conn)? as u64;
            }
            Ok(inserted)
        })
    }
}

impl Default for SqliteCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl CheckpointStore for SqliteCheckpointStore {
    fn preallocate(
        &self,
        conn: &mut SqliteConnection,
        grid: &TimeGrid,
    ) -> RepoResult<PreallocateReport> {
        let mut report = PreallocateReport::default();
        let mut batch: Vec<NewSlot> = Vec::with_capacity(self.batch_size.min(grid.len()));

        for key in grid {
            batch.push(NewSlot {
                solar_date_time: key.to_db_string(),
            });
            if batch.len() == self.batch_size {
                report.inserted += self
                    .insert_batch(conn, &batch)
                    .with_context(|| format!("pre-allocation failed at {key}"))?;
                report.slots += batch.len() as u64;
                info!(
                    written = report.slots,
                    inserted = report.inserted,
                    through = %key,
                    "pre-allocated batch"
                );
                batch.clear();
            }
        }

        if !batch.is_empty() {
            report.inserted += self
                .insert_batch(conn, &batch)
                .context("pre-allocation failed on final batch")?;
            report.slots += batch.len() as u64;
        }

        Ok(report)
    }

    fn earliest_pending(
        &self,
        conn: &mut SqliteConnection,
        range: SlotRange,
    ) -> RepoResult<Option<SlotKey>> {
        if range.is_empty() {
            return Ok(None);
        }

        let found: Option<String> = sr::slot_records
            .filter(sr::external_id.is_null())
            .filter(sr::solar_date_time.ge(range.start.to_db_string()))
            .filter(sr::solar_date_time.le(range.end.to_db_string()))
            .order(sr::solar_date_time.asc())
            .select(sr::solar_date_time)
            .first(conn)
            .optional()?;

        found.as_deref().map(SlotKey::parse).transpose()
    }

    fn upsert(
        &self,
        conn: &mut SqliteConnection,
        slot: SlotKey,
        external_id: &str,
        payload: &PayloadDocument,
    ) -> RepoResult<()> {
        let key = slot.to_db_string();
        let payload_json = payload.to_json().context("serialize payload document")?;
        let now = now_rfc3339();

        let row = SlotFill {
            solar_date_time: &key,
            external_id,
            payload: &payload_json,
            updated_at: &now,
        };

        // INSERT .. ON CONFLICT (solar_date_time) DO UPDATE: a retried slot
        // lands on the same row with the latest values.
        diesel::insert_into(slot_records::table)
            .values(&row)
            .on_conflict(sr::solar_date_time)
            .do_update()
            .set((
                sr::external_id.eq(excluded(sr::external_id)),
                sr::payload.eq(excluded(sr::payload)),
                sr::updated_at.eq(excluded(sr::updated_at)),
            ))
            .execute(conn)
            .with_context(|| format!("upsert failed for slot {key}"))?;

        debug!(slot = %key, external_id, "slot written");
        Ok(())
    }

    fn find(&self, conn: &mut SqliteConnection, slot: SlotKey) -> RepoResult<Option<SlotRecord>> {
        let row = sr::slot_records
            .filter(sr::solar_date_time.eq(slot.to_db_string()))
            .select(SlotRecord::as_select())
            .first(conn)
            .optional()?;
        Ok(row)
    }

    fn progress(&self, conn: &mut SqliteConnection, range: SlotRange) -> RepoResult<Progress> {
        if range.is_empty() {
            return Ok(Progress::default());
        }
        let start = range.start.to_db_string();
        let end = range.end.to_db_string();

        let total: i64 = sr::slot_records
            .filter(sr::solar_date_time.ge(&start))
            .filter(sr::solar_date_time.le(&end))
            .count()
            .get_result(conn)?;

        let filled: i64 = sr::slot_records
            .filter(sr::solar_date_time.ge(&start))
            .filter(sr::solar_date_time.le(&end))
            .filter(sr::external_id.is_not_null())
            .count()
            .get_result(conn)?;

        Ok(Progress {
            total: total as u64,
            filled: filled as u64,
        })
    }
}
