//! Pre-allocation job: seeds one pending row per grid slot before ingestion.
//!
//! Safe to re-run over a range that already has data; existing rows are left
//! as they are. A failure here is fatal for the process, and rerunning picks
//! up where the failed batch left off.

use std::time::Instant;

use anyhow::Context;
use diesel::SqliteConnection;
use tracing::info;

use crate::{
    checkpoint::{CheckpointStore, PreallocateReport},
    grid::TimeGrid,
};

/// Seed `grid` into `store` and log the outcome.
pub fn run_preallocation<S: CheckpointStore>(
    store: &S,
    conn: &mut SqliteConnection,
    grid: &TimeGrid,
) -> anyhow::Result<PreallocateReport> {
    info!(
        start = %grid.start(),
        end = %grid.end(),
        step_hours = grid.step_hours().get(),
        slots = grid.len(),
        "pre-allocating slot rows"
    );
    let started = Instant::now();

    let report = store
        .preallocate(conn, grid)
        .with_context(|| format!("pre-allocation of {} .. {} failed", grid.start(), grid.end()))?;

    info!(
        slots = report.slots,
        inserted = report.inserted,
        skipped = report.skipped(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "pre-allocation complete"
    );
    Ok(report)
}
