use std::path::PathBuf;

use anyhow::{Context, Result};
use calc_client::{FetchClient, providers::http::HttpCalculationProvider};
use clap::{Parser, Subcommand};
use slot_sync::{
    checkpoint::{CheckpointStore, SqliteCheckpointStore},
    config::IngestConfig,
    db,
    ingest::{IngestionLoop, RunOutcome},
    lookup::{self, LookupOutcome},
    preallocate::run_preallocation,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Slot ingestion CLI")]
struct Cli {
    /// Optional TOML config file; environment variables override it.
    #[arg(long, value_name = "FILE", env = "SLOT_SYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Create or upgrade the schema.
    Migrate,
    /// Seed pending rows for every slot of the configured grid.
    Preallocate,
    /// Fill pending slots from the remote until drained or interrupted.
    Ingest {
        /// Pre-allocate before ingesting.
        #[arg(long)]
        preallocate: bool,
        /// Stay alive after the grid is drained.
        #[arg(long)]
        idle_when_drained: bool,
    },
    /// Print fill progress for the configured grid.
    Status,
    /// Print the stored payload for a date and two-hour bucket.
    Lookup {
        #[arg(long)]
        date: Option<String>,
        #[arg(long, value_name = "HH-HH")]
        bucket: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = IngestConfig::load(cli.config.as_deref()).context("invalid configuration")?;
    let store = SqliteCheckpointStore::new();

    match cli.cmd {
        Cmd::Migrate => {
            db::migrate::run_all(cfg.database_url())?;
        }
        Cmd::Preallocate => {
            let mut conn = db::open(cfg.database_url())?;
            run_preallocation(&store, &mut conn, &cfg.grid()?)?;
        }
        Cmd::Ingest {
            preallocate,
            idle_when_drained,
        } => {
            let grid = cfg.grid()?;
            let mut conn = db::open(cfg.database_url())?;
            if preallocate {
                run_preallocation(&store, &mut conn, &grid)?;
            }

            let provider = HttpCalculationProvider::new(cfg.http_settings())
                .context("could not build HTTP client")?;
            let client = FetchClient::new(provider, cfg.request_defaults.clone(), cfg.pacing());
            let ingestion =
                IngestionLoop::new(client, &store, grid, cfg.ingest_settings(idle_when_drained));

            let cancel = CancellationToken::new();
            tokio::spawn(shutdown_on_signal(cancel.clone()));

            let summary = ingestion.run(&mut conn, &cancel).await?;
            info!(
                filled = summary.filled,
                retries = summary.retries,
                outcome = ?summary.outcome,
                "ingestion finished"
            );
            match summary.outcome {
                RunOutcome::Drained => {}
                RunOutcome::Cancelled => {
                    warn!("stopped before the grid was drained; rerun to resume")
                }
                RunOutcome::Incomplete { first_pending } => {
                    warn!(first_pending = %first_pending, "grid pass finished with pending slots");
                }
            }
        }
        Cmd::Status => {
            let mut conn = db::open(cfg.database_url())?;
            let grid = cfg.grid()?;
            let progress = store.progress(&mut conn, grid.range())?;
            let next = store.earliest_pending(&mut conn, grid.range())?;
            println!("grid:    {} .. {} every {}h ({} slots)", grid.start(), grid.end(), grid.step_hours(), grid.len());
            println!("rows:    {}", progress.total);
            println!("filled:  {}", progress.filled);
            println!("pending: {}", progress.pending());
            match next {
                Some(slot) => println!("next:    {slot}"),
                None => println!("next:    (drained)"),
            }
        }
        Cmd::Lookup { date, bucket } => {
            let mut conn = db::open(cfg.database_url())?;
            match lookup::lookup(&store, &mut conn, date.as_deref(), bucket.as_deref())? {
                LookupOutcome::Found(found) => {
                    let mut doc = serde_json::Map::new();
                    doc.insert("solarDateTime".into(), found.slot.to_string().into());
                    doc.insert("externalId".into(), found.external_id.into());
                    for field in found.payload.0.keys() {
                        if let Some(v) = found.payload.decoded(field) {
                            doc.insert(field.clone(), v);
                        }
                    }
                    println!("{}", serde_json::to_string_pretty(&doc)?);
                }
                LookupOutcome::NotFound => println!("not found"),
            }
        }
    }

    Ok(())
}

/// Cancel on Ctrl-C, or SIGTERM on unix.
async fn shutdown_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable; listening for Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown requested; finishing current step");
    cancel.cancel();
}
