//! The ingestion loop: one worker walking the grid through the remote.
//!
//! States:
//! - **Resuming** asks the store for the earliest pending slot of the grid.
//! - **Fetching** calls the remote for the current slot.
//! - **Writing** commits the response, then moves the cursor to the earliest
//!   pending slot after the current one and sleeps the pacing delay.
//! - **Cooling** waits after a failure and goes back to Fetching for the
//!   same slot. Rate-limit pushback waits the long cool-down plus one pacing
//!   delay; any other failure, including a failed commit, waits the short one.
//! - **Drained** ends the run (or idles until cancelled). Reaching the end of
//!   the grid while an earlier slot is still pending ends the run as
//!   [`RunOutcome::Incomplete`] instead; the pass does not loop back.
//!
//! At most one slot is in flight. The cancellation token is checked on every
//! transition and interrupts every sleep and the remote call itself; a
//! write is a single statement so cancellation never leaves half a row.

pub mod observer;

use std::time::{Duration, Instant};

use calc_client::{CalculationProvider, CalculationResponse, FailureClass, FetchClient};
use diesel::SqliteConnection;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    checkpoint::CheckpointStore,
    grid::{SlotKey, SlotRange, TimeGrid},
    writer::UpsertWriter,
};

pub use observer::{RetryEvent, RetryObserver, RetryStage, TracingObserver};

/// Timing knobs of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSettings {
    /// Base wait after rate-limit pushback (a pacing delay is added on top).
    pub rate_limit_cooldown: Duration,
    /// Wait after any other failure.
    pub transient_cooldown: Duration,
    /// Total time one slot may keep failing before the run stops; `None` retries forever.
    pub max_slot_retry: Option<Duration>,
    /// Keep the process alive after the grid is drained.
    pub idle_when_drained: bool,
    /// Interval of the idle heartbeat log.
    pub heartbeat: Duration,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            rate_limit_cooldown: Duration::from_secs(60),
            transient_cooldown: Duration::from_secs(5),
            max_slot_retry: None,
            idle_when_drained: false,
            heartbeat: Duration::from_secs(300),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// No pending slot is left in the grid.
    Drained,
    /// The cursor passed the last slot but an earlier one is still pending,
    /// e.g. because the remote echoed its response under another key.
    Incomplete {
        /// Smallest key still pending.
        first_pending: SlotKey,
    },
    /// The token was cancelled first.
    Cancelled,
}

/// What one run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Slots committed in this run.
    pub filled: u64,
    /// Failed attempts that were retried.
    pub retries: u64,
    /// How the run ended.
    pub outcome: RunOutcome,
}

/// Failures that stop the loop.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Reading the resumption cursor failed.
    #[error("checkpoint store failed: {0:#}")]
    Store(anyhow::Error),

    /// A slot kept failing for longer than the configured budget.
    #[error("slot {slot} still failing after {attempts} attempts ({budget:?} retry budget)")]
    RetryBudgetExhausted {
        /// Slot that stays pending.
        slot: SlotKey,
        /// Attempts made.
        attempts: u32,
        /// The configured budget.
        budget: Duration,
    },
}

enum State {
    Resuming,
    Fetching(SlotKey),
    Writing(SlotKey, CalculationResponse),
    Cooling(SlotKey, Duration),
    Incomplete(SlotKey),
    Drained,
}

/// Per-slot retry bookkeeping.
struct Attempts {
    slot: Option<SlotKey>,
    count: u32,
    since: Instant,
}

impl Attempts {
    fn new() -> Self {
        Self {
            slot: None,
            count: 0,
            since: Instant::now(),
        }
    }

    fn begin(&mut self, slot: SlotKey) {
        if self.slot != Some(slot) {
            self.slot = Some(slot);
            self.count = 0;
            self.since = Instant::now();
        }
        self.count += 1;
    }
}

/// Drives a [`FetchClient`] and a [`CheckpointStore`] over a [`TimeGrid`].
pub struct IngestionLoop<P, S, O = TracingObserver> {
    client: FetchClient<P>,
    writer: UpsertWriter<S>,
    grid: TimeGrid,
    settings: IngestSettings,
    observer: O,
}

impl<P, S> IngestionLoop<P, S, TracingObserver>
where
    P: CalculationProvider,
    S: CheckpointStore,
{
    /// Loop that reports retries through `tracing`.
    pub fn new(client: FetchClient<P>, store: S, grid: TimeGrid, settings: IngestSettings) -> Self {
        Self {
            client,
            writer: UpsertWriter::new(store),
            grid,
            settings,
            observer: TracingObserver,
        }
    }
}

impl<P, S, O> IngestionLoop<P, S, O>
where
    P: CalculationProvider,
    S: CheckpointStore,
    O: RetryObserver,
{
    /// Replace the retry observer.
    pub fn with_observer<O2: RetryObserver>(self, observer: O2) -> IngestionLoop<P, S, O2> {
        IngestionLoop {
            client: self.client,
            writer: self.writer,
            grid: self.grid,
            settings: self.settings,
            observer,
        }
    }

    /// The fetch client.
    pub fn client(&self) -> &FetchClient<P> {
        &self.client
    }

    /// Grid this loop walks.
    pub fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    /// Run until the grid is drained, the token is cancelled or a fatal error occurs.
    pub async fn run(
        &self,
        conn: &mut SqliteConnection,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, IngestError> {
        let mut filled = 0u64;
        let mut retries = 0u64;
        let mut attempts = Attempts::new();
        let mut state = State::Resuming;

        loop {
            if cancel.is_cancelled() {
                return Ok(cancelled(filled, retries));
            }

            state = match state {
                State::Resuming => {
                    let store = self.writer.store();
                    match store
                        .earliest_pending(conn, self.grid.range())
                        .map_err(IngestError::Store)?
                    {
                        Some(slot) => {
                            info!(slot = %slot, "resuming at earliest pending slot");
                            State::Fetching(slot)
                        }
                        None => State::Drained,
                    }
                }

                State::Fetching(slot) => {
                    attempts.begin(slot);
                    debug!(slot = %slot, attempt = attempts.count, "fetching slot");
                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Ok(cancelled(filled, retries)),
                        r = self.client.fetch(slot.as_naive()) => r,
                    };
                    match result {
                        Ok(response) => State::Writing(slot, response),
                        Err(e) => {
                            let class = e.class();
                            let cooldown = self.cooldown_for(class);
                            self.check_budget(slot, &attempts)?;
                            retries += 1;
                            self.observer.on_retry(&RetryEvent {
                                slot,
                                attempt: attempts.count,
                                stage: RetryStage::Fetch,
                                class,
                                cooldown,
                                reason: e.to_string(),
                            });
                            State::Cooling(slot, cooldown)
                        }
                    }
                }

                State::Writing(slot, response) => {
                    match self.writer.commit(conn, slot, &response) {
                        Ok(written) => {
                            if written != slot {
                                warn!(requested = %slot, written = %written, "remote echoed a different slot");
                            }
                            filled += 1;
                            self.observer.on_filled(written, attempts.count);

                            match self.next_pending(conn, slot)? {
                                Some(next) => {
                                    let delay = self.client.next_delay();
                                    debug!(next = %next, delay_ms = delay.as_millis() as u64, "pacing");
                                    if !sleep_or_cancel(delay, cancel).await {
                                        return Ok(cancelled(filled, retries));
                                    }
                                    State::Fetching(next)
                                }
                                None => self.end_of_pass(conn)?,
                            }
                        }
                        Err(e) => {
                            let cooldown = self.settings.transient_cooldown;
                            self.check_budget(slot, &attempts)?;
                            retries += 1;
                            self.observer.on_retry(&RetryEvent {
                                slot,
                                attempt: attempts.count,
                                stage: RetryStage::Commit,
                                class: FailureClass::Transient,
                                cooldown,
                                reason: e.to_string(),
                            });
                            State::Cooling(slot, cooldown)
                        }
                    }
                }

                State::Cooling(slot, cooldown) => {
                    if !sleep_or_cancel(cooldown, cancel).await {
                        return Ok(cancelled(filled, retries));
                    }
                    State::Fetching(slot)
                }

                State::Incomplete(first_pending) => {
                    warn!(
                        first_pending = %first_pending,
                        filled,
                        retries,
                        "reached the end of the grid with slots still pending; rerun to retry them"
                    );
                    return Ok(RunSummary {
                        filled,
                        retries,
                        outcome: RunOutcome::Incomplete { first_pending },
                    });
                }

                State::Drained => {
                    info!(filled, retries, "no pending slots left");
                    if self.settings.idle_when_drained {
                        while sleep_or_cancel(self.settings.heartbeat, cancel).await {
                            info!("drained; idling");
                        }
                    }
                    return Ok(RunSummary {
                        filled,
                        retries,
                        outcome: RunOutcome::Drained,
                    });
                }
            };
        }
    }

    fn cooldown_for(&self, class: FailureClass) -> Duration {
        match class {
            FailureClass::RateLimited => self.settings.rate_limit_cooldown + self.client.next_delay(),
            FailureClass::Transient => self.settings.transient_cooldown,
        }
    }

    fn check_budget(&self, slot: SlotKey, attempts: &Attempts) -> Result<(), IngestError> {
        match self.settings.max_slot_retry {
            Some(budget) if attempts.since.elapsed() >= budget => {
                Err(IngestError::RetryBudgetExhausted {
                    slot,
                    attempts: attempts.count,
                    budget,
                })
            }
            _ => Ok(()),
        }
    }

    /// Past the last slot: drained only if the whole grid is filled.
    fn end_of_pass(&self, conn: &mut SqliteConnection) -> Result<State, IngestError> {
        let left = self
            .writer
            .store()
            .earliest_pending(conn, self.grid.range())
            .map_err(IngestError::Store)?;
        Ok(match left {
            Some(slot) => State::Incomplete(slot),
            None => State::Drained,
        })
    }

    /// Earliest pending slot strictly after `current`; filled slots ahead are skipped.
    fn next_pending(
        &self,
        conn: &mut SqliteConnection,
        current: SlotKey,
    ) -> Result<Option<SlotKey>, IngestError> {
        let Some(from) = self.grid.next_after(current) else {
            return Ok(None);
        };
        self.writer
            .store()
            .earliest_pending(conn, SlotRange::new(from, self.grid.end()))
            .map_err(IngestError::Store)
    }
}

fn cancelled(filled: u64, retries: u64) -> RunSummary {
    info!(filled, retries, "ingestion cancelled");
    RunSummary {
        filled,
        retries,
        outcome: RunOutcome::Cancelled,
    }
}

/// Sleep unless cancelled first; `false` means cancelled.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
