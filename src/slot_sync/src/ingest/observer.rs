//! Retry observation hook for the ingestion loop.

use std::time::Duration;

use calc_client::FailureClass;
use tracing::{info, warn};

use crate::grid::SlotKey;

/// Which step of a slot failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStage {
    /// The remote call.
    Fetch,
    /// Writing the response to the store.
    Commit,
}

/// One failed attempt that is about to be retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryEvent {
    /// Slot that will be retried.
    pub slot: SlotKey,
    /// 1-based attempt number that failed.
    pub attempt: u32,
    /// Where it failed.
    pub stage: RetryStage,
    /// Retry class driving the cool-down.
    pub class: FailureClass,
    /// Wait before the next attempt.
    pub cooldown: Duration,
    /// Rendered error.
    pub reason: String,
}

/// Hook invoked by the ingestion loop; the default logs through `tracing`.
pub trait RetryObserver: Send + Sync {
    /// Called before every cool-down.
    fn on_retry(&self, event: &RetryEvent);

    /// Called after a slot has been written.
    fn on_filled(&self, _slot: SlotKey, _attempts: u32) {}
}

impl<T: RetryObserver + ?Sized> RetryObserver for &T {
    fn on_retry(&self, event: &RetryEvent) {
        (**self).on_retry(event)
    }

    fn on_filled(&self, slot: SlotKey, attempts: u32) {
        (**self).on_filled(slot, attempts)
    }
}

/// Logs retries at WARN and fills at INFO.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RetryObserver for TracingObserver {
    fn on_retry(&self, event: &RetryEvent) {
        warn!(
            slot = %event.slot,
            attempt = event.attempt,
            stage = ?event.stage,
            class = ?event.class,
            cooldown_ms = event.cooldown.as_millis() as u64,
            reason = %event.reason,
            "slot attempt failed; cooling down"
        );
    }

    fn on_filled(&self, slot: SlotKey, attempts: u32) {
        info!(slot = %slot, attempts, "slot filled");
    }
}
