//! Time grid: the fixed, ordered sequence of slots to ingest.
//!
//! - Slots are naive wall-clock timestamps at minute precision; no time zone
//!   is ever attached, so DST rules of the host never change slot identity.
//! - Each slot is the previous one plus the step. Nothing is rebuilt from
//!   calendar components, so steps that do not divide a day never drift.
//! - The grid is inclusive of `start` and of every `start + k*step <= end`.
//!
//! ```
//! use std::num::NonZeroU32;
//! use slot_sync::grid::{SlotKey, TimeGrid};
//!
//! let start: SlotKey = "2000-01-01 00:00:00".parse().unwrap();
//! let end: SlotKey = "2000-01-01 05:00:00".parse().unwrap();
//! let grid = TimeGrid::new(start, end, NonZeroU32::new(2).unwrap()).unwrap();
//! let keys: Vec<String> = grid.iter().map(|k| k.to_string()).collect();
//! assert_eq!(keys, ["2000-01-01 00:00:00", "2000-01-01 02:00:00", "2000-01-01 04:00:00"]);
//! ```

use std::{fmt, iter::FusedIterator, num::NonZeroU32, str::FromStr};

use anyhow::{Context, bail};
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Storage and display format of a slot key.
pub const SLOT_KEY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Accepted input spellings, tried in order.
const SLOT_KEY_INPUT_FORMATS: &[&str] = &[
    SLOT_KEY_FORMAT,
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Identity of one slot: a minute-precision naive timestamp.
///
/// Ordering of keys is chronological, and so is the lexicographic order of
/// their [`SLOT_KEY_FORMAT`] rendering (four-digit years).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotKey(NaiveDateTime);

impl SlotKey {
    /// Wrap a timestamp, dropping seconds and sub-seconds.
    pub fn new(ts: NaiveDateTime) -> Self {
        let truncated = ts
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(ts);
        Self(truncated)
    }

    /// Convenience constructor for whole hours.
    pub fn from_ymd_h(year: i32, month: u32, day: u32, hour: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .map(Self)
    }

    /// The underlying naive timestamp.
    pub fn as_naive(&self) -> NaiveDateTime {
        self.0
    }

    /// Rendering used as the unique key column.
    pub fn to_db_string(&self) -> String {
        self.0.format(SLOT_KEY_FORMAT).to_string()
    }

    /// Parse a stored key or a user-supplied timestamp.
    ///
    /// A bare date (`YYYY-MM-DD`) means midnight.
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let s = s.trim();
        for fmt in SLOT_KEY_INPUT_FORMATS {
            if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
                return Ok(Self::new(ts));
            }
        }
        let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("bad slot timestamp: {s:?}"))?;
        Ok(Self(date.and_time(chrono::NaiveTime::MIN)))
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(SLOT_KEY_FORMAT))
    }
}

impl FromStr for SlotKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SlotKey {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<SlotKey> for String {
    fn from(k: SlotKey) -> Self {
        k.to_db_string()
    }
}

/// Inclusive `[start, end]` window of slot keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRange {
    /// First key in the window.
    pub start: SlotKey,
    /// Last key in the window (inclusive).
    pub end: SlotKey,
}

impl SlotRange {
    /// Builds the window; `start > end` yields an empty window that contains nothing.
    pub const fn new(start: SlotKey, end: SlotKey) -> Self {
        Self { start, end }
    }

    /// True when `key` lies inside the window.
    pub fn contains(&self, key: SlotKey) -> bool {
        self.start <= key && key <= self.end
    }

    /// True when no key can lie inside the window.
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

/// Pure description of the slots between `start` and `end` at a fixed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeGrid {
    start: SlotKey,
    end: SlotKey,
    step_hours: NonZeroU32,
}

impl TimeGrid {
    /// Create a grid; `start` must not be after `end`.
    pub fn new(start: SlotKey, end: SlotKey, step_hours: NonZeroU32) -> anyhow::Result<Self> {
        if start > end {
            bail!("grid start {start} is after end {end}");
        }
        Ok(Self {
            start,
            end,
            step_hours,
        })
    }

    /// First slot.
    pub fn start(&self) -> SlotKey {
        self.start
    }

    /// Upper bound (inclusive); not necessarily a slot itself.
    pub fn end(&self) -> SlotKey {
        self.end
    }

    /// Step in hours.
    pub fn step_hours(&self) -> NonZeroU32 {
        self.step_hours
    }

    /// Step as a duration.
    pub fn step(&self) -> Duration {
        Duration::hours(i64::from(self.step_hours.get()))
    }

    /// The `[start, end]` window covered by this grid.
    pub fn range(&self) -> SlotRange {
        SlotRange::new(self.start, self.end)
    }

    /// Number of slots: `floor((end - start) / step) + 1`.
    pub fn len(&self) -> usize {
        let span = (self.end.0 - self.start.0).num_minutes();
        let step = self.step().num_minutes();
        (span / step) as usize + 1
    }

    /// Never true: a valid grid always holds at least `start`.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether `key` is one of this grid's slots.
    pub fn contains(&self, key: SlotKey) -> bool {
        if !self.range().contains(key) {
            return false;
        }
        let offset = (key.0 - self.start.0).num_minutes();
        offset % self.step().num_minutes() == 0
    }

    /// The slot right after `key`, if still inside the grid.
    pub fn next_after(&self, key: SlotKey) -> Option<SlotKey> {
        key.0
            .checked_add_signed(self.step())
            .map(SlotKey)
            .filter(|k| *k <= self.end)
    }

    /// Iterate slots in ascending order.
    pub fn iter(&self) -> GridIter {
        GridIter {
            next: Some(self.start),
            end: self.end,
            step: self.step(),
            remaining: self.len(),
        }
    }
}

impl<'a> IntoIterator for &'a TimeGrid {
    type Item = SlotKey;
    type IntoIter = GridIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`TimeGrid`].
#[derive(Debug, Clone)]
pub struct GridIter {
    next: Option<SlotKey>,
    end: SlotKey,
    step: Duration,
    remaining: usize,
}

impl Iterator for GridIter {
    type Item = SlotKey;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current
            .0
            .checked_add_signed(self.step)
            .map(SlotKey)
            .filter(|k| *k <= self.end);
        self.remaining = self.remaining.saturating_sub(1);
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for GridIter {}
impl FusedIterator for GridIter {}
