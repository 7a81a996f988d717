//! Read path for the lookup collaborator.
//!
//! A `(date, time bucket)` pair names exactly one slot: the bucket is one of
//! the twelve two-hour ranges and maps to the even hour inside it. Only
//! filled rows are ever returned; a pending, absent or unaddressable slot is
//! [`LookupOutcome::NotFound`].

use std::fmt;

use chrono::{Datelike, NaiveDate};
use diesel::SqliteConnection;
use thiserror::Error;

use crate::{checkpoint::CheckpointStore, grid::SlotKey, models::PayloadDocument};

/// One two-hour time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeBucket {
    label: &'static str,
    hour: u32,
}

/// All buckets in day order, starting with the one that wraps midnight.
pub const TIME_BUCKETS: [TimeBucket; 12] = [
    TimeBucket { label: "23-01", hour: 0 },
    TimeBucket { label: "01-03", hour: 2 },
    TimeBucket { label: "03-05", hour: 4 },
    TimeBucket { label: "05-07", hour: 6 },
    TimeBucket { label: "07-09", hour: 8 },
    TimeBucket { label: "09-11", hour: 10 },
    TimeBucket { label: "11-13", hour: 12 },
    TimeBucket { label: "13-15", hour: 14 },
    TimeBucket { label: "15-17", hour: 16 },
    TimeBucket { label: "17-19", hour: 18 },
    TimeBucket { label: "19-21", hour: 20 },
    TimeBucket { label: "21-23", hour: 22 },
];

impl TimeBucket {
    /// Bucket for a label such as `"09-11"`.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        TIME_BUCKETS.iter().copied().find(|b| b.label == label)
    }

    /// The label, e.g. `"09-11"`.
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Hour of day the bucket's slot starts at.
    pub fn hour(&self) -> u32 {
        self.hour
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label)
    }
}

/// A filled row as returned to readers.
#[derive(Debug, Clone, PartialEq)]
pub struct FilledSlot {
    /// The slot.
    pub slot: SlotKey,
    /// Remote identifier.
    pub external_id: String,
    /// Stored payload fields.
    pub payload: PayloadDocument,
}

/// Result of a lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    /// The slot exists and is filled.
    Found(FilledSlot),
    /// Pending, outside the ingested range, or not addressable.
    NotFound,
}

/// Lookup failures other than "not found".
#[derive(Debug, Error)]
pub enum LookupError {
    /// No date given.
    #[error("date is required")]
    MissingDate,

    /// No time bucket given.
    #[error("time bucket is required")]
    MissingTimeBucket,

    /// Reading the store failed.
    #[error("store read failed: {0:#}")]
    Store(anyhow::Error),
}

/// Slot addressed by a `YYYY-MM-DD` date and a bucket label; `None` if either is malformed.
pub fn slot_for(date: &str, bucket: &str) -> Option<SlotKey> {
    let bucket = TimeBucket::from_label(bucket)?;
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    SlotKey::from_ymd_h(date.year(), date.month(), date.day(), bucket.hour())
}

fn required(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Look up the filled slot for `(date, bucket)`.
pub fn lookup<S: CheckpointStore>(
    store: &S,
    conn: &mut SqliteConnection,
    date: Option<&str>,
    bucket: Option<&str>,
) -> Result<LookupOutcome, LookupError> {
    let date = required(date).ok_or(LookupError::MissingDate)?;
    let bucket = required(bucket).ok_or(LookupError::MissingTimeBucket)?;

    let Some(slot) = slot_for(date, bucket) else {
        return Ok(LookupOutcome::NotFound);
    };

    let Some(record) = store.find(conn, slot).map_err(LookupError::Store)? else {
        return Ok(LookupOutcome::NotFound);
    };
    let Some(external_id) = record.external_id.clone() else {
        return Ok(LookupOutcome::NotFound);
    };

    let payload = record
        .payload_document()
        .map_err(LookupError::Store)?
        .unwrap_or_default();

    Ok(LookupOutcome::Found(FilledSlot {
        slot,
        external_id,
        payload,
    }))
}

#[cfg(test)]
mod tests {
    use chrono::Timelike;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn every_bucket_maps_to_its_middle_even_hour() {
        for bucket in TIME_BUCKETS {
            let h = bucket.hour();
            let expected = format!("{:02}-{:02}", (h + 23) % 24, (h + 1) % 24);
            assert_eq!(bucket.label(), expected);
            assert_eq!(TimeBucket::from_label(&expected), Some(bucket));
        }
    }

    #[test]
    fn documented_example_maps_to_ten_oclock() {
        let slot = slot_for("1990-05-17", "09-11").unwrap();
        assert_eq!(slot.to_string(), "1990-05-17 10:00:00");
    }

    #[test]
    fn midnight_bucket_stays_on_the_same_date() {
        let slot = slot_for("2000-03-01", "23-01").unwrap();
        assert_eq!(slot.to_string(), "2000-03-01 00:00:00");
    }

    #[test]
    fn malformed_inputs_address_nothing() {
        assert_eq!(slot_for("1990-05-17", "10-12"), None);
        assert_eq!(slot_for("1990-05-17", "9-11"), None);
        assert_eq!(slot_for("1990-02-30", "09-11"), None);
        assert_eq!(slot_for("17/05/1990", "09-11"), None);
    }

    proptest! {
        #[test]
        fn any_valid_date_and_bucket_gives_an_even_hour_slot(
            days in 0i64..(150 * 366),
            idx in 0usize..12,
        ) {
            let base = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap();
            let date = base + chrono::Duration::days(days);
            let bucket = TIME_BUCKETS[idx];
            let slot = slot_for(&date.format("%Y-%m-%d").to_string(), bucket.label()).unwrap();
            prop_assert_eq!(slot.as_naive().date(), date);
            prop_assert_eq!(slot.as_naive().hour(), bucket.hour());
        }
    }
}
