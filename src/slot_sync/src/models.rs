//! Diesel models mapping to the database schema.
//!
//! These types mirror the table defined in the embedded migrations and in
//! [`crate::schema`]:
//! - [`crate::schema::slot_records`]: one row per time slot; pending while
//!   `external_id` is NULL, filled once the remote result has been written.

use anyhow::Context;
use diesel::prelude::*;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::schema::slot_records;

/// A row in [`crate::schema::slot_records`].
#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = slot_records, check_for_backend(diesel::sqlite::Sqlite))]
pub struct SlotRecord {
    /// Surrogate key assigned by the database. Unrelated to `external_id`.
    pub id: i32,
    /// Slot key rendered as `YYYY-MM-DD HH:MM:SS`; unique.
    pub solar_date_time: String,
    /// Identifier the remote assigned to this computation; NULL while pending.
    pub external_id: Option<String>,
    /// Opaque JSON document with the remote's payload fields.
    pub payload: Option<String>,
    /// Row creation timestamp (RFC3339 UTC).
    pub created_at: String,
    /// Last write timestamp (RFC3339 UTC).
    pub updated_at: String,
}

impl SlotRecord {
    /// Filled iff the remote identifier is present.
    pub fn is_filled(&self) -> bool {
        self.external_id.is_some()
    }

    /// Decoded payload document, if any was written.
    pub fn payload_document(&self) -> anyhow::Result<Option<PayloadDocument>> {
        self.payload
            .as_deref()
            .map(PayloadDocument::from_json)
            .transpose()
            .with_context(|| format!("corrupt payload for slot {}", self.solar_date_time))
    }
}

/// Insertable form used by pre-allocation: key only, everything else NULL/default.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = slot_records)]
pub struct NewSlot {
    /// Slot key in [`crate::grid::SLOT_KEY_FORMAT`].
    pub solar_date_time: String,
}

/// Insertable form used by the writer. On conflict the non-key columns
/// overwrite the existing row.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = slot_records)]
pub struct SlotFill<'a> {
    /// Slot key in [`crate::grid::SLOT_KEY_FORMAT`].
    pub solar_date_time: &'a str,
    /// Remote identifier.
    pub external_id: &'a str,
    /// Serialized [`PayloadDocument`].
    pub payload: &'a str,
    /// Write timestamp (RFC3339 UTC).
    pub updated_at: &'a str,
}

/// Schema-less payload: field name → JSON scalar, or a JSON text string
/// holding a serialized sub-object/array. Field order follows the remote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadDocument(pub IndexMap<String, serde_json::Value>);

impl PayloadDocument {
    /// Serialize for the `payload` column.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.0)
    }

    /// Parse a `payload` column value.
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Raw stored value of one field.
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.0.get(field)
    }

    /// Field value with serialized sub-objects decoded back to JSON.
    ///
    /// Plain strings that do not hold a JSON object or array come back as-is.
    pub fn decoded(&self, field: &str) -> Option<serde_json::Value> {
        let raw = self.0.get(field)?;
        match raw {
            serde_json::Value::String(text) => match serde_json::from_str::<serde_json::Value>(text) {
                Ok(v @ (serde_json::Value::Object(_) | serde_json::Value::Array(_))) => Some(v),
                _ => Some(raw.clone()),
            },
            other => Some(other.clone()),
        }
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when there are no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
