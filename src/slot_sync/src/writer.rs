//! Maps one remote response onto a checkpoint row.
//!
//! - `id` becomes the row's `external_id` (strings kept, numbers stringified).
//! - `solarDate` picks the row. The remote may normalise the timestamp, so its
//!   echo wins over the requested slot; an explicit UTC offset is dropped and
//!   the remote's wall clock is kept, truncated to the minute.
//! - Every other field goes into the payload document. Objects and arrays
//!   are stored as JSON text, scalars as-is.

use calc_client::CalculationResponse;
use chrono::{DateTime, NaiveDateTime};
use diesel::SqliteConnection;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::{checkpoint::CheckpointStore, grid::SlotKey, models::PayloadDocument};

/// Field holding the remote's identifier for the computation.
pub const EXTERNAL_ID_FIELD: &str = "id";
/// Field holding the remote's echo of the requested timestamp.
pub const ECHOED_SLOT_FIELD: &str = "solarDate";

/// Why a response could not be committed.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The response carried no identifier.
    #[error("response has no `id` field")]
    MissingExternalId,

    /// The identifier was present but not a non-empty string or number.
    #[error("response `id` is not usable: {0}")]
    InvalidExternalId(Value),

    /// A nested payload field could not be turned into JSON text.
    #[error("could not serialize payload field `{field}`: {source}")]
    Serialize {
        /// Offending field.
        field: String,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// The store rejected the write.
    #[error("store write failed: {0:#}")]
    Store(anyhow::Error),
}

/// A response reduced to exactly what the store needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotWrite {
    /// Row the write lands on.
    pub slot: SlotKey,
    /// Remote identifier.
    pub external_id: String,
    /// Remaining fields.
    pub payload: PayloadDocument,
}

/// Build the write for `requested` from a decoded response.
pub fn prepare_write(
    requested: SlotKey,
    response: &CalculationResponse,
) -> Result<SlotWrite, WriteError> {
    let external_id = external_id_of(response)?;

    let slot = match response.get(ECHOED_SLOT_FIELD) {
        Some(echo) => parse_echoed_slot(echo).unwrap_or_else(|| {
            warn!(slot = %requested, echo = %echo, "unparseable echoed slot; using requested slot");
            requested
        }),
        None => {
            warn!(slot = %requested, "response has no echoed slot; using requested slot");
            requested
        }
    };

    let mut payload = PayloadDocument::default();
    for (field, value) in response {
        if field == EXTERNAL_ID_FIELD || field == ECHOED_SLOT_FIELD {
            continue;
        }
        let stored = match value {
            Value::Object(_) | Value::Array(_) => {
                let text = serde_json::to_string(value).map_err(|source| WriteError::Serialize {
                    field: field.clone(),
                    source,
                })?;
                Value::String(text)
            }
            scalar => scalar.clone(),
        };
        payload.0.insert(field.clone(), stored);
    }

    Ok(SlotWrite {
        slot,
        external_id,
        payload,
    })
}

fn external_id_of(response: &CalculationResponse) -> Result<String, WriteError> {
    match response.get(EXTERNAL_ID_FIELD) {
        None | Some(Value::Null) => Err(WriteError::MissingExternalId),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(WriteError::InvalidExternalId(other.clone())),
    }
}

/// Interpret the remote's timestamp echo. `None` when it is not a timestamp.
pub fn parse_echoed_slot(echo: &Value) -> Option<SlotKey> {
    let text = echo.as_str()?.trim();
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(text) {
        return Some(SlotKey::new(with_offset.naive_local()));
    }
    if let Ok(key) = SlotKey::parse(text) {
        return Some(key);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(SlotKey::new)
}

/// Commits responses through a [`CheckpointStore`].
#[derive(Debug, Clone)]
pub struct UpsertWriter<S> {
    store: S,
}

impl<S: CheckpointStore> UpsertWriter<S> {
    /// Writer over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The wrapped store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Write `response` for `requested`; returns the key that was written.
    pub fn commit(
        &self,
        conn: &mut SqliteConnection,
        requested: SlotKey,
        response: &CalculationResponse,
    ) -> Result<SlotKey, WriteError> {
        let write = prepare_write(requested, response)?;
        self.store
            .upsert(conn, write.slot, &write.external_id, &write.payload)
            .map_err(WriteError::Store)?;
        Ok(write.slot)
    }
}
