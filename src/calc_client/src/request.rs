//! Request/response model for the calculation endpoint.
//!
//! The request body is a pure function of the slot timestamp: everything
//! except `birthDate`/`birthTime` comes from [`RequestDefaults`].

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Decoded response body. Kept as an untyped JSON object; the pipeline only
/// reads the identifier and the echoed timestamp out of it.
pub type CalculationResponse = serde_json::Map<String, serde_json::Value>;

/// Wire format of `birthDate`.
pub const BIRTH_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Location sent with every request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BirthPlace {
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub country_code: String,
}

impl Default for BirthPlace {
    fn default() -> Self {
        Self {
            address: "台湾".to_string(),
            latitude: 23.777978,
            longitude: 120.930229,
            country_code: "TW".to_string(),
        }
    }
}

/// The fixed part of every request body.
///
/// Deserializable so a config file can override individual fields; anything
/// not mentioned keeps its default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestDefaults {
    pub name: String,
    pub gender: String,
    pub calendar_type: String,
    pub birth_place: BirthPlace,
    pub use_true_solar_time: bool,
    pub use_early_late_zi_hour: bool,
    pub dst_adjusted: Option<bool>,
    pub language: String,
    pub from_bazi: bool,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            name: String::new(),
            gender: "male".to_string(),
            calendar_type: "solar".to_string(),
            birth_place: BirthPlace::default(),
            use_true_solar_time: true,
            use_early_late_zi_hour: false,
            dst_adjusted: None,
            language: "zh-Hant".to_string(),
            from_bazi: false,
        }
    }
}

/// `birthTime` sub-object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BirthTime {
    pub hour: u32,
    pub minute: u32,
}

/// Full request body for one slot.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationRequest {
    #[serde(flatten)]
    pub defaults: RequestDefaults,
    pub birth_date: String,
    pub birth_time: BirthTime,
}

impl CalculationRequest {
    /// Build the body for `slot`. Deterministic: same slot, same defaults, same body.
    pub fn for_slot(slot: NaiveDateTime, defaults: &RequestDefaults) -> Self {
        Self {
            defaults: defaults.clone(),
            birth_date: slot.format(BIRTH_DATE_FORMAT).to_string(),
            birth_time: BirthTime {
                hour: slot.hour(),
                minute: 0,
            },
        }
    }
}
