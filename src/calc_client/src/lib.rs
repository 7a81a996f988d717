//! Client side of the remote calculation service.
//!
//! One call per time slot: [`request::CalculationRequest`] is derived from the
//! slot alone, [`providers::http::HttpCalculationProvider`] performs the POST
//! with a rotating client identity, and [`fetch::FetchClient`] ties a provider
//! to the request defaults and the randomized pacing between calls.
//!
//! Failures are classified by [`errors::FetchError::class`] into rate-limit
//! backpressure and everything else; both are retryable.

pub mod errors;
pub mod fetch;
pub mod identity;
pub mod pacing;
pub mod providers;
pub mod request;

pub use errors::{FailureClass, FetchError};
pub use fetch::FetchClient;
pub use providers::CalculationProvider;
pub use request::{CalculationRequest, CalculationResponse, RequestDefaults};
