//! Provider abstraction for the calculation service.
//!
//! [`CalculationProvider`] is the seam between the ingestion loop and the
//! network: the production implementation is [`http::HttpCalculationProvider`],
//! tests plug in scripted providers.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use calc_client::{CalculationProvider, CalculationRequest, CalculationResponse, FetchError};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl CalculationProvider for Echo {
//!     async fn calculate(
//!         &self,
//!         request: &CalculationRequest,
//!     ) -> Result<CalculationResponse, FetchError> {
//!         let mut body = CalculationResponse::new();
//!         body.insert("solarDate".into(), request.birth_date.clone().into());
//!         Ok(body)
//!     }
//! }
//! ```

pub mod http;

use async_trait::async_trait;
use snafu::{Backtrace, Snafu};

use crate::{errors::FetchError, request::{CalculationRequest, CalculationResponse}};

/// One remote computation per call.
#[async_trait]
pub trait CalculationProvider: Send + Sync {
    /// Perform a single call. No retries here; the caller owns the retry policy.
    async fn calculate(&self, request: &CalculationRequest)
    -> Result<CalculationResponse, FetchError>;
}

#[async_trait]
impl<P: CalculationProvider + ?Sized> CalculationProvider for Box<P> {
    async fn calculate(
        &self,
        request: &CalculationRequest,
    ) -> Result<CalculationResponse, FetchError> {
        (**self).calculate(request).await
    }
}

/// Errors that can occur while building a provider.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ClientInitError {
    /// failed to init reqwest client
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// Endpoint is not an absolute http(s) URL.
    #[snafu(display("Invalid calculation endpoint: {endpoint}"))]
    InvalidEndpoint {
        endpoint: String,
        backtrace: Backtrace,
    },
}
