use std::time::Duration;

use chrono::NaiveDateTime;

use crate::{
    errors::FetchError,
    pacing::Pacing,
    providers::CalculationProvider,
    request::{CalculationRequest, CalculationResponse, RequestDefaults},
};

/// Slot-level client: builds the deterministic request for a slot, runs it
/// through a provider, and decides how long to wait before the next call.
pub struct FetchClient<P> {
    provider: P,
    defaults: RequestDefaults,
    pacing: Pacing,
}

impl<P: CalculationProvider> FetchClient<P> {
    pub fn new(provider: P, defaults: RequestDefaults, pacing: Pacing) -> Self {
        Self {
            provider,
            defaults,
            pacing,
        }
    }

    pub fn request_for(&self, slot: NaiveDateTime) -> CalculationRequest {
        CalculationRequest::for_slot(slot, &self.defaults)
    }

    /// One call for `slot`.
    pub async fn fetch(&self, slot: NaiveDateTime) -> Result<CalculationResponse, FetchError> {
        let request = self.request_for(slot);
        self.provider.calculate(&request).await
    }

    /// Delay to observe after a successful call, drawn fresh each time.
    pub fn next_delay(&self) -> Duration {
        self.pacing.next_delay(&mut rand::rng())
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}
