use std::{num::NonZeroU32, time::Duration};

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, StatusCode, Url, header};
use snafu::{OptionExt, ResultExt};
use tracing::debug;

use crate::{
    errors::{FetchError, body_preview},
    identity::IdentityPool,
    providers::{CalculationProvider, ClientBuildSnafu, ClientInitError, InvalidEndpointSnafu},
    request::{CalculationRequest, CalculationResponse},
};

/// Default remote endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://www.fatemaster.ai/api/bazi-calculate";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for [`HttpCalculationProvider`].
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub endpoint: String,
    pub timeout: Duration,
    pub identities: IdentityPool,
    /// Hard ceiling on calls per minute, enforced independently of the
    /// randomized pacing. `None` disables it.
    pub max_requests_per_minute: Option<NonZeroU32>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            identities: IdentityPool::default(),
            max_requests_per_minute: Some(nonzero_ext::nonzero!(30u32)),
        }
    }
}

/// POSTs the request as JSON and classifies the outcome.
pub struct HttpCalculationProvider {
    client: Client,
    endpoint: Url,
    identities: IdentityPool,
    ceiling: Option<DefaultDirectRateLimiter>,
}

impl HttpCalculationProvider {
    pub fn new(settings: HttpSettings) -> Result<Self, ClientInitError> {
        let endpoint = Url::parse(&settings.endpoint)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .context(InvalidEndpointSnafu {
                endpoint: settings.endpoint.clone(),
            })?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .context(ClientBuildSnafu)?;

        let ceiling = settings
            .max_requests_per_minute
            .map(|n| RateLimiter::direct(Quota::per_minute(n)));

        Ok(Self {
            client,
            endpoint,
            identities: settings.identities,
            ceiling,
        })
    }
}

#[async_trait]
impl CalculationProvider for HttpCalculationProvider {
    async fn calculate(
        &self,
        request: &CalculationRequest,
    ) -> Result<CalculationResponse, FetchError> {
        if let Some(limiter) = &self.ceiling {
            limiter.until_ready().await;
        }

        // pick before any await so the thread rng is not held across it
        let agent = self.identities.pick(&mut rand::rng()).to_string();
        debug!(birth_date = %request.birth_date, user_agent = %agent, "posting calculation");

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(header::USER_AGENT, agent)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                body: body_preview(&text),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: body_preview(&text),
            });
        }

        Ok(serde_json::from_str::<CalculationResponse>(&text)?)
    }
}
