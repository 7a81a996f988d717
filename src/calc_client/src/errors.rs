use thiserror::Error;

/// How the caller should react to a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The remote explicitly pushed back; wait out the long cool-down.
    RateLimited,
    /// Anything else (timeouts, connection errors, other non-2xx); short cool-down.
    Transient,
}

/// Errors returned by a [`crate::CalculationProvider`] for a single call.
///
/// None of these are permanent: the ingestion loop retries the same slot
/// after a cool-down chosen from [`FetchError::class`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP 429 from the remote.
    #[error("rate limited by remote: {body}")]
    RateLimited {
        /// First bytes of the response body, for the log.
        body: String,
    },

    /// Network failure, timeout or a failure while reading the body.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Any other non-success status.
    #[error("remote returned HTTP {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// First bytes of the response body, for the log.
        body: String,
    },

    /// The body was not a JSON object.
    #[error("could not decode response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl FetchError {
    /// Retry class for this failure.
    pub fn class(&self) -> FailureClass {
        match self {
            FetchError::RateLimited { .. } => FailureClass::RateLimited,
            _ => FailureClass::Transient,
        }
    }

    /// True when the underlying request hit the client timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Request(e) if e.is_timeout())
    }
}

/// Cap on how much of an error body ends up in logs.
pub(crate) const ERROR_BODY_PREVIEW: usize = 200;

pub(crate) fn body_preview(body: &str) -> String {
    body.chars().take(ERROR_BODY_PREVIEW).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_429_is_rate_limited() {
        let rl = FetchError::RateLimited { body: "slow down".into() };
        assert_eq!(rl.class(), FailureClass::RateLimited);

        let status = FetchError::Status { status: 503, body: String::new() };
        assert_eq!(status.class(), FailureClass::Transient);

        let decode = FetchError::from(serde_json::from_str::<serde_json::Value>("{").unwrap_err());
        assert_eq!(decode.class(), FailureClass::Transient);
        assert!(!decode.is_timeout());
    }

    #[test]
    fn body_preview_truncates_on_char_boundary() {
        let long = "命".repeat(500);
        let p = body_preview(&long);
        assert_eq!(p.chars().count(), ERROR_BODY_PREVIEW);
    }
}
