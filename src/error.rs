//! Error types for the coin dashboard

use reqwest::StatusCode;
use thiserror::Error;

/// Classified failure of a single market data fetch
///
/// The `Display` output is the user-facing message. Variants are `Clone` so
/// the last error can live in the cached query state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// HTTP 429 from the upstream API
    #[error("Rate limit exceeded. Try again later.")]
    RateLimited,

    /// HTTP 5xx from the upstream API
    #[error("CoinGecko API is down. Please try again later.")]
    UpstreamUnavailable { status: u16 },

    /// Any other non-success HTTP status
    #[error("API error: {status_text}")]
    UpstreamApiError { status: u16, status_text: String },

    /// The request was sent but no response came back
    #[error("No response from CoinGecko. Please try again later.")]
    NoResponse,

    /// Anything that does not fit the categories above
    #[error("An unknown error occurred: {0}")]
    Unknown(String),
}

impl FetchError {
    /// Classifies an HTTP status, returning `None` for success codes
    pub fn from_status(status: StatusCode) -> Option<Self> {
        if status.is_success() {
            return None;
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Some(Self::RateLimited);
        }

        if status.is_server_error() {
            return Some(Self::UpstreamUnavailable {
                status: status.as_u16(),
            });
        }

        let status_text = status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| status.as_str().to_string());

        Some(Self::UpstreamApiError {
            status: status.as_u16(),
            status_text,
        })
    }

    /// Classifies a transport-level error from the HTTP client
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            if let Some(classified) = Self::from_status(status) {
                return classified;
            }
        }

        if err.is_timeout() || err.is_connect() || err.is_request() {
            return Self::NoResponse;
        }

        Self::Unknown(err.to_string())
    }

    /// Creates an Unknown error
    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    /// True for the one failure the poll controller never retries
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }

    /// Human-readable message surfaced to consumers
    pub fn message(&self) -> String {
        self.to_string()
    }
}
