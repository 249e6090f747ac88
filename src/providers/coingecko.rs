//! CoinGecko market data provider implementation

use crate::{
    constants::{
        COINGECKO_API_URL, COINGECKO_MARKETS_ENDPOINT, MARKET_ORDER, PAGE, PAGE_SIZE,
        PRICE_CHANGE_WINDOW, REQUEST_TIMEOUT_SECS, USER_AGENT, VS_CURRENCY,
    },
    error::FetchError,
    provider::MarketDataProvider,
    types::{CoinRecord, MarketsQuery},
};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// CoinGecko `/coins/markets` provider
pub struct CoinGeckoProvider {
    client: Client,
    base_url: String,
}

impl CoinGeckoProvider {
    /// Creates a provider against the public CoinGecko API
    pub fn new() -> Result<Self, FetchError> {
        Self::with_endpoint(COINGECKO_API_URL, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    /// Creates a provider against a custom base URL (e.g. a local test server)
    pub fn with_endpoint(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::unknown(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Fixed query for the top page of coins
    fn markets_query() -> MarketsQuery {
        MarketsQuery {
            vs_currency: VS_CURRENCY,
            order: MARKET_ORDER,
            per_page: PAGE_SIZE,
            page: PAGE,
            sparkline: false,
            price_change_percentage: PRICE_CHANGE_WINDOW,
        }
    }

    fn markets_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            COINGECKO_MARKETS_ENDPOINT
        )
    }

    /// Parses a successful response body into coin records
    ///
    /// An empty body or JSON `null` is an empty listing, not an error.
    fn parse_body(body: &str) -> Result<Vec<CoinRecord>, FetchError> {
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        let coins: Option<Vec<CoinRecord>> = serde_json::from_str(body).map_err(|e| {
            FetchError::unknown(format!("Failed to parse CoinGecko response: {}", e))
        })?;

        let mut coins = coins.unwrap_or_default();
        if coins.len() > PAGE_SIZE {
            tracing::debug!(
                returned = coins.len(),
                page_size = PAGE_SIZE,
                "CoinGecko returned more coins than requested, truncating"
            );
            coins.truncate(PAGE_SIZE);
        }

        Ok(coins)
    }
}

#[async_trait]
impl MarketDataProvider for CoinGeckoProvider {
    async fn fetch_markets(&self) -> Result<Vec<CoinRecord>, FetchError> {
        let url = self.markets_url();
        tracing::debug!(url = %url, "Fetching markets from CoinGecko");

        let response = self
            .client
            .get(&url)
            .query(&Self::markets_query())
            .send()
            .await
            .map_err(|e| {
                tracing::debug!(error = %e, "CoinGecko request failed");
                FetchError::from_transport(&e)
            })?;

        if let Some(err) = FetchError::from_status(response.status()) {
            tracing::debug!(status = response.status().as_u16(), "CoinGecko returned an error status");
            return Err(err);
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_transport(&e))?;

        let coins = Self::parse_body(&body)?;

        tracing::debug!(count = coins.len(), "Successfully fetched markets from CoinGecko");

        Ok(coins)
    }

    fn provider_name(&self) -> &'static str {
        "coingecko"
    }
}
