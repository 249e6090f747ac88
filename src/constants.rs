//! Constants for the coin dashboard
//!
//! All configuration is centralized here. There is no runtime configuration
//! file; `PollConfig` and `RetryPolicy` default to these values.

/// How often the poll controller refetches market data (in seconds)
pub const REFETCH_INTERVAL_SECS: u64 = 300;

/// HTTP request timeout when fetching market data (in seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Maximum number of automatic retries after a failed attempt
pub const MAX_RETRIES: u32 = 3;

/// Backoff before the first retry (in milliseconds), doubled per retry
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// Upper bound for the retry backoff (in milliseconds)
pub const MAX_BACKOFF_MS: u64 = 30000;

/// Capacity of the query event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// CoinGecko API base URL
pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

/// CoinGecko API endpoint for market listings
pub const COINGECKO_MARKETS_ENDPOINT: &str = "/coins/markets";

/// Quote currency for prices
pub const VS_CURRENCY: &str = "usd";

/// Ordering requested from CoinGecko
pub const MARKET_ORDER: &str = "market_cap_desc";

/// Number of coins fetched per request
pub const PAGE_SIZE: usize = 5;

/// Page of the market listing to fetch
pub const PAGE: u32 = 1;

/// Window for the percentage price change
pub const PRICE_CHANGE_WINDOW: &str = "1h";

/// User agent for HTTP requests
pub const USER_AGENT: &str = "coin-dashboard/0.1.0";
