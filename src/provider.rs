//! Provider abstraction for fetching market listings from external APIs

use crate::{error::FetchError, types::CoinRecord};
use async_trait::async_trait;

/// Trait for market data providers
///
/// One call is one outbound request. Implementations classify their own
/// failures and never retry; retrying is the poll controller's job.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetches the top coins by market cap
    ///
    /// # Returns
    /// At most one page of coins in upstream order, or a classified error
    async fn fetch_markets(&self) -> Result<Vec<CoinRecord>, FetchError>;

    /// Returns the name of this provider
    fn provider_name(&self) -> &'static str;
}
