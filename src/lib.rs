//! # Coin Dashboard
//!
//! Core of a top-coins market dashboard: fetches the five largest coins by
//! market cap from CoinGecko, keeps them in a cached query that refetches
//! every five minutes, and turns the cached state plus a search string into
//! a renderable view.
//!
//! ## Usage
//!
//! ```no_run
//! use coin_dashboard::{CryptoDashboard, PollController};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let controller = PollController::new()?;
//! let _polling = controller.start();
//!
//! let mut dashboard = CryptoDashboard::new(controller);
//! dashboard.set_search("bit");
//!
//! let view = dashboard.refresh().await;
//! if let Some(message) = &view.error_message {
//!     eprintln!("{}", message);
//! }
//! for row in &view.rows {
//!     println!("{} {}", row.label, row.price);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! PollHandle (interval timer)     refetch()
//!           \                      /
//!            PollController (in-flight guard, retry policy)
//!                     ↓
//!        MarketDataProvider (CoinGecko /coins/markets)
//!                     ↓
//!        QueryStore (watch channel) → QueryState snapshots
//!                     ↓
//!        DashboardView (search filter, formatted rows)
//! ```
//!
//! ## Error Handling
//!
//! Every failed request is classified into a [`FetchError`]. Rate limiting is
//! surfaced immediately; anything else is retried up to three times with
//! exponential backoff. Previously fetched data survives later failures.

pub mod config;
pub mod constants;
pub mod controller;
pub mod dashboard;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod provider;
pub mod providers;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::{PollConfig, RetryPolicy};
pub use controller::{PollController, PollHandle};
pub use dashboard::{CoinRow, CryptoDashboard, DashboardView, Trend};
pub use error::FetchError;
pub use filter::filter_coins;
pub use metrics::FetchMetrics;
pub use provider::MarketDataProvider;
pub use types::{
    CoinRecord, ComponentHealth, FetchTrigger, HealthStatus, QueryEvent, QueryState, QueryStatus,
};
