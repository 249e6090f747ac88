//! Types for the coin dashboard

use crate::error::FetchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Market snapshot for a single coin, as returned by `/coins/markets`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinRecord {
    /// CoinGecko id (e.g. "bitcoin")
    pub id: String,

    /// Display name
    pub name: String,

    /// Ticker symbol, lower case as reported upstream
    pub symbol: String,

    /// Image URI
    pub image: String,

    /// Current price in USD
    pub current_price: f64,

    /// 1h price change percentage
    #[serde(default, alias = "price_change_percentage_1h_in_currency")]
    pub price_change_percentage_1h: Option<f64>,
}

impl CoinRecord {
    /// True if the name or symbol contains `needle` (already lower-cased)
    pub fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle) || self.symbol.to_lowercase().contains(needle)
    }
}

/// Query parameters sent to the markets endpoint
#[derive(Debug, Clone, Serialize)]
pub struct MarketsQuery {
    pub vs_currency: &'static str,
    pub order: &'static str,
    pub per_page: usize,
    pub page: u32,
    pub sparkline: bool,
    pub price_change_percentage: &'static str,
}

/// Lifecycle status of the cached query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    /// Nothing fetched yet
    Idle,
    /// A fetch is in flight
    Loading,
    /// Last fetch succeeded
    Success,
    /// Last fetch failed after retries
    Error,
}

/// Snapshot of the poll controller's cached state
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
    pub status: QueryStatus,

    /// Last successfully fetched coins, kept across later failures
    pub data: Option<Vec<CoinRecord>>,

    /// Error of the last settled fetch, cleared on success
    pub error: Option<FetchError>,

    /// A fetch is currently in flight
    pub is_fetching: bool,

    /// Failed attempts during the current or last fetch
    pub failure_count: u32,

    /// Most recent failed attempt, including ones that were retried
    pub failure_reason: Option<FetchError>,

    pub data_updated_at: Option<DateTime<Utc>>,
    pub error_updated_at: Option<DateTime<Utc>>,
}

impl QueryState {
    /// Fresh state before the first fetch
    pub fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            is_fetching: false,
            failure_count: 0,
            failure_reason: None,
            data_updated_at: None,
            error_updated_at: None,
        }
    }

    /// First load: a fetch is in flight and no data has ever arrived
    pub fn is_loading(&self) -> bool {
        self.is_fetching && self.data.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    /// The error message shown to users, if any
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(FetchError::message)
    }

    /// Status to fall back to when an in-flight fetch is abandoned
    pub(crate) fn settled_status(&self) -> QueryStatus {
        if self.error.is_some() {
            QueryStatus::Error
        } else if self.data.is_some() {
            QueryStatus::Success
        } else {
            QueryStatus::Idle
        }
    }
}

impl Default for QueryState {
    fn default() -> Self {
        Self::idle()
    }
}

/// What started a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchTrigger {
    /// The refetch interval elapsed
    Interval,
    /// `refetch()` was called
    Manual,
}

/// Query lifecycle events broadcast by the poll controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryEvent {
    /// A fetch left the idle state
    FetchStarted {
        id: Uuid,
        trigger: FetchTrigger,
        timestamp: DateTime<Utc>,
    },

    /// A fetch settled with data
    FetchSucceeded {
        id: Uuid,
        coin_count: usize,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// An attempt failed
    FetchFailed {
        id: Uuid,
        error_message: String,
        attempt: u32,
        will_retry: bool,
        timestamp: DateTime<Utc>,
    },
}

impl QueryEvent {
    pub fn started(trigger: FetchTrigger) -> Self {
        Self::FetchStarted {
            id: Uuid::new_v4(),
            trigger,
            timestamp: Utc::now(),
        }
    }

    pub fn succeeded(coin_count: usize, attempts: u32) -> Self {
        Self::FetchSucceeded {
            id: Uuid::new_v4(),
            coin_count,
            attempts,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(error: &FetchError, attempt: u32, will_retry: bool) -> Self {
        Self::FetchFailed {
            id: Uuid::new_v4(),
            error_message: error.message(),
            attempt,
            will_retry,
            timestamp: Utc::now(),
        }
    }

    /// Get the event ID
    pub fn id(&self) -> Uuid {
        match self {
            QueryEvent::FetchStarted { id, .. } => *id,
            QueryEvent::FetchSucceeded { id, .. } => *id,
            QueryEvent::FetchFailed { id, .. } => *id,
        }
    }

    /// Get the event type as string
    pub fn event_type(&self) -> &'static str {
        match self {
            QueryEvent::FetchStarted { .. } => "FETCH_STARTED",
            QueryEvent::FetchSucceeded { .. } => "FETCH_SUCCEEDED",
            QueryEvent::FetchFailed { .. } => "FETCH_FAILED",
        }
    }
}

impl std::fmt::Display for QueryEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryEvent::FetchStarted { trigger, .. } => {
                write!(f, "Fetch started ({:?})", trigger)
            }
            QueryEvent::FetchSucceeded {
                coin_count,
                attempts,
                ..
            } => {
                write!(
                    f,
                    "Fetched {} coins in {} attempt(s)",
                    coin_count, attempts
                )
            }
            QueryEvent::FetchFailed {
                error_message,
                attempt,
                will_retry,
                ..
            } => {
                write!(
                    f,
                    "Attempt {} failed: {}{}",
                    attempt,
                    error_message,
                    if *will_retry { " (retrying)" } else { "" }
                )
            }
        }
    }
}

/// Overall component health status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Fresh data and no error
    Healthy,
    /// Data available but stale or accompanied by an error
    Degraded,
    /// No data available
    Unhealthy,
}

/// Component health information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional status message
    pub message: Option<String>,
    /// Component-specific details
    pub details: std::collections::HashMap<String, serde_json::Value>,
    /// Last checked timestamp
    pub last_checked: DateTime<Utc>,
}
