//! Poll controller for the top-coins market query
//!
//! Owns the cached query state and drives fetches from two sources: a
//! recurring interval timer and manual `refetch()` calls. Both funnel through
//! the store's in-flight guard, so at most one request is ever outstanding.

use crate::{
    config::PollConfig,
    constants::EVENT_CHANNEL_CAPACITY,
    error::FetchError,
    metrics::{FetchMetrics, MetricsCollector},
    provider::MarketDataProvider,
    providers::CoinGeckoProvider,
    store::{InFlightGuard, QueryStore},
    types::{
        CoinRecord, ComponentHealth, FetchTrigger, HealthStatus, QueryEvent, QueryState,
    },
};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};

/// Shortest refetch interval accepted by `start`
const MIN_REFETCH_INTERVAL: Duration = Duration::from_millis(10);

/// Poll controller for the CoinGecko markets query
///
/// Cloning is cheap and every clone shares the same cached state.
///
/// # Example
/// ```no_run
/// use coin_dashboard::PollController;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let controller = PollController::new()?;
/// let _polling = controller.start();
///
/// let state = controller.refetch().await;
/// if let Some(coins) = &state.data {
///     for coin in coins {
///         println!("{}: ${:.2}", coin.name, coin.current_price);
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PollController {
    store: Arc<QueryStore>,
    provider: Arc<dyn MarketDataProvider>,
    metrics: Arc<MetricsCollector>,
    events: broadcast::Sender<QueryEvent>,
    config: PollConfig,
}

impl PollController {
    /// Creates a controller backed by the public CoinGecko API
    pub fn new() -> Result<Self, FetchError> {
        Ok(Self::with_provider(Arc::new(CoinGeckoProvider::new()?)))
    }

    /// Creates a controller with a custom provider and default settings
    pub fn with_provider(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self::with_config(provider, PollConfig::default())
    }

    /// Creates a controller with a custom provider and settings
    pub fn with_config(provider: Arc<dyn MarketDataProvider>, config: PollConfig) -> Self {
        let metrics = Arc::new(MetricsCollector::new(provider.provider_name()));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            store: Arc::new(QueryStore::new()),
            provider,
            metrics,
            events,
            config,
        }
    }

    /// Starts automatic polling
    ///
    /// The first fetch fires immediately, then one every refetch interval.
    /// Polling stops when the returned handle is dropped.
    pub fn start(&self) -> PollHandle {
        let controller = self.clone();
        let period = self.config.refetch_interval.max(MIN_REFETCH_INTERVAL);

        let handle = tokio::spawn(async move {
            tracing::info!(
                refetch_interval_secs = period.as_secs(),
                provider = controller.provider_name(),
                "Starting market data polling"
            );

            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                controller.poll_once().await;
            }
        });

        PollHandle { handle }
    }

    /// Runs one timer-driven fetch unless one is already in flight
    async fn poll_once(&self) {
        match InFlightGuard::acquire(&self.store) {
            Some(guard) => self.execute(guard, FetchTrigger::Interval).await,
            None => tracing::debug!("Skipping scheduled fetch, one is already in flight"),
        }
    }

    /// Fetches immediately, bypassing the interval
    ///
    /// If a fetch is already in flight no new request is made; the call waits
    /// for the in-flight one to settle instead.
    ///
    /// # Returns
    /// The state after the fetch settled
    pub async fn refetch(&self) -> QueryState {
        match InFlightGuard::acquire(&self.store) {
            Some(guard) => {
                self.execute(guard, FetchTrigger::Manual).await;
                self.store.snapshot()
            }
            None => {
                tracing::debug!("Fetch already in flight, waiting for it");
                self.store.wait_until_settled().await
            }
        }
    }

    /// Runs the fetch owned by `guard`, retrying per the retry policy
    async fn execute(&self, guard: InFlightGuard<'_>, trigger: FetchTrigger) {
        let retry = self.config.retry;
        let mut failures = 0u32;

        self.emit(QueryEvent::started(trigger));

        loop {
            let attempt = failures + 1;
            let start = Instant::now();

            match self.provider.fetch_markets().await {
                Ok(coins) => {
                    self.metrics.record_attempt(start.elapsed(), Ok(())).await;
                    tracing::debug!(
                        count = coins.len(),
                        provider = self.provider_name(),
                        attempt = attempt,
                        latency_ms = start.elapsed().as_millis() as u64,
                        "Successfully fetched market data"
                    );
                    self.emit(QueryEvent::succeeded(coins.len(), attempt));
                    guard.succeed(coins);
                    return;
                }
                Err(e) => {
                    self.metrics.record_attempt(start.elapsed(), Err(&e)).await;
                    let will_retry = retry.should_retry(failures, &e);
                    self.emit(QueryEvent::failed(&e, attempt, will_retry));

                    if !will_retry {
                        tracing::warn!(
                            attempt = attempt,
                            rate_limited = e.is_rate_limited(),
                            error = %e,
                            "Failed to fetch market data"
                        );
                        guard.fail(e);
                        return;
                    }

                    let backoff = retry.backoff(failures);
                    tracing::warn!(
                        attempt = attempt,
                        max_retries = retry.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Failed to fetch market data, retrying"
                    );
                    self.store.record_failure(e);
                    failures += 1;
                    sleep(backoff).await;
                }
            }
        }
    }

    fn emit(&self, event: QueryEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Returns a snapshot of the cached state
    pub fn state(&self) -> QueryState {
        self.store.snapshot()
    }

    /// Last successfully fetched coins
    pub fn data(&self) -> Option<Vec<CoinRecord>> {
        self.store.snapshot().data
    }

    /// Error of the last settled fetch
    pub fn error(&self) -> Option<FetchError> {
        self.store.snapshot().error
    }

    pub fn is_loading(&self) -> bool {
        self.store.snapshot().is_loading()
    }

    pub fn is_fetching(&self) -> bool {
        self.store.snapshot().is_fetching
    }

    /// Subscribes to state changes
    pub fn subscribe(&self) -> watch::Receiver<QueryState> {
        self.store.subscribe()
    }

    /// Subscribes to fetch lifecycle events
    pub fn events(&self) -> broadcast::Receiver<QueryEvent> {
        self.events.subscribe()
    }

    /// Returns the name of the current provider
    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Gets attempt metrics including latency percentiles and success rate
    pub async fn metrics(&self) -> FetchMetrics {
        self.metrics.get_metrics().await
    }

    /// Perform a health check on the controller
    ///
    /// # Returns
    /// ComponentHealth reflecting data availability, freshness and errors
    pub async fn health_check(&self) -> ComponentHealth {
        let state = self.state();
        let metrics = self.metrics().await;
        let mut details = std::collections::HashMap::new();

        let coin_count = state.data.as_ref().map(Vec::len).unwrap_or(0);
        details.insert("coin_count".to_string(), serde_json::json!(coin_count));
        details.insert(
            "provider_name".to_string(),
            serde_json::json!(self.provider_name()),
        );
        details.insert("status".to_string(), serde_json::json!(state.status));
        details.insert(
            "success_rate".to_string(),
            serde_json::json!(metrics.success_rate),
        );

        let data_age = state.data_updated_at.map(|updated| {
            Utc::now()
                .signed_duration_since(updated)
                .to_std()
                .unwrap_or_default()
        });
        if let Some(age) = data_age {
            details.insert("data_age_secs".to_string(), serde_json::json!(age.as_secs()));
        }

        let stale = data_age.is_some_and(|age| age > self.config.stale_after());

        let (status, message) = match (&state.data, &state.error) {
            (None, Some(err)) => (
                HealthStatus::Unhealthy,
                format!("No market data available: {}", err),
            ),
            (None, None) => (
                HealthStatus::Unhealthy,
                "No market data available yet".to_string(),
            ),
            (Some(_), Some(err)) => (
                HealthStatus::Degraded,
                format!("Serving previous market data after error: {}", err),
            ),
            (Some(_), None) if stale => (
                HealthStatus::Degraded,
                "Market data is stale".to_string(),
            ),
            (Some(_), None) => (
                HealthStatus::Healthy,
                "Market data is fresh".to_string(),
            ),
        };

        ComponentHealth {
            name: "market_poll_controller".to_string(),
            status,
            message: Some(message),
            details,
            last_checked: Utc::now(),
        }
    }
}

/// Handle to the background polling task
///
/// Dropping the handle stops polling. A fetch interrupted this way releases
/// the in-flight flag without touching the cached data.
pub struct PollHandle {
    handle: JoinHandle<()>,
}

impl PollHandle {
    /// Stops polling
    pub fn stop(self) {}

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::provider::mock::{coin, sample_coins, MockProvider};
    use crate::types::QueryStatus;

    fn controller(provider: &Arc<MockProvider>) -> PollController {
        PollController::with_provider(provider.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_exposes_data_unchanged() {
        let provider = Arc::new(MockProvider::new());
        let controller = controller(&provider);

        let state = controller.refetch().await;

        assert_eq!(state.status, QueryStatus::Success);
        assert_eq!(state.data, Some(sample_coins()));
        assert!(!state.is_loading());
        assert!(!state.is_fetching);
        assert!(!state.is_error());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_is_not_retried() {
        let provider = Arc::new(MockProvider::new());
        provider.set_fallback(Err(FetchError::RateLimited));
        let controller = controller(&provider);

        let state = controller.refetch().await;

        assert_eq!(provider.call_count(), 1);
        assert_eq!(state.status, QueryStatus::Error);
        assert_eq!(
            state.error_message().as_deref(),
            Some("Rate limit exceeded. Try again later.")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_retry_up_to_cap() {
        let provider = Arc::new(MockProvider::new());
        provider.set_fallback(Err(FetchError::UpstreamUnavailable { status: 503 }));
        let controller = controller(&provider);

        let state = controller.refetch().await;

        // One attempt plus three retries
        assert_eq!(provider.call_count(), 4);
        assert_eq!(state.failure_count, 4);
        assert_eq!(state.status, QueryStatus::Error);
        assert_eq!(state.error, Some(FetchError::UpstreamUnavailable { status: 503 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backoff_is_exponential() {
        let provider = Arc::new(MockProvider::new());
        provider.set_fallback(Err(FetchError::NoResponse));
        let controller = controller(&provider);

        let started = tokio::time::Instant::now();
        controller.refetch().await;

        // 1s + 2s + 4s between the four attempts
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(7), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(8), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_on_retry_stops_retrying() {
        let provider = Arc::new(MockProvider::new());
        provider.push_err(FetchError::NoResponse);
        provider.push_err(FetchError::RateLimited);
        let controller = controller(&provider);

        let state = controller.refetch().await;

        assert_eq!(provider.call_count(), 2);
        assert_eq!(state.status, QueryStatus::Error);
        assert_eq!(state.error, Some(FetchError::RateLimited));
        assert_eq!(state.failure_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers() {
        let provider = Arc::new(MockProvider::new());
        provider.push_err(FetchError::NoResponse);
        provider.push_err(FetchError::unknown("boom"));
        let controller = controller(&provider);

        let state = controller.refetch().await;

        assert_eq!(provider.call_count(), 3);
        assert_eq!(state.status, QueryStatus::Success);
        assert_eq!(state.failure_count, 0);
        assert!(state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_keeps_stale_data() {
        let provider = Arc::new(MockProvider::new());
        let controller = PollController::with_config(
            provider.clone(),
            PollConfig::default().with_retry(RetryPolicy::disabled()),
        );

        controller.refetch().await;
        provider.push_err(FetchError::NoResponse);
        let state = controller.refetch().await;

        assert_eq!(state.status, QueryStatus::Error);
        assert_eq!(state.data, Some(sample_coins()));
        assert!(state.is_error());

        let state = controller.refetch().await;
        assert_eq!(state.status, QueryStatus::Success);
        assert!(!state.is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_refetch_makes_one_request() {
        let provider = Arc::new(MockProvider::new());
        provider.set_delay(Duration::from_secs(5));
        let controller = controller(&provider);

        let (first, second) = tokio::join!(controller.refetch(), controller.refetch());

        assert_eq!(provider.call_count(), 1);
        assert_eq!(first.data, Some(sample_coins()));
        assert_eq!(second.data, Some(sample_coins()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetch_reports_in_flight() {
        let provider = Arc::new(MockProvider::new());
        provider.set_delay(Duration::from_secs(5));
        let controller = controller(&provider);

        let background = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.refetch().await })
        };
        sleep(Duration::from_secs(1)).await;

        assert!(controller.is_fetching());
        assert!(controller.is_loading());

        background.await.unwrap();
        assert!(!controller.is_fetching());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_polling() {
        let provider = Arc::new(MockProvider::new());
        let controller = controller(&provider);

        let handle = controller.start();
        sleep(Duration::from_secs(601)).await;
        assert_eq!(provider.call_count(), 3);
        assert!(handle.is_running());

        drop(handle);
        sleep(Duration::from_secs(900)).await;
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_refetch_joins_scheduled_fetch() {
        let provider = Arc::new(MockProvider::new());
        provider.set_delay(Duration::from_secs(10));
        let controller = controller(&provider);

        let _handle = controller.start();
        sleep(Duration::from_millis(1)).await;

        let state = controller.refetch().await;

        assert_eq!(provider.call_count(), 1);
        assert_eq!(state.status, QueryStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_tick_skipped_during_manual_fetch() {
        let provider = Arc::new(MockProvider::new());
        provider.set_delay(Duration::from_secs(10));
        let controller = controller(&provider);

        let manual = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.refetch().await })
        };
        sleep(Duration::from_millis(1)).await;
        assert!(controller.is_fetching());

        // First tick fires immediately and finds the manual fetch in flight
        let _handle = controller.start();
        sleep(Duration::from_secs(5)).await;
        assert_eq!(provider.call_count(), 1);

        let state = manual.await.unwrap();
        assert_eq!(state.status, QueryStatus::Success);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopping_mid_fetch_releases_flag() {
        let provider = Arc::new(MockProvider::new());
        provider.set_delay(Duration::from_secs(10));
        let controller = controller(&provider);

        let handle = controller.start();
        sleep(Duration::from_secs(1)).await;
        assert!(controller.is_fetching());

        handle.stop();
        sleep(Duration::from_millis(1)).await;

        let state = controller.state();
        assert!(!state.is_fetching);
        assert_eq!(state.status, QueryStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_are_broadcast() {
        let provider = Arc::new(MockProvider::new());
        provider.push_err(FetchError::NoResponse);
        let controller = controller(&provider);
        let mut events = controller.events();

        controller.refetch().await;

        let types: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.event_type())
            .collect();
        assert_eq!(types, ["FETCH_STARTED", "FETCH_FAILED", "FETCH_SUCCEEDED"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_subscription_sees_update() {
        let provider = Arc::new(MockProvider::new());
        provider.push_ok(vec![coin("bitcoin", "Bitcoin", "btc", 1.0, 0.0)]);
        let controller = controller(&provider);
        let mut rx = controller.subscribe();

        controller.refetch().await;

        assert!(rx.has_changed().unwrap());
        let state = rx.borrow_and_update().clone();
        assert_eq!(state.data.map(|d| d.len()), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_check() {
        let provider = Arc::new(MockProvider::new());
        let controller = PollController::with_config(
            provider.clone(),
            PollConfig::default().with_retry(RetryPolicy::disabled()),
        );

        assert_eq!(controller.health_check().await.status, HealthStatus::Unhealthy);

        controller.refetch().await;
        assert_eq!(controller.health_check().await.status, HealthStatus::Healthy);

        provider.push_err(FetchError::UpstreamUnavailable { status: 502 });
        controller.refetch().await;
        let health = controller.health_check().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.details["coin_count"], serde_json::json!(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_count_every_attempt() {
        let provider = Arc::new(MockProvider::new());
        provider.push_err(FetchError::RateLimited);
        let controller = controller(&provider);

        controller.refetch().await;
        controller.refetch().await;

        let metrics = controller.metrics().await;
        assert_eq!(metrics.provider_name, "mock");
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.rate_limited_requests, 1);
    }
}
