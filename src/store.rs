//! Cached query state with watch-based change notification
//!
//! The store is the single owner of the dashboard's query state. Every
//! transition goes through the watch sender, so the in-flight check and the
//! flag update happen under one lock and consumers see each change.

use crate::{
    error::FetchError,
    types::{CoinRecord, QueryState, QueryStatus},
};
use chrono::Utc;
use tokio::sync::watch;

/// In-memory store for the cached market query
pub struct QueryStore {
    state: watch::Sender<QueryState>,
}

impl QueryStore {
    /// Creates a store in the idle state
    pub fn new() -> Self {
        let (state, _) = watch::channel(QueryState::idle());
        Self { state }
    }

    /// Returns a clone of the current state
    pub fn snapshot(&self) -> QueryState {
        self.state.borrow().clone()
    }

    /// Subscribes to state changes
    pub fn subscribe(&self) -> watch::Receiver<QueryState> {
        self.state.subscribe()
    }

    /// Marks a fetch as started
    ///
    /// # Returns
    /// False if a fetch was already in flight (nothing changes in that case)
    pub fn begin_fetch(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_fetching {
                return false;
            }
            state.is_fetching = true;
            state.status = QueryStatus::Loading;
            state.failure_count = 0;
            state.failure_reason = None;
            true
        })
    }

    /// Records a failed attempt that will be retried
    pub fn record_failure(&self, error: FetchError) {
        self.state.send_modify(|state| {
            state.failure_count += 1;
            state.failure_reason = Some(error);
        });
    }

    /// Settles the in-flight fetch with fresh data, clearing any error
    pub fn settle_success(&self, coins: Vec<CoinRecord>) {
        self.state.send_modify(|state| {
            state.status = QueryStatus::Success;
            state.data = Some(coins);
            state.error = None;
            state.is_fetching = false;
            state.failure_count = 0;
            state.failure_reason = None;
            state.data_updated_at = Some(Utc::now());
        });
    }

    /// Settles the in-flight fetch with an error, keeping previous data
    pub fn settle_error(&self, error: FetchError) {
        self.state.send_modify(|state| {
            state.status = QueryStatus::Error;
            state.failure_count += 1;
            state.failure_reason = Some(error.clone());
            state.error = Some(error);
            state.is_fetching = false;
            state.error_updated_at = Some(Utc::now());
        });
    }

    /// Releases an abandoned fetch without a result
    pub fn cancel_fetch(&self) {
        self.state.send_if_modified(|state| {
            if !state.is_fetching {
                return false;
            }
            state.is_fetching = false;
            state.status = state.settled_status();
            true
        });
    }

    /// Waits until no fetch is in flight and returns that state
    pub async fn wait_until_settled(&self) -> QueryState {
        let mut rx = self.state.subscribe();
        let settled = match rx.wait_for(|state| !state.is_fetching).await {
            Ok(state) => state.clone(),
            // The sender lives in `self`, so the channel cannot close here
            Err(_) => self.snapshot(),
        };
        settled
    }
}

impl Default for QueryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for the single in-flight fetch
///
/// Dropping the guard without settling (e.g. when the polling task is
/// aborted) releases the in-flight flag.
pub struct InFlightGuard<'a> {
    store: &'a QueryStore,
    settled: bool,
}

impl<'a> InFlightGuard<'a> {
    /// Acquires the guard, or returns None if a fetch is already in flight
    pub fn acquire(store: &'a QueryStore) -> Option<Self> {
        if !store.begin_fetch() {
            return None;
        }
        Some(Self {
            store,
            settled: false,
        })
    }

    pub fn succeed(mut self, coins: Vec<CoinRecord>) {
        self.settled = true;
        self.store.settle_success(coins);
    }

    pub fn fail(mut self, error: FetchError) {
        self.settled = true;
        self.store.settle_error(error);
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.store.cancel_fetch();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::sample_coins;

    #[test]
    fn test_second_begin_is_rejected() {
        let store = QueryStore::new();
        assert!(store.begin_fetch());
        assert!(!store.begin_fetch());

        let state = store.snapshot();
        assert!(state.is_fetching);
        assert_eq!(state.status, QueryStatus::Loading);
    }

    #[test]
    fn test_error_keeps_previous_data() {
        let store = QueryStore::new();
        store.begin_fetch();
        store.settle_success(sample_coins());

        store.begin_fetch();
        store.settle_error(FetchError::NoResponse);

        let state = store.snapshot();
        assert_eq!(state.status, QueryStatus::Error);
        assert_eq!(state.data, Some(sample_coins()));
        assert_eq!(state.error, Some(FetchError::NoResponse));
        assert!(!state.is_fetching);
    }

    #[test]
    fn test_success_clears_error() {
        let store = QueryStore::new();
        store.begin_fetch();
        store.settle_error(FetchError::RateLimited);
        assert!(store.snapshot().is_error());

        store.begin_fetch();
        // Error stays visible while the refetch runs
        assert!(store.snapshot().is_error());
        store.settle_success(Vec::new());

        let state = store.snapshot();
        assert!(!state.is_error());
        assert_eq!(state.status, QueryStatus::Success);
        assert_eq!(state.data, Some(Vec::new()));
    }

    #[test]
    fn test_failures_are_counted() {
        let store = QueryStore::new();
        store.begin_fetch();
        store.record_failure(FetchError::NoResponse);
        store.record_failure(FetchError::NoResponse);

        let state = store.snapshot();
        assert_eq!(state.failure_count, 2);
        assert_eq!(state.failure_reason, Some(FetchError::NoResponse));
        assert!(state.error.is_none());
    }

    #[test]
    fn test_dropped_guard_releases_flag() {
        let store = QueryStore::new();
        {
            let _guard = InFlightGuard::acquire(&store).unwrap();
            assert!(InFlightGuard::acquire(&store).is_none());
        }

        let state = store.snapshot();
        assert!(!state.is_fetching);
        assert_eq!(state.status, QueryStatus::Idle);
        assert!(InFlightGuard::acquire(&store).is_some());
    }

    #[test]
    fn test_settled_guard_keeps_result() {
        let store = QueryStore::new();
        let guard = InFlightGuard::acquire(&store).unwrap();
        guard.succeed(sample_coins());

        let state = store.snapshot();
        assert_eq!(state.status, QueryStatus::Success);
        assert!(state.data_updated_at.is_some());
    }

    #[tokio::test]
    async fn test_wait_until_settled() {
        let store = std::sync::Arc::new(QueryStore::new());
        store.begin_fetch();

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.wait_until_settled().await })
        };

        tokio::task::yield_now().await;
        store.settle_error(FetchError::NoResponse);

        let state = waiter.await.unwrap();
        assert_eq!(state.status, QueryStatus::Error);
    }

    #[tokio::test]
    async fn test_wait_until_settled_when_idle() {
        let store = QueryStore::new();
        store.begin_fetch();
        store.settle_success(sample_coins());

        let state = store.wait_until_settled().await;
        assert_eq!(state.status, QueryStatus::Success);
        assert_eq!(state.data, Some(sample_coins()));
    }
}
