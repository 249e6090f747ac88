//! Fetch attempt metrics
//!
//! Tracks latency percentiles, success rate and rate-limit hits for every
//! attempt the poll controller makes, retries included.

use crate::error::FetchError;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Maximum number of samples to keep for metrics calculation
const MAX_SAMPLES: usize = 100;

/// Metrics snapshot for a provider
#[derive(Debug, Clone)]
pub struct FetchMetrics {
    /// Name of the provider
    pub provider_name: String,
    /// 50th percentile latency of successful attempts in milliseconds
    pub latency_p50_ms: f64,
    /// 99th percentile latency of successful attempts in milliseconds
    pub latency_p99_ms: f64,
    /// Success rate (0.0 to 1.0)
    pub success_rate: f64,
    /// Total number of attempts
    pub total_requests: u64,
    /// Number of failed attempts
    pub failed_requests: u64,
    /// Number of attempts rejected with HTTP 429
    pub rate_limited_requests: u64,
}

impl FetchMetrics {
    /// Creates metrics with no data
    pub fn empty(provider_name: &str) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            latency_p50_ms: 0.0,
            latency_p99_ms: 0.0,
            success_rate: 1.0,
            total_requests: 0,
            failed_requests: 0,
            rate_limited_requests: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct LatencySample {
    duration_ms: f64,
    success: bool,
}

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    failed: u64,
    rate_limited: u64,
}

/// Collects and computes metrics for a provider
pub struct MetricsCollector {
    provider_name: String,
    /// Rolling window of latency samples
    samples: Arc<RwLock<VecDeque<LatencySample>>>,
    /// Lifetime counters
    counters: Arc<RwLock<Counters>>,
}

impl MetricsCollector {
    /// Creates a new metrics collector for a provider
    pub fn new(provider_name: &str) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            samples: Arc::new(RwLock::new(VecDeque::with_capacity(MAX_SAMPLES))),
            counters: Arc::new(RwLock::new(Counters::default())),
        }
    }

    /// Records one attempt with its duration and outcome
    pub async fn record_attempt(&self, duration: Duration, outcome: Result<(), &FetchError>) {
        let duration_ms = duration.as_secs_f64() * 1000.0;
        let success = outcome.is_ok();

        {
            let mut counters = self.counters.write().await;
            counters.total += 1;
            if let Err(err) = outcome {
                counters.failed += 1;
                if err.is_rate_limited() {
                    counters.rate_limited += 1;
                }
            }
        }

        let mut samples = self.samples.write().await;
        if samples.len() >= MAX_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(LatencySample {
            duration_ms,
            success,
        });
    }

    /// Computes current metrics from collected samples
    pub async fn get_metrics(&self) -> FetchMetrics {
        let samples = self.samples.read().await;
        let counters = self.counters.read().await;

        if samples.is_empty() {
            return FetchMetrics::empty(&self.provider_name);
        }

        let mut latencies: Vec<f64> = samples
            .iter()
            .filter(|s| s.success)
            .map(|s| s.duration_ms)
            .collect();

        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let success_rate = if counters.total > 0 {
            (counters.total - counters.failed) as f64 / counters.total as f64
        } else {
            1.0
        };

        FetchMetrics {
            provider_name: self.provider_name.clone(),
            latency_p50_ms: percentile(&latencies, 50.0),
            latency_p99_ms: percentile(&latencies, 99.0),
            success_rate,
            total_requests: counters.total,
            failed_requests: counters.failed,
            rate_limited_requests: counters.rate_limited,
        }
    }
}

/// Calculate percentile from sorted values
fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }

    let idx = (p / 100.0 * (sorted_values.len() - 1) as f64).round() as usize;
    sorted_values[idx.min(sorted_values.len() - 1)]
}
