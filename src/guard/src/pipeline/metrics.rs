//! Pipeline outcome counters and latency percentiles

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::FailureKind;

/// Point-in-time view of the pipeline metrics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// Total number of requests run through the pipeline
    pub total_requests: u64,

    /// Requests allowed after authentication or rule evaluation
    pub allowed: u64,

    /// Requests allowed without entering a policy (disabled, gated, unmatched)
    pub passed_through: u64,

    /// Rejections per failure kind
    pub rejected: BTreeMap<FailureKind, u64>,

    /// Latency percentiles over the retained samples
    pub latency_p50_ms: f64,
    pub latency_p99_ms: f64,

    pub avg_latency_ms: f64,
}

impl MetricsSnapshot {
    pub fn total_rejected(&self) -> u64 {
        self.rejected.values().sum()
    }

    /// Share of requests that were allowed, pass-through included
    pub fn allow_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            (self.allowed + self.passed_through) as f64 / self.total_requests as f64
        }
    }
}

/// Lock-light metrics collector shared by all requests
pub struct PipelineMetrics {
    total_requests: AtomicU64,
    allowed: AtomicU64,
    passed_through: AtomicU64,
    rejected: DashMap<FailureKind, u64>,

    /// Latency samples for percentile calculation
    latency_samples: Mutex<VecDeque<f64>>,

    /// Maximum samples to keep
    max_samples: usize,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::with_max_samples(10_000)
    }

    pub fn with_max_samples(max_samples: usize) -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            allowed: AtomicU64::new(0),
            passed_through: AtomicU64::new(0),
            rejected: DashMap::new(),
            latency_samples: Mutex::new(VecDeque::with_capacity(max_samples.min(10_000))),
            max_samples: max_samples.max(1),
        }
    }

    pub fn record_allowed(&self, latency: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.allowed.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    pub fn record_pass_through(&self, latency: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.passed_through.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    pub fn record_rejected(&self, kind: FailureKind, latency: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        *self.rejected.entry(kind).or_insert(0) += 1;
        self.record_latency(latency);
    }

    fn record_latency(&self, latency: Duration) {
        let mut samples = self.latency_samples.lock();

        // Keep only recent samples
        if samples.len() >= self.max_samples {
            samples.pop_front();
        }
        samples.push_back(latency.as_secs_f64() * 1000.0);
    }

    /// Current counters with percentiles computed from the retained samples
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut sorted: Vec<f64> = self.latency_samples.lock().iter().copied().collect();
        sorted.sort_by(f64::total_cmp);

        let avg_latency_ms = if sorted.is_empty() {
            0.0
        } else {
            sorted.iter().sum::<f64>() / sorted.len() as f64
        };

        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            allowed: self.allowed.load(Ordering::Relaxed),
            passed_through: self.passed_through.load(Ordering::Relaxed),
            rejected: self
                .rejected
                .iter()
                .map(|entry| (*entry.key(), *entry.value()))
                .collect(),
            latency_p50_ms: percentile(&sorted, 0.50),
            latency_p99_ms: percentile(&sorted, 0.99),
            avg_latency_ms,
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.allowed.store(0, Ordering::Relaxed);
        self.passed_through.store(0, Ordering::Relaxed);
        self.rejected.clear();
        self.latency_samples.lock().clear();
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Percentile from sorted data
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }

    let idx = ((sorted.len() as f64) * p) as usize;
    sorted[idx.min(sorted.len() - 1)]
}
