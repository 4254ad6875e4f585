use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Outcome of a rate-limited request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Admitted,
    Rejected,
    Whitelisted,
    StoreError,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleMetrics {
    pub total_requests: u64,
    pub allowed_requests: u64,
    pub throttled_requests: u64,
    pub whitelisted_requests: u64,
    pub store_errors: u64,
    pub last_reset: u64,
}

/// Decision counts of this instance.
///
/// Lock-free and fixed size; counts are observability only and never feed
/// back into admission decisions.
#[derive(Debug)]
pub struct MetricsCollector {
    total: AtomicU64,
    allowed: AtomicU64,
    throttled: AtomicU64,
    whitelisted: AtomicU64,
    store_errors: AtomicU64,
    started: u64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            total: AtomicU64::new(0),
            allowed: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
            whitelisted: AtomicU64::new(0),
            store_errors: AtomicU64::new(0),
            started: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: Outcome) {
        self.total.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            Outcome::Admitted => &self.allowed,
            Outcome::Rejected => &self.throttled,
            Outcome::Whitelisted => &self.whitelisted,
            Outcome::StoreError => &self.store_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ThrottleMetrics {
        ThrottleMetrics {
            total_requests: self.total.load(Ordering::Relaxed),
            allowed_requests: self.allowed.load(Ordering::Relaxed),
            throttled_requests: self.throttled.load(Ordering::Relaxed),
            whitelisted_requests: self.whitelisted.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            last_reset: self.started,
        }
    }
}
