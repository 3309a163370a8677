//! Metrics and reporting for cache operations.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Dispatcher counters (thread-safe, cheap to clone).
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    /// Requests that reached the transport
    pub live_fetches: Arc<AtomicU64>,
    /// Requests answered from a recorded response
    pub cache_hits: Arc<AtomicU64>,
    /// Requests that attached to an entry still in flight
    pub joined: Arc<AtomicU64>,
    /// Live requests that ended in ERROR
    pub faults: Arc<AtomicU64>,
    /// Entries invalidated before a mutation
    pub reloads: Arc<AtomicU64>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_live_fetch(&self) {
        self.live_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_join(&self) {
        self.joined.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reload(&self) {
        self.reloads.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            live_fetches: self.live_fetches.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            reloads: self.reloads.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.live_fetches.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.joined.store(0, Ordering::Relaxed);
        self.faults.store(0, Ordering::Relaxed);
        self.reloads.store(0, Ordering::Relaxed);
    }
}

/// Snapshot of metrics (for reporting).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub live_fetches: u64,
    pub cache_hits: u64,
    pub joined: u64,
    pub faults: u64,
    pub reloads: u64,
}

impl MetricsSnapshot {
    pub fn total_requests(&self) -> u64 {
        self.live_fetches + self.cache_hits + self.joined
    }

    /// Share of requests that did not reach the transport.
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        (self.cache_hits + self.joined) as f64 / total as f64
    }

    pub fn fault_rate(&self) -> f64 {
        if self.live_fetches == 0 {
            return 0.0;
        }
        self.faults as f64 / self.live_fetches as f64
    }

    /// Format a human-readable report.
    pub fn format_report(&self) -> String {
        let mut lines = Vec::new();
        lines.push("Request Cache Report".to_string());
        lines.push("=".repeat(40));
        lines.push(format!("  Live fetches:    {}", self.live_fetches));
        lines.push(format!("  Cache hits:      {}", self.cache_hits));
        lines.push(format!("  In-flight joins: {}", self.joined));
        lines.push(format!("  Reloads:         {}", self.reloads));
        lines.push(format!("  Faults:          {}", self.faults));
        lines.push(format!("  Hit Rate:        {:.1}%", self.hit_rate() * 100.0));
        lines.push(format!("  Fault Rate:      {:.1}%", self.fault_rate() * 100.0));
        lines.join("\n")
    }
}
