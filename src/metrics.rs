//! Performance metrics for the index service
//!
//! Lightweight, thread-safe counters with zero cost when disabled: the
//! server only allocates a collector when started with `--metrics`, and
//! handlers skip recording entirely when it is absent.
//!
//! Tracked per-process (not per-index): request volume, cache hit/miss
//! split, index build count and durations, accepted invalidations.
//! Build durations keep a bounded rolling window so memory stays fixed
//! no matter how long the process runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;
use sysinfo::System;

/// Number of recent index build durations retained for averaging.
const BUILD_WINDOW_SIZE: usize = 64;

/// Thread-safe metrics collector.
///
/// Create one per server and share it behind an `Arc`. All fields are
/// atomics except the build-duration window, which takes a short mutex
/// on the (rare) build path only.
pub struct Metrics {
    /// When collection started
    started_at: Instant,

    // ========================================================================
    // Request Counters
    // ========================================================================
    /// Total API requests seen
    requests_total: AtomicU64,

    /// Requests served from the response cache
    cache_hits: AtomicU64,

    /// Requests that triggered an index build
    cache_misses: AtomicU64,

    // ========================================================================
    // Build / Invalidation Counters
    // ========================================================================
    /// Completed index builds
    index_builds: AtomicU64,

    /// Accepted cache invalidations
    invalidations: AtomicU64,

    /// Rolling window of recent build durations (ms)
    build_durations_ms: Mutex<VecDeque<u64>>,
}

/// Point-in-time copy of all metrics, serializable for the stats
/// endpoint. The disabled-metrics response is `Default` (all zeros).
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Seconds since the collector was created
    pub uptime_secs: u64,
    pub requests_total: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub index_builds: u64,
    pub invalidations: u64,
    /// Average build duration over the recent window
    pub build_avg_ms: u64,
    /// Slowest build in the recent window
    pub build_max_ms: u64,
    /// System memory in use, percent
    pub memory_used_percent: f32,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            requests_total: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            index_builds: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            build_durations_ms: Mutex::new(VecDeque::with_capacity(BUILD_WINDOW_SIZE)),
        }
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one completed index build.
    pub fn record_build(&self, duration_ms: u64) {
        self.index_builds.fetch_add(1, Ordering::Relaxed);
        let mut window = self.build_durations_ms.lock().unwrap();
        if window.len() >= BUILD_WINDOW_SIZE {
            window.pop_front();
        }
        window.push_back(duration_ms);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters plus derived build stats.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let (build_avg_ms, build_max_ms) = {
            let window = self.build_durations_ms.lock().unwrap();
            if window.is_empty() {
                (0, 0)
            } else {
                let sum: u64 = window.iter().sum();
                let max = window.iter().copied().max().unwrap_or(0);
                (sum / window.len() as u64, max)
            }
        };

        MetricsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs(),
            requests_total: self.requests_total.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            index_builds: self.index_builds.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            build_avg_ms,
            build_max_ms,
            memory_used_percent: memory_used_percent(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// System memory usage percentage. Returns 0.0 when the platform
/// cannot report totals.
fn memory_used_percent() -> f32 {
    let mut sys = System::new();
    sys.refresh_memory();
    let total = sys.total_memory();
    if total == 0 {
        return 0.0;
    }
    (sys.used_memory() as f64 / total as f64 * 100.0) as f32
}

// ============================================================================
// Unit Tests
// ============================================================================
