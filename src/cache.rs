//! Response cache and generation coordination.
//!
//! The coordinator owns two pieces of shared state: the TTL'd edge
//! response cache and the generation marker. The marker is epoch
//! milliseconds, advanced to `max(now, current + 1)` on every accepted
//! invalidation so it strictly increases even for back-to-back calls
//! within one millisecond, and persisted through [`KvStore`] before the
//! invalidation is acknowledged.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::Result;
use crate::kv::KvStore;

/// KV key the generation marker persists under.
pub const GENERATION_KEY: &str = "generation";

/// One cacheable response body with the headers we reconstruct on a hit.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub body: String,
    pub content_type: String,
    pub max_age_secs: u64,
}

/// Edge response cache. Implementations are synchronous; entries are
/// small serialized bodies and all operations are map lookups.
pub trait ResponseCache: Send + Sync {
    fn lookup(&self, key: &str) -> Option<CachedResponse>;
    fn store(&self, key: &str, response: CachedResponse);
    /// Returns whether the key was present. Removing an absent key is
    /// not an error.
    fn remove(&self, key: &str) -> bool;
}

struct CacheSlot {
    response: CachedResponse,
    stored_at: Instant,
}

/// In-process [`ResponseCache`]. Expiry is checked on lookup; a stale
/// slot stays in the map until the next store or purge overwrites it,
/// which is bounded because the key set is the fixed derived-index
/// enumeration.
#[derive(Default)]
pub struct MemoryResponseCache {
    entries: RwLock<HashMap<String, CacheSlot>>,
}

impl ResponseCache for MemoryResponseCache {
    fn lookup(&self, key: &str) -> Option<CachedResponse> {
        let entries = self.entries.read().unwrap();
        let slot = entries.get(key)?;
        if slot.stored_at.elapsed() >= Duration::from_secs(slot.response.max_age_secs) {
            return None;
        }
        Some(slot.response.clone())
    }

    fn store(&self, key: &str, response: CachedResponse) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            key.to_string(),
            CacheSlot {
                response,
                stored_at: Instant::now(),
            },
        );
    }

    fn remove(&self, key: &str) -> bool {
        let mut entries = self.entries.write().unwrap();
        entries.remove(key).is_some()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Shared cache + generation state handed to every request handler.
pub struct CacheCoordinator {
    kv: Box<dyn KvStore>,
    cache: Box<dyn ResponseCache>,
    generation: AtomicU64,
    /// Serializes advance so the persisted marker can never lag behind
    /// a later in-memory value. Reads bypass it via the atomic.
    advance_lock: Mutex<()>,
    derived_keys: Vec<String>,
}

impl CacheCoordinator {
    /// Load the persisted generation marker, defaulting to the current
    /// time when absent or unreadable.
    pub fn new(
        kv: Box<dyn KvStore>,
        cache: Box<dyn ResponseCache>,
        derived_keys: Vec<String>,
    ) -> Result<Self> {
        let generation = match kv.get(GENERATION_KEY)? {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(value) => value,
                Err(_) => {
                    warn!(raw = %raw, "unreadable generation marker, resetting to now");
                    now_ms()
                }
            },
            None => now_ms(),
        };
        debug!(generation, keys = derived_keys.len(), "cache coordinator ready");
        Ok(CacheCoordinator {
            kv,
            cache,
            generation: AtomicU64::new(generation),
            advance_lock: Mutex::new(()),
            derived_keys,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Advance the marker and persist it. The new value is visible to
    /// readers only after the KV write succeeded, so an acknowledged
    /// invalidation always survives a restart.
    pub fn advance_generation(&self) -> Result<u64> {
        let _guard = self.advance_lock.lock().unwrap();
        let next = now_ms().max(self.generation.load(Ordering::Acquire) + 1);
        self.kv.put(GENERATION_KEY, &next.to_string())?;
        self.generation.store(next, Ordering::Release);
        Ok(next)
    }

    pub fn lookup(&self, key: &str) -> Option<CachedResponse> {
        self.cache.lookup(key)
    }

    pub fn store_response(&self, key: &str, response: CachedResponse) {
        self.cache.store(key, response);
    }

    /// Drop every derived-index entry, present or not, and report how
    /// many were actually evicted.
    pub fn purge_derived(&self) -> usize {
        self.derived_keys
            .iter()
            .filter(|key| self.cache.remove(key))
            .count()
    }

    pub fn derived_keys(&self) -> &[String] {
        &self.derived_keys
    }
}

// ============================================================================
// Background cache writes
// ============================================================================

/// Tracks spawned cache-population tasks so shutdown can wait for them
/// instead of dropping writes on the floor.
#[derive(Default)]
pub struct PendingWrites {
    in_flight: AtomicU64,
    drained: Notify,
}

impl PendingWrites {
    /// Store a response off the request path. The task is counted
    /// before it is spawned, so a drain that starts concurrently still
    /// sees it.
    pub fn spawn_write(
        self: &Arc<Self>,
        coordinator: Arc<CacheCoordinator>,
        key: String,
        response: CachedResponse,
    ) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            coordinator.store_response(&key, response);
            if tracker.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
                tracker.drained.notify_waiters();
            }
        });
    }

    /// Wait until every spawned write has landed. Returns immediately
    /// when none are in flight.
    pub async fn drain(&self) {
        loop {
            // Register before checking the counter; a task finishing
            // in between would otherwise notify nobody.
            let notified = self.drained.notified();
            if self.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}
