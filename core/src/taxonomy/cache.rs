//! Single-slot, TTL-bounded snapshot cache.
//!
//! The slot is process-wide for whoever owns the cache and is keyed by
//! nothing. Concurrent misses are not deduplicated: each caller may fetch and
//! the last `set` wins.

use super::TaxonomySnapshot;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Default freshness window.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

struct CachedTaxonomy {
    snapshot: Arc<TaxonomySnapshot>,
    fetched_at: Instant,
}

pub struct TaxonomyCache {
    ttl: Duration,
    slot: Mutex<Option<CachedTaxonomy>>,
}

impl Default for TaxonomyCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl TaxonomyCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached snapshot, if one was stored within the TTL.
    pub fn get(&self) -> Option<Arc<TaxonomySnapshot>> {
        let slot = self.lock();
        slot.as_ref()
            .filter(|cached| cached.fetched_at.elapsed() < self.ttl)
            .map(|cached| Arc::clone(&cached.snapshot))
    }

    pub fn set(&self, snapshot: Arc<TaxonomySnapshot>) {
        *self.lock() = Some(CachedTaxonomy {
            snapshot,
            fetched_at: Instant::now(),
        });
    }

    pub fn invalidate(&self) {
        *self.lock() = None;
    }

    // The slot holds plain data, so a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, Option<CachedTaxonomy>> {
        self.slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
