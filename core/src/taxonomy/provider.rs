use super::cache::TaxonomyCache;
use super::source::SourceChain;
use super::TaxonomySnapshot;
use std::sync::Arc;
use std::time::Duration;

/// Hands out taxonomy snapshots, cheaply on repeated calls.
///
/// Never fails: a broken or empty primary source degrades to the bundled
/// dictionary inside the [`SourceChain`].
pub struct TaxonomyProvider {
    chain: SourceChain,
    cache: TaxonomyCache,
}

impl TaxonomyProvider {
    pub fn new(chain: SourceChain, cache: TaxonomyCache) -> Self {
        Self { chain, cache }
    }

    pub fn with_ttl(chain: SourceChain, ttl: Duration) -> Self {
        Self::new(chain, TaxonomyCache::new(ttl))
    }

    /// Bundled dictionary only, default TTL.
    pub fn static_only() -> Self {
        Self::new(SourceChain::static_only(), TaxonomyCache::default())
    }

    /// Cached snapshot within the TTL, otherwise a synchronous fetch.
    pub fn get_taxonomy(&self) -> Arc<TaxonomySnapshot> {
        if let Some(snapshot) = self.cache.get() {
            return snapshot;
        }

        let snapshot = Arc::new(self.chain.fetch());
        log::debug!(
            "[TaxonomyProvider::get_taxonomy] Cached {} categories from {} ({})",
            snapshot.len(),
            snapshot.origin(),
            &snapshot.fingerprint()[..12]
        );
        self.cache.set(Arc::clone(&snapshot));
        snapshot
    }

    /// Drop the cached snapshot so the next read refetches.
    /// Call after any edit to categories or keywords.
    pub fn invalidate(&self) {
        log::debug!("[TaxonomyProvider::invalidate] Taxonomy cache cleared");
        self.cache.invalidate();
    }

    pub fn cache(&self) -> &TaxonomyCache {
        &self.cache
    }
}
