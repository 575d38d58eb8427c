use chrono::NaiveDate;
use lru::LruCache;
use std::fmt::Display;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::{CacheStats, ChildId, NeighborList};

/// Validity window of cached rankings.
///
/// Ages are derived per day, so a new day is handled exactly like a new
/// profile-set version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheEpoch {
    pub version: u64,
    pub as_of: NaiveDate,
}

impl CacheEpoch {
    pub fn new(version: u64, as_of: NaiveDate) -> Self {
        Self { version, as_of }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub version: u64,
    pub target_id: ChildId,
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "neighbors:v{}:{}", self.version, self.target_id)
    }
}

struct CacheState {
    epoch: Option<CacheEpoch>,
    entries: LruCache<CacheKey, Arc<NeighborList>>,
}

enum Admission {
    Current,
    Stale,
}

/// Bounded LRU cache of full per-child neighbor rankings
///
/// Entries are only valid for the epoch they were computed under. The first
/// access carrying a newer epoch drops every entry; accesses carrying an older
/// epoch bypass the cache entirely.
pub struct NeighborCache {
    state: Mutex<CacheState>,
    capacity: NonZeroUsize,
}

impl NeighborCache {
    /// Creates a cache holding at most `capacity` rankings (minimum one)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                epoch: None,
                entries: LruCache::new(capacity),
            }),
            capacity,
        }
    }

    /// Returns the ranking for `target_id`, computing and storing it on a miss
    ///
    /// `compute` runs outside the lock. When two callers miss on the same key
    /// concurrently, both compute and the first one to store wins.
    pub fn get_or_compute<F>(&self, epoch: CacheEpoch, target_id: ChildId, compute: F) -> Arc<NeighborList>
    where
        F: FnOnce() -> NeighborList,
    {
        let key = CacheKey {
            version: epoch.version,
            target_id,
        };

        {
            let mut state = self.lock();
            match Self::admit(&mut state, epoch) {
                Admission::Current => {
                    if let Some(hit) = state.entries.get(&key) {
                        tracing::debug!(key = %key, "Neighbor cache hit");
                        return Arc::clone(hit);
                    }
                }
                Admission::Stale => {
                    drop(state);
                    tracing::debug!(key = %key, "Stale epoch, computing without caching");
                    return Arc::new(compute());
                }
            }
        }

        tracing::debug!(key = %key, "Neighbor cache miss");
        let computed = Arc::new(compute());

        let mut state = self.lock();
        if state.epoch != Some(epoch) {
            return computed;
        }
        if let Some(existing) = state.entries.get(&key) {
            return Arc::clone(existing);
        }
        state.entries.put(key, Arc::clone(&computed));
        computed
    }

    /// Number of rankings currently held
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.capacity(),
        }
    }

    /// Epoch the stored rankings belong to, if any
    pub fn epoch(&self) -> Option<CacheEpoch> {
        self.lock().epoch
    }

    /// Drops every entry
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    fn admit(state: &mut CacheState, epoch: CacheEpoch) -> Admission {
        match state.epoch {
            Some(current) if current == epoch => Admission::Current,
            Some(current) if current > epoch => Admission::Stale,
            previous => {
                if !state.entries.is_empty() {
                    tracing::debug!(
                        previous = ?previous,
                        current = ?epoch,
                        dropped = state.entries.len(),
                        "Neighbor cache invalidated"
                    );
                }
                state.entries.clear();
                state.epoch = Some(epoch);
                Admission::Current
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NeighborEntry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn ranking(n: u128) -> NeighborList {
        vec![NeighborEntry::new(Uuid::from_u128(n), 0.5)]
    }

    #[test]
    fn test_cache_key_display() {
        let key = CacheKey {
            version: 3,
            target_id: Uuid::from_u128(1),
        };
        assert_eq!(
            format!("{}", key),
            "neighbors:v3:00000000-0000-0000-0000-000000000001"
        );
    }

    #[test]
    fn test_hit_returns_stored_ranking() {
        let cache = NeighborCache::new(8);
        let epoch = CacheEpoch::new(1, day(1));
        let calls = AtomicUsize::new(0);

        let first = cache.get_or_compute(epoch, Uuid::from_u128(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            ranking(2)
        });
        let second = cache.get_or_compute(epoch, Uuid::from_u128(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            ranking(3)
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_version_bump_drops_all_entries() {
        let cache = NeighborCache::new(8);
        let v1 = CacheEpoch::new(1, day(1));
        cache.get_or_compute(v1, Uuid::from_u128(1), || ranking(2));
        cache.get_or_compute(v1, Uuid::from_u128(2), || ranking(1));
        assert_eq!(cache.len(), 2);

        let v2 = CacheEpoch::new(2, day(1));
        let fresh = cache.get_or_compute(v2, Uuid::from_u128(1), || ranking(9));

        assert_eq!(fresh[0].candidate_id, Uuid::from_u128(9));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.epoch(), Some(v2));
    }

    #[test]
    fn test_new_day_invalidates() {
        let cache = NeighborCache::new(8);
        cache.get_or_compute(CacheEpoch::new(1, day(1)), Uuid::from_u128(1), || ranking(2));

        let next_day = cache.get_or_compute(CacheEpoch::new(1, day(2)), Uuid::from_u128(1), || {
            ranking(5)
        });

        assert_eq!(next_day[0].candidate_id, Uuid::from_u128(5));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_stale_epoch_bypasses_cache() {
        let cache = NeighborCache::new(8);
        let v2 = CacheEpoch::new(2, day(1));
        cache.get_or_compute(v2, Uuid::from_u128(1), || ranking(2));

        let stale = cache.get_or_compute(CacheEpoch::new(1, day(1)), Uuid::from_u128(1), || {
            ranking(7)
        });

        assert_eq!(stale[0].candidate_id, Uuid::from_u128(7));
        assert_eq!(cache.epoch(), Some(v2));
        let current = cache.get_or_compute(v2, Uuid::from_u128(1), || ranking(8));
        assert_eq!(current[0].candidate_id, Uuid::from_u128(2));
    }

    #[test]
    fn test_least_recently_used_entry_is_evicted() {
        let cache = NeighborCache::new(2);
        let epoch = CacheEpoch::new(1, day(1));
        cache.get_or_compute(epoch, Uuid::from_u128(1), || ranking(10));
        cache.get_or_compute(epoch, Uuid::from_u128(2), || ranking(20));
        // touch 1 so that 2 becomes the eviction candidate
        cache.get_or_compute(epoch, Uuid::from_u128(1), || ranking(11));
        cache.get_or_compute(epoch, Uuid::from_u128(3), || ranking(30));

        assert_eq!(cache.len(), 2);
        let one = cache.get_or_compute(epoch, Uuid::from_u128(1), || ranking(12));
        assert_eq!(one[0].candidate_id, Uuid::from_u128(10));
        let two = cache.get_or_compute(epoch, Uuid::from_u128(2), || ranking(21));
        assert_eq!(two[0].candidate_id, Uuid::from_u128(21));
    }

    #[test]
    fn test_clear_forces_recompute_within_epoch() {
        let cache = NeighborCache::new(8);
        let epoch = CacheEpoch::new(1, day(1));
        cache.get_or_compute(epoch, Uuid::from_u128(1), || ranking(2));
        cache.get_or_compute(epoch, Uuid::from_u128(2), || ranking(1));

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.epoch(), Some(epoch));

        let recomputed = cache.get_or_compute(epoch, Uuid::from_u128(1), || ranking(6));
        assert_eq!(recomputed[0].candidate_id, Uuid::from_u128(6));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = NeighborCache::new(0);
        assert_eq!(cache.capacity(), 1);
    }

    #[test]
    fn test_concurrent_misses_agree() {
        let cache = NeighborCache::new(8);
        let epoch = CacheEpoch::new(1, day(1));

        let results: Vec<Arc<NeighborList>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| cache.get_or_compute(epoch, Uuid::from_u128(1), || ranking(4))))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.iter().all(|r| r[0].candidate_id == Uuid::from_u128(4)));
        assert_eq!(cache.len(), 1);
    }
}
