use chrono::NaiveDate;
use std::sync::Arc;

use crate::{
    models::{ChildId, NeighborEntry, NeighborList},
    services::{
        neighbor_cache::{CacheEpoch, NeighborCache},
        profiles::ProfileSnapshot,
        similarity::{self, AgedProfile},
    },
};

/// Scores every candidate against the target and sorts by ranking order.
/// The target itself is skipped if present among the candidates.
pub fn rank_candidates<'a>(
    target: &AgedProfile<'_>,
    candidates: impl IntoIterator<Item = AgedProfile<'a>>,
) -> NeighborList {
    let mut ranked: NeighborList = candidates
        .into_iter()
        .filter(|c| c.profile.id != target.profile.id)
        .map(|c| NeighborEntry::new(c.profile.id, similarity::score(target, &c)))
        .collect();
    ranked.sort_by(NeighborEntry::ranking_order);
    ranked
}

/// Finds the children most similar to a target, backed by the neighbor cache
#[derive(Clone)]
pub struct NeighborRetriever {
    cache: Arc<NeighborCache>,
}

impl NeighborRetriever {
    pub fn new(cache: Arc<NeighborCache>) -> Self {
        Self { cache }
    }

    /// Full ranking of every other active child, shared with the cache
    pub fn ranked_pool(
        &self,
        snapshot: &ProfileSnapshot,
        target: &AgedProfile<'_>,
        as_of: NaiveDate,
    ) -> Arc<NeighborList> {
        let epoch = CacheEpoch::new(snapshot.version(), as_of);
        self.cache.get_or_compute(epoch, target.profile.id, || {
            rank_candidates(
                target,
                snapshot.active_profiles().map(|p| AgedProfile::new(p, as_of)),
            )
        })
    }

    /// The `k` best candidates for `target_id`.
    ///
    /// Returns fewer than `k` entries when fewer candidates exist, and an empty
    /// list when the target is not an active child.
    pub fn top_k(
        &self,
        snapshot: &ProfileSnapshot,
        target_id: &ChildId,
        k: usize,
        as_of: NaiveDate,
    ) -> NeighborList {
        match snapshot.aged(target_id, as_of) {
            Some(target) => take_top_k(&self.ranked_pool(snapshot, &target, as_of), k),
            None => Vec::new(),
        }
    }
}

/// First `min(k, pool.len())` entries of an already ranked pool
pub fn take_top_k(pool: &[NeighborEntry], k: usize) -> NeighborList {
    pool.iter().take(k).copied().collect()
}
