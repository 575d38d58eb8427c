use std::sync::Arc;

use crate::{
    config::Config,
    models::ChildProfile,
    services::{InMemoryProfileStore, NeighborCache, RecommendationService},
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub recommendations: RecommendationService,
    pub profiles: Arc<InMemoryProfileStore>,
}

impl AppState {
    /// Wires the recommendation engine to a profile store
    pub fn new(profiles: Arc<InMemoryProfileStore>, config: &Config) -> Self {
        let cache = Arc::new(NeighborCache::new(config.neighbor_cache_capacity));
        Self {
            recommendations: RecommendationService::new(profiles.clone(), cache),
            profiles,
        }
    }

    /// State over a fresh store seeded with `profiles` and default settings
    pub fn from_profiles(profiles: impl IntoIterator<Item = ChildProfile>) -> Self {
        Self::new(
            Arc::new(InMemoryProfileStore::from_profiles(profiles)),
            &Config::default(),
        )
    }
}
