pub mod activity;
pub mod groups;
pub mod neighbor_cache;
pub mod neighbors;
pub mod profiles;
pub mod recommendations;
pub mod similarity;

pub use neighbor_cache::NeighborCache;
pub use profiles::{InMemoryProfileStore, ProfileSnapshot, ProfileStore};
pub use recommendations::{ActivityQuery, ChildQuery, RecommendationService};
