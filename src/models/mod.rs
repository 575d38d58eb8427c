pub mod child;
pub mod recommendation;

pub use child::{
    months_to_years, ChildId, ChildProfile, Interest, InterestCategory, Program, UnknownInterest,
};
pub use recommendation::{
    ActivityPartner, ActivityRecommendationResponse, AgeRange, CacheStats, ChildRecommendationResponse,
    ChildSummary, GroupMember, GroupRecommendation, InterestCatalog, InterestCount, ModelInfo, NeighborEntry,
    NeighborList, PartnerRecommendation, RecommendationParameters, RecommendationStats,
};
