use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use super::child::{months_to_years, ChildId, ChildProfile, Interest, InterestCategory, Program};

/// A candidate and its similarity to some target child
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborEntry {
    pub candidate_id: ChildId,
    pub score: f64,
}

impl NeighborEntry {
    pub fn new(candidate_id: ChildId, score: f64) -> Self {
        Self {
            candidate_id,
            score,
        }
    }

    /// Ranking order: higher score first, ties broken by ascending candidate id
    pub fn ranking_order(a: &NeighborEntry, b: &NeighborEntry) -> Ordering {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.candidate_id.cmp(&b.candidate_id))
    }
}

/// Candidates for one target, ordered by [`NeighborEntry::ranking_order`]
pub type NeighborList = Vec<NeighborEntry>;

/// Inclusive age span of a group, in months
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AgeRange {
    pub min: u32,
    pub max: u32,
}

/// One child inside a recommended group
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub id: ChildId,
    pub name: String,
    pub age: u32,
    pub age_months: u32,
    pub program: Program,
    pub interests: BTreeSet<Interest>,
    /// Similarity to the target child; absent on the target itself
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    pub is_target: bool,
}

/// A bounded-size playgroup anchored on the target child
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecommendation {
    pub group_id: String,
    pub members: Vec<GroupMember>,
    pub average_similarity: f64,
    pub age_range_months: AgeRange,
    pub common_interests: BTreeSet<Interest>,
    pub group_size: usize,
}

impl GroupRecommendation {
    /// Members other than the target child
    pub fn candidates(&self) -> impl Iterator<Item = &GroupMember> {
        self.members.iter().filter(|m| !m.is_target)
    }
}

/// Display summary of a child
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildSummary {
    pub id: ChildId,
    pub name: String,
    pub age: u32,
    pub age_months: u32,
    pub program: Program,
    pub interests: BTreeSet<Interest>,
}

impl ChildSummary {
    pub fn from_profile(profile: &ChildProfile, age_months: u32) -> Self {
        Self {
            id: profile.id,
            name: profile.display_name(),
            age: months_to_years(age_months),
            age_months,
            program: profile.program,
            interests: profile.interests.clone(),
        }
    }
}

/// One suggested individual play partner
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerRecommendation {
    pub id: ChildId,
    pub name: String,
    pub age: u32,
    pub program: Program,
    /// Absolute age gap in whole years
    pub age_difference: u32,
    pub age_difference_months: u32,
    pub similarity: f64,
    pub interests: BTreeSet<Interest>,
}

/// One suggested partner for a specific activity
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPartner {
    pub id: ChildId,
    pub name: String,
    pub age: u32,
    pub program: Program,
    pub similarity: f64,
    pub age_difference_months: u32,
    pub interests: BTreeSet<Interest>,
}

/// Effective parameters a child recommendation was computed with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationParameters {
    pub k: usize,
    pub min_group_size: usize,
    pub max_group_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub algorithm: &'static str,
    pub parameters: RecommendationParameters,
    pub profile_set_version: u64,
}

/// Response for the child recommendation query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildRecommendationResponse {
    pub target_child: ChildSummary,
    pub recommended_groups: Vec<GroupRecommendation>,
    pub individual_partners: Vec<PartnerRecommendation>,
    pub model_info: ModelInfo,
}

/// Response for the activity partner query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecommendationResponse {
    pub target_child: ChildSummary,
    pub activity_type: String,
    pub total_matches: usize,
    pub activity_partners: Vec<ActivityPartner>,
}

/// The interest vocabulary, flat and by category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterestCatalog {
    pub interests: Vec<Interest>,
    pub categories: BTreeMap<InterestCategory, Vec<Interest>>,
}

impl InterestCatalog {
    pub fn build() -> Self {
        let mut categories: BTreeMap<InterestCategory, Vec<Interest>> = BTreeMap::new();
        for interest in Interest::ALL {
            categories
                .entry(interest.category())
                .or_default()
                .push(interest);
        }

        Self {
            interests: Interest::ALL.to_vec(),
            categories,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterestCount {
    pub interest: Interest,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
}

/// Population statistics over active children
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationStats {
    pub total_children: usize,
    pub children_with_interests: usize,
    /// Percentage of active children with at least one interest
    pub interest_coverage: u32,
    pub interest_distribution: Vec<InterestCount>,
    pub cache: CacheStats,
    pub profile_set_version: u64,
}
