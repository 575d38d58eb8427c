use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::instrument;

use crate::{
    error::{AppError, AppResult},
    models::{
        months_to_years, ActivityPartner, ActivityRecommendationResponse, ChildId, ChildProfile,
        ChildRecommendationResponse, ChildSummary, Interest, InterestCatalog, InterestCount,
        ModelInfo, NeighborEntry, PartnerRecommendation, RecommendationParameters,
        RecommendationStats,
    },
    services::{
        activity,
        groups::{self, GroupBounds},
        neighbor_cache::NeighborCache,
        neighbors::{take_top_k, NeighborRetriever},
        profiles::{ProfileSnapshot, ProfileStore},
        similarity::{round_similarity, AgedProfile},
    },
};

pub const DEFAULT_K: i64 = 3;
pub const DEFAULT_MIN_GROUP_SIZE: i64 = 2;
pub const DEFAULT_MAX_GROUP_SIZE: i64 = 4;

const ALGORITHM: &str = "k-nearest-neighbors";

/// Raw parameters of a child recommendation query, validated by the service
#[derive(Debug, Clone, Default)]
pub struct ChildQuery {
    pub k: Option<i64>,
    pub min_group_size: Option<i64>,
    pub max_group_size: Option<i64>,
    pub exclude_ids: Vec<ChildId>,
}

/// Raw parameters of an activity partner query
#[derive(Debug, Clone, Default)]
pub struct ActivityQuery {
    pub activity_type: Option<String>,
    pub k: Option<i64>,
}

impl ChildQuery {
    /// Applies defaults and checks bounds without touching any profile
    pub fn validate(&self) -> AppResult<RecommendationParameters> {
        let k = positive("k", self.k, DEFAULT_K)?;
        let min_group_size = positive("minGroupSize", self.min_group_size, DEFAULT_MIN_GROUP_SIZE)?;
        let max_group_size = positive("maxGroupSize", self.max_group_size, DEFAULT_MAX_GROUP_SIZE)?;

        if min_group_size > max_group_size {
            tracing::warn!(min_group_size, max_group_size, "Rejected group bounds");
            return Err(AppError::validation(
                "minGroupSize",
                "must not exceed maxGroupSize",
            ));
        }

        Ok(RecommendationParameters {
            k,
            min_group_size,
            max_group_size,
        })
    }
}

impl ActivityQuery {
    /// Returns the trimmed activity tag and the effective `k`
    pub fn validate(&self) -> AppResult<(String, usize)> {
        let activity_type = match self.activity_type.as_deref().map(str::trim) {
            Some(tag) if !tag.is_empty() => tag.to_string(),
            _ => {
                tracing::warn!("Activity query without activity type");
                return Err(AppError::validation(
                    "activityType",
                    "activity type is required",
                ));
            }
        };
        let k = positive("k", self.k, DEFAULT_K)?;
        Ok((activity_type, k))
    }
}

/// Entry point of the recommendation engine
///
/// Validates parameters, resolves the target child against a profile
/// snapshot and composes the retriever, group assembler and activity matcher.
/// It holds no ranking logic of its own.
#[derive(Clone)]
pub struct RecommendationService {
    store: Arc<dyn ProfileStore>,
    cache: Arc<NeighborCache>,
    retriever: NeighborRetriever,
}

impl RecommendationService {
    pub fn new(store: Arc<dyn ProfileStore>, cache: Arc<NeighborCache>) -> Self {
        Self {
            store,
            retriever: NeighborRetriever::new(Arc::clone(&cache)),
            cache,
        }
    }

    /// Individual partners and playgroups for one child
    #[instrument(skip_all, fields(child_id = %child_id))]
    pub async fn recommend_for_child(
        &self,
        child_id: ChildId,
        query: ChildQuery,
        as_of: NaiveDate,
    ) -> AppResult<ChildRecommendationResponse> {
        let parameters = query.validate()?;
        let snapshot = self.store.snapshot().await?;
        let target = resolve_target(&snapshot, &child_id, as_of)?;

        let pool = self.retriever.ranked_pool(&snapshot, &target, as_of);
        let excluded: HashSet<ChildId> = query.exclude_ids.iter().copied().collect();
        let eligible: Vec<NeighborEntry> = pool
            .iter()
            .filter(|entry| !excluded.contains(&entry.candidate_id))
            .copied()
            .collect();

        let individual_partners = take_top_k(&eligible, parameters.k)
            .iter()
            .filter_map(|entry| partner(&snapshot, &target, entry, as_of))
            .collect::<Vec<_>>();

        let recommended_groups = groups::build_groups(
            &target,
            &eligible,
            GroupBounds::new(parameters.min_group_size, parameters.max_group_size),
            &snapshot,
            as_of,
        );

        tracing::info!(
            version = snapshot.version(),
            pool = eligible.len(),
            partners = individual_partners.len(),
            groups = recommended_groups.len(),
            "Child recommendations computed"
        );

        Ok(ChildRecommendationResponse {
            target_child: ChildSummary::from_profile(target.profile, target.age_months),
            recommended_groups,
            individual_partners,
            model_info: ModelInfo {
                algorithm: ALGORITHM,
                parameters,
                profile_set_version: snapshot.version(),
            },
        })
    }

    /// Children who share one activity with the target, best matches first
    #[instrument(skip_all, fields(child_id = %child_id))]
    pub async fn recommend_activity_partners(
        &self,
        child_id: ChildId,
        query: ActivityQuery,
        as_of: NaiveDate,
    ) -> AppResult<ActivityRecommendationResponse> {
        let (activity_type, k) = query.validate()?;

        let snapshot = self.store.snapshot().await?;
        let target = resolve_target(&snapshot, &child_id, as_of)?;
        let pool = self.retriever.ranked_pool(&snapshot, &target, as_of);
        let matches = activity::match_by_activity(&pool, &snapshot, &activity_type, k);

        let activity_partners: Vec<ActivityPartner> = matches
            .partners
            .iter()
            .filter_map(|entry| {
                let candidate = snapshot.aged(&entry.candidate_id, as_of)?;
                Some(ActivityPartner {
                    id: candidate.profile.id,
                    name: candidate.profile.display_name(),
                    age: months_to_years(candidate.age_months),
                    program: candidate.profile.program,
                    similarity: round_similarity(entry.score),
                    age_difference_months: target.age_gap_months(&candidate),
                    interests: candidate.profile.interests.clone(),
                })
            })
            .collect();

        tracing::info!(
            activity_type = %activity_type,
            total_matches = matches.total_matches,
            returned = activity_partners.len(),
            "Activity partners computed"
        );

        Ok(ActivityRecommendationResponse {
            target_child: ChildSummary::from_profile(target.profile, target.age_months),
            activity_type,
            total_matches: matches.total_matches,
            activity_partners,
        })
    }

    /// Every active child, sorted by first name then id
    pub async fn active_children(&self, as_of: NaiveDate) -> AppResult<Vec<ChildSummary>> {
        let snapshot = self.store.snapshot().await?;
        let mut profiles: Vec<&ChildProfile> = snapshot.active_profiles().collect();
        profiles.sort_by(|a, b| {
            a.first_name
                .cmp(&b.first_name)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(profiles
            .into_iter()
            .map(|p| ChildSummary::from_profile(p, p.age_in_months(as_of)))
            .collect())
    }

    pub fn interest_catalog(&self) -> InterestCatalog {
        InterestCatalog::build()
    }

    /// Interest coverage of the active population plus cache occupancy
    pub async fn stats(&self) -> AppResult<RecommendationStats> {
        let snapshot = self.store.snapshot().await?;

        let mut total_children = 0;
        let mut children_with_interests = 0;
        let mut counts: BTreeMap<Interest, usize> = BTreeMap::new();
        for profile in snapshot.active_profiles() {
            total_children += 1;
            if !profile.interests.is_empty() {
                children_with_interests += 1;
            }
            for interest in &profile.interests {
                *counts.entry(*interest).or_default() += 1;
            }
        }

        let mut interest_distribution: Vec<InterestCount> = counts
            .into_iter()
            .map(|(interest, count)| InterestCount { interest, count })
            .collect();
        interest_distribution.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.interest.as_str().cmp(b.interest.as_str()))
        });

        let interest_coverage = if total_children == 0 {
            0
        } else {
            ((children_with_interests as f64 / total_children as f64) * 100.0).round() as u32
        };

        Ok(RecommendationStats {
            total_children,
            children_with_interests,
            interest_coverage,
            interest_distribution,
            cache: self.cache.stats(),
            profile_set_version: snapshot.version(),
        })
    }
}

fn resolve_target<'a>(
    snapshot: &'a ProfileSnapshot,
    child_id: &ChildId,
    as_of: NaiveDate,
) -> AppResult<AgedProfile<'a>> {
    snapshot
        .aged(child_id, as_of)
        .ok_or_else(|| AppError::NotFound(format!("Child {} not found", child_id)))
}

fn partner(
    snapshot: &ProfileSnapshot,
    target: &AgedProfile<'_>,
    entry: &NeighborEntry,
    as_of: NaiveDate,
) -> Option<PartnerRecommendation> {
    let candidate = snapshot.aged(&entry.candidate_id, as_of)?;
    let gap = target.age_gap_months(&candidate);
    Some(PartnerRecommendation {
        id: candidate.profile.id,
        name: candidate.profile.display_name(),
        age: months_to_years(candidate.age_months),
        program: candidate.profile.program,
        age_difference: months_to_years(gap),
        age_difference_months: gap,
        similarity: round_similarity(entry.score),
        interests: candidate.profile.interests.clone(),
    })
}

fn positive(field: &'static str, value: Option<i64>, default: i64) -> AppResult<usize> {
    let value = value.unwrap_or(default);
    if value < 1 {
        tracing::warn!(field, value, "Rejected non-positive parameter");
        return Err(AppError::validation(field, "must be a positive integer"));
    }
    usize::try_from(value).map_err(|_| AppError::validation(field, "is too large"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChildProfile, Program};
    use crate::services::profiles::{InMemoryProfileStore, MockProfileStore};
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn child(n: u128, age_months: u32, interests: &[Interest]) -> ChildProfile {
        let total = 2024 * 12 + 5 - age_months as i32;
        let dob = NaiveDate::from_ymd_opt(total / 12, (total % 12) as u32 + 1, 1).unwrap();
        let mut p = ChildProfile::new("Kid", format!("{:02}", n), dob, Program::Preschool)
            .with_interests(interests.iter().copied());
        p.id = Uuid::from_u128(n);
        p
    }

    fn service_with(profiles: Vec<ChildProfile>) -> (RecommendationService, Arc<InMemoryProfileStore>) {
        let store = Arc::new(InMemoryProfileStore::from_profiles(profiles));
        let service = RecommendationService::new(store.clone(), Arc::new(NeighborCache::new(32)));
        (service, store)
    }

    fn id(n: u128) -> ChildId {
        Uuid::from_u128(n)
    }

    #[tokio::test]
    async fn test_defaults_are_applied() {
        let (service, _) = service_with(vec![child(1, 36, &[]), child(2, 36, &[])]);
        let response = service
            .recommend_for_child(id(1), ChildQuery::default(), as_of())
            .await
            .unwrap();

        assert_eq!(
            response.model_info.parameters,
            RecommendationParameters {
                k: 3,
                min_group_size: 2,
                max_group_size: 4
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_parameters_are_rejected() {
        let (service, _) = service_with(vec![child(1, 36, &[])]);

        let cases = [
            (ChildQuery { k: Some(0), ..Default::default() }, "k"),
            (ChildQuery { k: Some(-2), ..Default::default() }, "k"),
            (ChildQuery { min_group_size: Some(0), ..Default::default() }, "minGroupSize"),
            (
                ChildQuery {
                    min_group_size: Some(5),
                    max_group_size: Some(3),
                    ..Default::default()
                },
                "minGroupSize",
            ),
        ];

        for (query, expected) in cases {
            let err = service
                .recommend_for_child(id(1), query, as_of())
                .await
                .unwrap_err();
            match err {
                AppError::Validation { field, .. } => assert_eq!(field, expected),
                other => panic!("expected validation error, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_validation_precedes_lookup() {
        let (service, _) = service_with(vec![]);
        let err = service
            .recommend_for_child(id(99), ChildQuery { k: Some(0), ..Default::default() }, as_of())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_unknown_or_inactive_target_is_not_found() {
        let mut inactive = child(2, 36, &[]);
        inactive.active = false;
        let (service, _) = service_with(vec![child(1, 36, &[]), inactive]);

        for target in [id(2), id(3)] {
            let err = service
                .recommend_for_child(target, ChildQuery::default(), as_of())
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::NotFound(_)));
        }
    }

    #[tokio::test]
    async fn test_single_peer_gets_partner_but_no_group() {
        let (service, _) = service_with(vec![child(1, 36, &[]), child(2, 40, &[])]);
        let response = service
            .recommend_for_child(id(1), ChildQuery::default(), as_of())
            .await
            .unwrap();

        assert!(response.recommended_groups.is_empty());
        assert_eq!(response.individual_partners.len(), 1);
        assert_eq!(response.individual_partners[0].age_difference_months, 4);
    }

    #[tokio::test]
    async fn test_k_beyond_population_is_truncated() {
        let (service, _) = service_with((1..=4).map(|n| child(n, 36, &[])).collect());
        let response = service
            .recommend_for_child(id(1), ChildQuery { k: Some(5), ..Default::default() }, as_of())
            .await
            .unwrap();

        assert_eq!(response.individual_partners.len(), 3);
    }

    #[tokio::test]
    async fn test_groups_use_full_pool_not_top_k() {
        let (service, _) = service_with((1..=7).map(|n| child(n, 36, &[])).collect());
        let response = service
            .recommend_for_child(id(1), ChildQuery { k: Some(1), ..Default::default() }, as_of())
            .await
            .unwrap();

        assert_eq!(response.individual_partners.len(), 1);
        let grouped: usize = response
            .recommended_groups
            .iter()
            .map(|g| g.candidates().count())
            .sum();
        assert_eq!(grouped, 6);
    }

    #[tokio::test]
    async fn test_excluded_children_are_skipped() {
        let (service, _) = service_with((1..=4).map(|n| child(n, 36, &[])).collect());
        let response = service
            .recommend_for_child(
                id(1),
                ChildQuery {
                    exclude_ids: vec![id(2)],
                    ..Default::default()
                },
                as_of(),
            )
            .await
            .unwrap();

        let ids: Vec<ChildId> = response.individual_partners.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![id(3), id(4)]);
        assert!(response
            .recommended_groups
            .iter()
            .all(|g| g.members.iter().all(|m| m.id != id(2))));
    }

    #[tokio::test]
    async fn test_profile_change_is_visible_immediately() {
        let (service, store) = service_with(vec![
            child(1, 36, &[Interest::Music]),
            child(2, 36, &[Interest::Music]),
            child(3, 36, &[Interest::Sports]),
        ]);

        let before = service
            .recommend_for_child(id(1), ChildQuery::default(), as_of())
            .await
            .unwrap();
        assert_eq!(before.individual_partners[0].id, id(2));

        store
            .update_interests(id(3), BTreeSet::from([Interest::Music]))
            .await
            .unwrap();
        store.set_active(id(2), false).await.unwrap();

        let after = service
            .recommend_for_child(id(1), ChildQuery::default(), as_of())
            .await
            .unwrap();
        let ids: Vec<ChildId> = after.individual_partners.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![id(3)]);
        assert!(after.model_info.profile_set_version > before.model_info.profile_set_version);
    }

    #[tokio::test]
    async fn test_activity_partners() {
        let (service, _) = service_with(vec![
            child(1, 36, &[Interest::Drawing]),
            child(2, 36, &[Interest::Drawing]),
            child(3, 48, &[Interest::Drawing, Interest::Music]),
            child(4, 36, &[Interest::Music]),
        ]);

        let response = service
            .recommend_activity_partners(
                id(1),
                ActivityQuery {
                    activity_type: Some("drawing".to_string()),
                    k: Some(1),
                },
                as_of(),
            )
            .await
            .unwrap();

        assert_eq!(response.total_matches, 2);
        assert_eq!(response.activity_partners.len(), 1);
        assert_eq!(response.activity_partners[0].id, id(2));
        assert_eq!(response.activity_type, "drawing");
    }

    #[tokio::test]
    async fn test_activity_without_matches_is_empty_success() {
        let (service, _) = service_with(vec![
            child(1, 36, &[Interest::Swimming]),
            child(2, 36, &[Interest::Music]),
        ]);

        for tag in ["swimming", "skydiving"] {
            let response = service
                .recommend_activity_partners(
                    id(1),
                    ActivityQuery {
                        activity_type: Some(tag.to_string()),
                        k: None,
                    },
                    as_of(),
                )
                .await
                .unwrap();
            assert_eq!(response.total_matches, 0);
            assert!(response.activity_partners.is_empty());
        }
    }

    #[tokio::test]
    async fn test_activity_type_is_required() {
        let (service, _) = service_with(vec![child(1, 36, &[])]);
        let err = service
            .recommend_activity_partners(
                id(1),
                ActivityQuery {
                    activity_type: Some("  ".to_string()),
                    k: None,
                },
                as_of(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation { field: "activityType", .. }));
    }

    #[tokio::test]
    async fn test_stats_summarize_population() {
        let (service, _) = service_with(vec![
            child(1, 36, &[Interest::Music, Interest::Drawing]),
            child(2, 36, &[Interest::Music]),
            child(3, 36, &[]),
            child(4, 36, &[]),
        ]);

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.total_children, 4);
        assert_eq!(stats.children_with_interests, 2);
        assert_eq!(stats.interest_coverage, 50);
        assert_eq!(
            stats.interest_distribution,
            vec![
                InterestCount { interest: Interest::Music, count: 2 },
                InterestCount { interest: Interest::Drawing, count: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_active_children_sorted_by_name() {
        let (service, _) = service_with(vec![child(3, 36, &[]), child(1, 30, &[]), child(2, 50, &[])]);
        let children = service.active_children(as_of()).await.unwrap();
        let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Kid 01", "Kid 02", "Kid 03"]);
        assert_eq!(children[1].age, 4);
    }

    #[tokio::test]
    async fn test_shared_first_names_are_ordered_by_id() {
        let named = |n: u128, first: &str, last: &str| {
            let mut p = child(n, 36, &[]);
            p.first_name = first.to_string();
            p.last_name = last.to_string();
            p
        };
        let (service, _) = service_with(vec![
            named(3, "Ava", "Moss"),
            named(1, "Emma", "Zed"),
            named(2, "Emma", "Abe"),
        ]);

        let children = service.active_children(as_of()).await.unwrap();
        let ids: Vec<ChildId> = children.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![id(3), id(1), id(2)]);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_internal_error() {
        let mut store = MockProfileStore::new();
        store
            .expect_snapshot()
            .returning(|| Err(AppError::Internal("profile store unavailable".to_string())));
        let service = RecommendationService::new(Arc::new(store), Arc::new(NeighborCache::new(4)));

        let err = service
            .recommend_for_child(id(1), ChildQuery::default(), as_of())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
