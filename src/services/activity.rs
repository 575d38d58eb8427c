use crate::{
    models::{Interest, NeighborEntry, NeighborList},
    services::profiles::ProfileSnapshot,
};

/// Candidates sharing one activity, best matches first
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityMatches {
    pub partners: NeighborList,
    /// Size of the filtered set before truncation to `k`
    pub total_matches: usize,
}

impl ActivityMatches {
    fn none() -> Self {
        Self {
            partners: Vec::new(),
            total_matches: 0,
        }
    }
}

/// Filters a target's ranked pool down to children interested in `activity_tag`.
///
/// Tags outside the interest vocabulary simply match nobody.
pub fn match_by_activity(
    pool: &[NeighborEntry],
    snapshot: &ProfileSnapshot,
    activity_tag: &str,
    k: usize,
) -> ActivityMatches {
    let Ok(activity) = activity_tag.parse::<Interest>() else {
        tracing::debug!(activity_tag, "Activity outside interest vocabulary");
        return ActivityMatches::none();
    };

    let matching: Vec<NeighborEntry> = pool
        .iter()
        .filter(|entry| {
            snapshot
                .active(&entry.candidate_id)
                .is_some_and(|p| p.interests.contains(&activity))
        })
        .copied()
        .collect();

    ActivityMatches {
        total_matches: matching.len(),
        partners: matching.into_iter().take(k).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChildProfile, Program};
    use crate::services::neighbors::rank_candidates;
    use crate::services::similarity::AgedProfile;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn child(n: u128, month: u32, interests: &[Interest]) -> ChildProfile {
        let mut p = ChildProfile::new(
            "Kid",
            n.to_string(),
            NaiveDate::from_ymd_opt(2021, month, 1).unwrap(),
            Program::Preschool,
        )
        .with_interests(interests.iter().copied());
        p.id = Uuid::from_u128(n);
        p
    }

    fn matches_for(profiles: Vec<ChildProfile>, tag: &str, k: usize) -> ActivityMatches {
        let snapshot = ProfileSnapshot::new(1, profiles);
        let target = snapshot.aged(&Uuid::from_u128(1), as_of()).unwrap();
        let pool = rank_candidates(
            &target,
            snapshot.active_profiles().map(|p| AgedProfile::new(p, as_of())),
        );
        match_by_activity(&pool, &snapshot, tag, k)
    }

    #[test]
    fn test_filters_and_counts_before_truncation() {
        let profiles = vec![
            child(1, 6, &[Interest::Drawing]),
            child(2, 6, &[Interest::Drawing, Interest::Music]),
            child(3, 7, &[Interest::Drawing]),
            child(4, 8, &[Interest::Drawing]),
            child(5, 6, &[Interest::Sports]),
        ];

        let matches = matches_for(profiles, "drawing", 2);
        assert_eq!(matches.total_matches, 3);
        assert_eq!(matches.partners.len(), 2);
        assert_eq!(matches.partners[0].candidate_id, Uuid::from_u128(3));
        assert!(matches
            .partners
            .iter()
            .all(|e| e.candidate_id != Uuid::from_u128(5)));
    }

    #[test]
    fn test_no_one_shares_activity() {
        let profiles = vec![
            child(1, 6, &[Interest::Swimming]),
            child(2, 6, &[Interest::Music]),
        ];

        let matches = matches_for(profiles, "swimming", 3);
        assert_eq!(matches, ActivityMatches::none());
    }

    #[test]
    fn test_unknown_tag_matches_nobody() {
        let profiles = vec![child(1, 6, &[]), child(2, 6, &[Interest::Music])];
        let matches = matches_for(profiles, "skydiving", 3);
        assert_eq!(matches.total_matches, 0);
        assert!(matches.partners.is_empty());
    }
}
