//! Playgroup assembly.
//!
//! Groups are cut greedily from the target's ranked neighbor pool: each group
//! is the target plus the next `max_size - 1` unconsumed candidates, so the
//! best matches land in the first group and no candidate is used twice. Only
//! the trailing group can be short; it is kept when it still holds at least
//! `min_size` candidates and dropped otherwise, never merged backwards.

use chrono::NaiveDate;
use std::collections::BTreeSet;

use crate::{
    models::{
        months_to_years, AgeRange, GroupMember, GroupRecommendation, Interest, NeighborEntry,
    },
    services::{
        profiles::ProfileSnapshot,
        similarity::{round_similarity, AgedProfile},
    },
};

/// Inclusive bounds on group size, target included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupBounds {
    pub min_size: usize,
    pub max_size: usize,
}

impl GroupBounds {
    pub fn new(min_size: usize, max_size: usize) -> Self {
        Self { min_size, max_size }
    }

    /// Candidates that fit next to the target in one group
    fn capacity(&self) -> usize {
        self.max_size.saturating_sub(1)
    }

    fn admits(&self, candidates: usize) -> bool {
        candidates > 0 && (candidates == self.capacity() || candidates >= self.min_size)
    }
}

/// Partitions a ranked pool into disjoint groups anchored on `target`.
///
/// Pool entries that no longer resolve to an active child are skipped.
pub fn build_groups(
    target: &AgedProfile<'_>,
    pool: &[NeighborEntry],
    bounds: GroupBounds,
    snapshot: &ProfileSnapshot,
    as_of: NaiveDate,
) -> Vec<GroupRecommendation> {
    let per_group = bounds.capacity();
    if per_group == 0 {
        return Vec::new();
    }

    let candidates: Vec<(AgedProfile<'_>, f64)> = pool
        .iter()
        .filter(|entry| entry.candidate_id != target.profile.id)
        .filter_map(|entry| {
            snapshot
                .aged(&entry.candidate_id, as_of)
                .map(|aged| (aged, entry.score))
        })
        .collect();

    candidates
        .chunks(per_group)
        .filter(|chunk| bounds.admits(chunk.len()))
        .enumerate()
        .map(|(index, chunk)| assemble(index + 1, target, chunk))
        .collect()
}

fn assemble(
    ordinal: usize,
    target: &AgedProfile<'_>,
    chunk: &[(AgedProfile<'_>, f64)],
) -> GroupRecommendation {
    let mut members = Vec::with_capacity(chunk.len() + 1);
    members.push(member(target, None));
    members.extend(chunk.iter().map(|(aged, score)| member(aged, Some(*score))));

    let average_similarity =
        chunk.iter().map(|(_, score)| score).sum::<f64>() / chunk.len() as f64;

    let ages = chunk
        .iter()
        .map(|(aged, _)| aged.age_months)
        .chain(std::iter::once(target.age_months));
    let age_range_months = ages.fold(
        AgeRange {
            min: target.age_months,
            max: target.age_months,
        },
        |range, age| AgeRange {
            min: range.min.min(age),
            max: range.max.max(age),
        },
    );

    let common_interests = chunk.iter().fold(
        target.profile.interests.clone(),
        |common: BTreeSet<Interest>, (aged, _)| {
            common
                .intersection(&aged.profile.interests)
                .copied()
                .collect()
        },
    );

    GroupRecommendation {
        group_id: format!("group_{}", ordinal),
        group_size: members.len(),
        members,
        average_similarity: round_similarity(average_similarity),
        age_range_months,
        common_interests,
    }
}

fn member(aged: &AgedProfile<'_>, similarity: Option<f64>) -> GroupMember {
    GroupMember {
        id: aged.profile.id,
        name: aged.profile.display_name(),
        age: months_to_years(aged.age_months),
        age_months: aged.age_months,
        program: aged.profile.program,
        interests: aged.profile.interests.clone(),
        similarity: similarity.map(round_similarity),
        is_target: similarity.is_none(),
    }
}
