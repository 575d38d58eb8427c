//! Pairwise similarity between two children.
//!
//! The score blends how close two children are in age with how much their
//! interests overlap. It is deterministic, symmetric and always lies in
//! `0.0..=1.0`.

use chrono::NaiveDate;
use std::collections::BTreeSet;

use crate::models::{ChildProfile, Interest};

/// Age gap, in months, at which the age component reaches zero
pub const AGE_SPAN_MONTHS: f64 = 24.0;
/// Weight of the age component
pub const W_AGE: f64 = 0.4;
/// Weight of the interest component
pub const W_INTEREST: f64 = 0.6;

/// A profile paired with its age on the day a request is served
#[derive(Debug, Clone, Copy)]
pub struct AgedProfile<'a> {
    pub profile: &'a ChildProfile,
    pub age_months: u32,
}

impl<'a> AgedProfile<'a> {
    pub fn new(profile: &'a ChildProfile, as_of: NaiveDate) -> Self {
        Self {
            profile,
            age_months: profile.age_in_months(as_of),
        }
    }

    pub fn age_gap_months(&self, other: &AgedProfile<'_>) -> u32 {
        self.age_months.abs_diff(other.age_months)
    }
}

/// Per-component view of a similarity score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub age: f64,
    pub interest: f64,
    pub total: f64,
}

/// `1 - gap / AGE_SPAN_MONTHS`, floored at zero
pub fn age_closeness(a_months: u32, b_months: u32) -> f64 {
    let gap = a_months.abs_diff(b_months) as f64;
    (1.0 - gap / AGE_SPAN_MONTHS).max(0.0)
}

/// Jaccard index of two interest sets; zero when both are empty
pub fn interest_overlap(a: &BTreeSet<Interest>, b: &BTreeSet<Interest>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

pub fn breakdown(a: &AgedProfile<'_>, b: &AgedProfile<'_>) -> ScoreBreakdown {
    let age = age_closeness(a.age_months, b.age_months);
    let interest = interest_overlap(&a.profile.interests, &b.profile.interests);
    let total = W_AGE * age + W_INTEREST * interest;

    ScoreBreakdown {
        age,
        interest,
        total: sanitise(total),
    }
}

/// Similarity of two children in `0.0..=1.0`
pub fn score(a: &AgedProfile<'_>, b: &AgedProfile<'_>) -> f64 {
    breakdown(a, b).total
}

/// Rounds a similarity for display
pub fn round_similarity(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn sanitise(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}
