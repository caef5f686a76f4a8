//! Final ordering of scored candidates.
//!
//! Candidates arrive with `relevance` (learned blend) and `score`
//! (abbreviation only) already filled in. Ordering weighs
//! `10% action penalty + 20% relevance + 70% score`, where the action penalty
//! favors non-action candidates. Because every term is per-candidate, the
//! comparator reduces to a scalar key and yields a true total order.

use std::cmp::Ordering;

use crate::model::types::Candidate;

pub const DEFAULT_MAX_RESULTS: usize = 1000;

/// Candidates whose relevance is this close to zero are dropped.
const ZERO_RELEVANCE: f32 = 1e-5;

const ACTION_WEIGHT: f32 = 0.10;
const RELEVANCE_WEIGHT: f32 = 0.20;
const SCORE_WEIGHT: f32 = 0.70;

fn rank_key(candidate: &Candidate) -> f32 {
    let action_penalty = if candidate.is_action() { ACTION_WEIGHT } else { 0.0 };
    RELEVANCE_WEIGHT * candidate.relevance + SCORE_WEIGHT * candidate.score - action_penalty
}

/// Pairwise comparator value; positive when `a` belongs after `b`.
pub fn rank_delta(a: &Candidate, b: &Candidate) -> f32 {
    rank_key(b) - rank_key(a)
}

fn compare(a: &Candidate, b: &Candidate) -> Ordering {
    rank_key(b)
        .total_cmp(&rank_key(a))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.uid.cmp(&b.uid))
}

/// Drop zero-relevance candidates and sort the rest best-first.
pub fn sort(candidates: &mut Vec<Candidate>) {
    candidates.retain(|c| c.relevance.abs() > ZERO_RELEVANCE);
    candidates.sort_unstable_by(compare);
}

/// [`sort`], keeping at most `max_results` entries. Oversized input is fine.
pub fn sort_and_truncate(mut candidates: Vec<Candidate>, max_results: usize) -> Vec<Candidate> {
    candidates.retain(|c| c.relevance.abs() > ZERO_RELEVANCE);
    if max_results == 0 {
        candidates.clear();
        return candidates;
    }
    if candidates.len() > max_results {
        candidates.select_nth_unstable_by(max_results - 1, compare);
        candidates.truncate(max_results);
    }
    candidates.sort_unstable_by(compare);
    candidates
}
