//! Matching and scoring of local tracks against a remote top-tracks list.
//!
//! Matching is exact after lower-casing: no punctuation, whitespace or
//! diacritic folding. A hit with rank `r` scores according to the policy:
//!
//! - `Overwrite`: `BASE_SCORE - (r - 1)`, so rank 1 scores `BASE_SCORE` and
//!   every lower rank scores strictly less.
//! - `AdditiveBoost`: the fixed increment, independent of rank.
//!
//! Tracks without a hit keep `BASELINE_SCORE`.

use rustc_hash::FxHashMap;

use crate::config::ScorePolicy;
use crate::models::{PlannedScore, RankLookup, RankedTitle, Track};

// ============================================================================
// Constants
// ============================================================================

/// Score for the rank-1 track under the overwrite policy.
pub const BASE_SCORE: i64 = 10_000;

/// Score of a track with no evidence of remote popularity.
pub const BASELINE_SCORE: i64 = 0;

// ============================================================================
// Matching
// ============================================================================

/// The only normalization applied to titles before comparison.
pub fn fold_title(title: &str) -> String {
    title.to_lowercase()
}

/// Case-folded title -> rank. When two remote titles fold to the same key,
/// the later entry in the list overwrites the earlier one.
pub fn build_rank_lookup(ranked: &[RankedTitle]) -> RankLookup {
    let mut lookup: RankLookup = FxHashMap::default();
    for entry in ranked {
        lookup.insert(fold_title(&entry.title), entry.rank);
    }
    lookup
}

pub fn match_rank(lookup: &RankLookup, title: &str) -> Option<u32> {
    lookup.get(&fold_title(title)).copied()
}

// ============================================================================
// Scoring
// ============================================================================

/// Rank-weighted score: `BASE_SCORE - (rank - 1)`.
///
/// Ranks are 1-based; rank 0 is treated as rank 1. The result is clamped at
/// the baseline so it never goes negative for out-of-range ranks.
pub fn rank_score(rank: u32) -> i64 {
    let rank = i64::from(rank.max(1));
    (BASE_SCORE - (rank - 1)).max(BASELINE_SCORE)
}

/// Planned score for a matched track under `policy`.
pub fn score_for_match(policy: ScorePolicy, rank: u32) -> i64 {
    match policy {
        ScorePolicy::Overwrite => rank_score(rank),
        ScorePolicy::AdditiveBoost { increment } => increment.max(BASELINE_SCORE),
    }
}

/// Score every track of one artist group against that artist's ranking.
///
/// Every track gets exactly one entry; an empty ranking leaves the whole
/// group at the baseline.
pub fn score_group(tracks: &[Track], ranked: &[RankedTitle], policy: ScorePolicy) -> Vec<PlannedScore> {
    let lookup = build_rank_lookup(ranked);

    tracks
        .iter()
        .map(|track| {
            let rank = match_rank(&lookup, &track.title);
            let score = match rank {
                Some(r) => score_for_match(policy, r),
                None => BASELINE_SCORE,
            };
            PlannedScore {
                track: track.clone(),
                score,
                rank,
            }
        })
        .collect()
}
