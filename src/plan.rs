//! Reconciliation planner: fetch each artist's ranking, score its tracks,
//! and merge everything into one `ScorePlan`.
//!
//! Fetches run on a bounded rayon pool. Each artist's scores depend only on
//! its own ranking and the merge is keyed by path, so the plan does not
//! depend on completion order.

use anyhow::{bail, Context, Result};
use rayon::prelude::*;

use crate::config::ScorePolicy;
use crate::grouping::sorted_groups;
use crate::lastfm::RankingFetcher;
use crate::models::{ArtistGroups, PlannedScore, ScorePlan};
use crate::progress::PhaseProgress;
use crate::scoring::score_group;

/// Union of per-artist score lists. A path planned twice means the groups
/// were not a partition.
pub fn merge_scores<I>(per_artist: I) -> Result<ScorePlan>
where
    I: IntoIterator<Item = Vec<PlannedScore>>,
{
    let mut plan = ScorePlan::new();
    for scores in per_artist {
        for planned in scores {
            let path = planned.track.path.clone();
            if !plan.insert(planned) {
                bail!("track planned twice: {}", path);
            }
        }
    }
    Ok(plan)
}

/// Fetch rankings for every artist (at most `workers` in flight) and build
/// the plan.
pub fn build_plan(
    groups: ArtistGroups,
    fetcher: &RankingFetcher<'_>,
    policy: ScorePolicy,
    workers: usize,
) -> Result<ScorePlan> {
    let groups = sorted_groups(groups);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .context("Failed to build fetch thread pool")?;

    let progress = PhaseProgress::new("Phase 3: Fetching top tracks", groups.len() as u64, 50);

    let per_artist: Vec<Vec<PlannedScore>> = pool.install(|| {
        groups
            .par_iter()
            .map(|(artist, tracks)| {
                let ranked = fetcher.fetch(artist);
                let scores = score_group(tracks, &ranked, policy);
                progress.tick();
                scores
            })
            .collect()
    });

    let plan = merge_scores(per_artist)?;
    progress.finish(format!(
        "Phase 3: Scored {} tracks, {} to promote",
        plan.len(),
        plan.matched_count()
    ));
    Ok(plan)
}
