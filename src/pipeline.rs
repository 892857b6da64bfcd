//! Run orchestration.
//!
//! Order: config and credential checks, catalog scan, database pre-flight,
//! grouping, per-artist fetch and scoring, plan, update. Everything before
//! the update is read-only, so every fatal error before it leaves the
//! database untouched.

use std::time::Instant;

use crate::catalog::{scan_catalog, TagReader};
use crate::config::Config;
use crate::error::RunError;
use crate::grouping::group_by_artist;
use crate::lastfm::{RankingFetcher, RankingSource};
use crate::models::RunStats;
use crate::navidrome::{NavidromeDb, UpdateOptions};
use crate::plan::build_plan;
use crate::progress::format_duration;

/// How a run that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Scores were planned and written.
    Completed,
    /// The music folder had no usable tracks; nothing was fetched or written.
    NoTracks,
}

impl From<&Config> for UpdateOptions {
    fn from(config: &Config) -> Self {
        UpdateOptions {
            music_root: config.music_folder.clone(),
            library_prefix: config.library_prefix.clone(),
            username: config.username.clone(),
            policy: config.policy,
            commit_mode: config.commit_mode,
        }
    }
}

pub struct Pipeline<'a> {
    config: &'a Config,
    source: &'a dyn RankingSource,
    reader: &'a dyn TagReader,
    stats: RunStats,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config, source: &'a dyn RankingSource, reader: &'a dyn TagReader) -> Self {
        Self {
            config,
            source,
            reader,
            stats: RunStats::default(),
        }
    }

    /// Counters so far; complete after `run` returns, partial after a fatal
    /// error.
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn run(&mut self) -> Result<RunOutcome, RunError> {
        let start = Instant::now();
        let config = self.config;

        config.validate()?;

        self.source.validate().map_err(RunError::Credentials)?;
        tracing::info!("Connected to Last.fm");

        let scan = scan_catalog(&config.music_folder, self.reader)?;
        self.stats.tracks_scanned = scan.tracks.len();
        self.stats.files_skipped = scan.skipped;
        tracing::info!(
            "Scan complete: {} tracks with valid tags ({} files skipped)",
            scan.tracks.len(),
            scan.skipped
        );
        if scan.tracks.is_empty() {
            tracing::info!("No tracks found, nothing to do");
            return Ok(RunOutcome::NoTracks);
        }

        // Fail on an unusable database or unknown user before spending
        // remote requests.
        let mut db = NavidromeDb::open(&config.db_file).map_err(|source| RunError::OpenDatabase {
            path: config.db_file.display().to_string(),
            source,
        })?;
        db.resolve_user(&config.username)?;

        let groups = group_by_artist(scan.tracks);
        self.stats.artists_grouped = groups.len();
        tracing::info!("Found {} unique artists", groups.len());

        let fetcher = RankingFetcher::new(self.source, config.top_limit);
        let plan = build_plan(groups, &fetcher, config.policy, config.workers)?;
        self.stats.tracks_matched = plan.matched_count();
        self.stats.artists_without_ranking = fetcher.artists_without_ranking();
        self.stats.artists_failed = fetcher.artists_failed();
        tracing::info!("Identified {} tracks to promote", self.stats.tracks_matched);

        tracing::info!("Updating database: {}", config.db_file.display());
        let report = db.apply_plan(&plan, &UpdateOptions::from(config))?;
        self.stats.tracks_updated = report.updated;
        self.stats.tracks_unchanged = report.unchanged;
        self.stats.skipped_outside_root = report.skipped_outside_root;
        self.stats.skipped_missing_media = report.skipped_missing_media;

        tracing::info!("Run finished in {}", format_duration(start.elapsed()));
        Ok(RunOutcome::Completed)
    }
}
