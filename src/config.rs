//! Run configuration.
//!
//! `main` parses CLI arguments and environment into a `Config`; everything
//! below the orchestrator receives explicit values from here.

use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

use crate::scoring::BASE_SCORE;

/// Default number of top tracks requested per artist.
pub const DEFAULT_TOP_LIMIT: u32 = 50;

/// Default size of the per-artist fetch pool.
pub const DEFAULT_WORKERS: usize = 4;

// ============================================================================
// Policies
// ============================================================================

/// How a match is turned into a stored play count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScorePolicy {
    /// Rank-weighted score (`BASE_SCORE - (rank - 1)`) replaces the stored
    /// play count. Unmatched tracks are reset to the baseline.
    #[default]
    Overwrite,
    /// Matched tracks get `increment` added to their stored play count.
    /// Unmatched tracks are not touched.
    AdditiveBoost { increment: i64 },
}

/// CLI selector for `ScorePolicy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyKind {
    Overwrite,
    Boost,
}

impl PolicyKind {
    pub fn with_increment(self, increment: i64) -> ScorePolicy {
        match self {
            PolicyKind::Overwrite => ScorePolicy::Overwrite,
            PolicyKind::Boost => ScorePolicy::AdditiveBoost { increment },
        }
    }
}

/// When database writes are committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CommitMode {
    /// One transaction for the whole batch; any error rolls back everything.
    #[default]
    Atomic,
    /// Each track commits on its own; an error leaves earlier writes in place.
    Incremental,
}

// ============================================================================
// Config
// ============================================================================

/// Last.fm credentials, validated once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LastfmConfig {
    pub api_key: String,
    pub api_secret: String,
}

impl LastfmConfig {
    pub fn new(api_key: Option<String>, api_secret: Option<String>) -> Self {
        Self {
            api_key: api_key.unwrap_or_default().trim().to_string(),
            api_secret: api_secret.unwrap_or_default().trim().to_string(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_file: PathBuf,
    pub music_folder: PathBuf,
    pub username: String,
    pub lastfm: LastfmConfig,
    pub policy: ScorePolicy,
    pub commit_mode: CommitMode,
    /// Prepended to the translated path, e.g. `/music/` when the server sees
    /// the library under a different mount point.
    pub library_prefix: Option<String>,
    pub top_limit: u32,
    pub workers: usize,
}

impl Config {
    pub fn new(
        db_file: impl Into<PathBuf>,
        music_folder: impl Into<PathBuf>,
        username: impl Into<String>,
        lastfm: LastfmConfig,
    ) -> Self {
        Self {
            db_file: db_file.into(),
            music_folder: music_folder.into(),
            username: username.into(),
            lastfm,
            policy: ScorePolicy::default(),
            commit_mode: CommitMode::default(),
            library_prefix: None,
            top_limit: DEFAULT_TOP_LIMIT,
            workers: DEFAULT_WORKERS,
        }
    }

    /// Reject values that would break scoring invariants or the pool.
    /// Credentials are only checked for presence; the Last.fm handshake
    /// decides whether they are valid.
    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            bail!("a Navidrome username is required");
        }
        if !self.lastfm.is_complete() {
            bail!("Last.fm API key and API secret are required");
        }
        if self.top_limit == 0 || i64::from(self.top_limit) > BASE_SCORE {
            bail!(
                "top track limit must be between 1 and {}, got {}",
                BASE_SCORE,
                self.top_limit
            );
        }
        if self.workers == 0 {
            bail!("at least one worker is required");
        }
        if let ScorePolicy::AdditiveBoost { increment } = self.policy {
            if increment < 1 {
                bail!("boost increment must be positive, got {}", increment);
            }
        }
        Ok(())
    }
}
