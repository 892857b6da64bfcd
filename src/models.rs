//! Core data models for the popularity sync pipeline.
//!
//! This module contains the value types that flow from the catalog scan
//! through grouping, scoring and planning into the database update.

use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeMap;

// ============================================================================
// Type Aliases
// ============================================================================

/// Artist name (verbatim tag value) -> tracks by that artist.
pub type ArtistGroups = FxHashMap<String, Vec<Track>>;

/// Case-folded remote title -> 1-based rank.
pub type RankLookup = FxHashMap<String, u32>;

// ============================================================================
// Local Catalog
// ============================================================================

/// A local audio file with usable artist and title tags.
///
/// `path` is the identity of the track within a run: two tracks never share
/// a path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Track {
    pub path: String,
    pub artist: String,
    pub title: String,
}

impl Track {
    pub fn new(
        path: impl Into<String>,
        artist: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            artist: artist.into(),
            title: title.into(),
        }
    }
}

/// Artist and title as read from a file's tags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackTags {
    pub artist: Option<String>,
    pub title: Option<String>,
}

// ============================================================================
// Remote Ranking
// ============================================================================

/// A title from the remote top-tracks list with its 1-based position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankedTitle {
    pub title: String,
    pub rank: u32,
}

impl RankedTitle {
    /// Assign contiguous ranks (1, 2, 3, ...) in list order.
    pub fn from_ordered<I, S>(titles: I) -> Vec<RankedTitle>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        titles
            .into_iter()
            .enumerate()
            .map(|(i, title)| RankedTitle {
                title: title.into(),
                rank: i as u32 + 1,
            })
            .collect()
    }
}

// ============================================================================
// Score Plan
// ============================================================================

/// Target score for one track. `rank` is `None` for tracks without a match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedScore {
    pub track: Track,
    pub score: i64,
    pub rank: Option<u32>,
}

impl PlannedScore {
    pub fn is_match(&self) -> bool {
        self.rank.is_some()
    }
}

/// Every track of the run keyed by path, in path order.
///
/// Ordered so that the update pass and its logs are reproducible regardless
/// of the order in which per-artist fetches completed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScorePlan {
    entries: BTreeMap<String, PlannedScore>,
}

impl ScorePlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a score. Returns false (and keeps the existing entry) if the
    /// path is already planned.
    pub fn insert(&mut self, planned: PlannedScore) -> bool {
        use std::collections::btree_map::Entry;
        match self.entries.entry(planned.track.path.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(planned);
                true
            }
        }
    }

    pub fn score_of(&self, path: &str) -> Option<i64> {
        self.entries.get(path).map(|p| p.score)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlannedScore> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn matched_count(&self) -> usize {
        self.entries.values().filter(|p| p.is_match()).count()
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Counters for the run summary.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStats {
    // Catalog
    pub tracks_scanned: usize,
    pub files_skipped: usize,

    // Grouping and remote ranking
    pub artists_grouped: usize,
    pub artists_without_ranking: usize,
    pub artists_failed: usize,

    // Scoring
    pub tracks_matched: usize,

    // Database
    pub tracks_updated: usize,
    pub tracks_unchanged: usize,
    pub skipped_outside_root: usize,
    pub skipped_missing_media: usize,
}

impl RunStats {
    /// Tracks that were planned but not written.
    pub fn tracks_skipped(&self) -> usize {
        self.skipped_outside_root + self.skipped_missing_media
    }

    /// Match rate as a percentage of scanned tracks.
    pub fn match_rate(&self) -> f64 {
        if self.tracks_scanned == 0 {
            0.0
        } else {
            100.0 * self.tracks_matched as f64 / self.tracks_scanned as f64
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn print_summary(&self) {
        println!("\n{:=<60}", "");
        println!("Run summary");
        println!("  Tracks scanned: {}", self.tracks_scanned);
        println!("  Files skipped (unreadable/untagged): {}", self.files_skipped);
        println!("  Artists grouped: {}", self.artists_grouped);
        println!(
            "  Artists without ranking: {} ({} failed)",
            self.artists_without_ranking, self.artists_failed
        );
        println!(
            "  Tracks matched: {} ({:.1}%)",
            self.tracks_matched,
            self.match_rate()
        );
        println!("  Tracks updated: {}", self.tracks_updated);
        if self.tracks_unchanged > 0 {
            println!("  Tracks left unchanged: {}", self.tracks_unchanged);
        }
        println!(
            "  Tracks skipped: {} (outside music folder: {}, not in database: {})",
            self.tracks_skipped(),
            self.skipped_outside_root,
            self.skipped_missing_media
        );
        println!("{:=<60}", "");
    }
}
