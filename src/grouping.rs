//! Partition of local tracks by artist.
//!
//! The key is the artist tag taken verbatim: exact, case-sensitive string
//! equality, identical to the string sent to the ranking service.

use crate::models::{ArtistGroups, Track};

pub fn group_by_artist(tracks: Vec<Track>) -> ArtistGroups {
    let mut groups = ArtistGroups::default();

    for track in tracks {
        groups.entry(track.artist.clone()).or_default().push(track);
    }

    groups
}

/// Groups as a vector sorted by artist, for deterministic work distribution.
pub fn sorted_groups(groups: ArtistGroups) -> Vec<(String, Vec<Track>)> {
    let mut sorted: Vec<_> = groups.into_iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    sorted
}
