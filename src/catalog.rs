//! Local catalog scan.
//!
//! Walks the music folder for `.mp3`, `.flac` and `.opus` files and reads
//! artist/title tags through a `TagReader`. Files that cannot be read or
//! lack either tag are counted, not reported individually.

use lofty::prelude::*;
use lofty::probe::Probe;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{ReadError, RunError};
use crate::models::{Track, TrackTags};
use crate::progress::{spinner, PhaseProgress};

/// File extensions considered audio (compared case-insensitively).
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "opus"];

// ============================================================================
// Tag Reading
// ============================================================================

/// Reads artist/title tags from one file.
pub trait TagReader: Sync {
    fn read_tags(&self, path: &Path) -> Result<TrackTags, ReadError>;
}

/// `TagReader` backed by lofty, using the primary tag or the first tag
/// present.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTagReader;

impl TagReader for LoftyTagReader {
    fn read_tags(&self, path: &Path) -> Result<TrackTags, ReadError> {
        let tagged_file = Probe::open(path)
            .map_err(|e| ReadError::Unreadable(e.to_string()))?
            .read()
            .map_err(|e| ReadError::Unreadable(e.to_string()))?;

        let tag = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag())
            .ok_or(ReadError::NoTags)?;

        Ok(TrackTags {
            artist: tag.artist().map(|a| a.to_string()),
            title: tag.title().map(|t| t.to_string()),
        })
    }
}

/// Build a `Track` from tags, rejecting missing or blank fields.
pub fn track_from_tags(path: &str, tags: TrackTags) -> Result<Track, ReadError> {
    let artist = tags
        .artist
        .filter(|a| !a.trim().is_empty())
        .ok_or(ReadError::MissingField("artist"))?;
    let title = tags
        .title
        .filter(|t| !t.trim().is_empty())
        .ok_or(ReadError::MissingField("title"))?;
    Ok(Track::new(path, artist, title))
}

// ============================================================================
// Scanning
// ============================================================================

/// Result of a catalog scan.
#[derive(Debug, Default, Clone)]
pub struct CatalogScan {
    pub tracks: Vec<Track>,
    /// Audio files that were unreadable, untagged or not valid UTF-8 paths.
    pub skipped: usize,
    pub files_found: usize,
}

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.iter().any(|ext| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Recursively collect audio files under `root`, sorted by path.
/// Directory entries that cannot be read are returned as a count.
pub fn collect_audio_files(root: &Path) -> (Vec<PathBuf>, usize) {
    let mut files = Vec::new();
    let mut unreadable = 0;

    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && is_audio_file(entry.path()) {
                    files.push(entry.into_path());
                }
            }
            Err(e) => {
                tracing::debug!("skipping unreadable directory entry: {}", e);
                unreadable += 1;
            }
        }
    }

    files.sort();
    (files, unreadable)
}

/// Scan `root` for tracks with usable artist and title tags.
///
/// Fails only when `root` is not a directory.
pub fn scan_catalog(root: &Path, reader: &dyn TagReader) -> Result<CatalogScan, RunError> {
    if !root.is_dir() {
        return Err(RunError::MusicFolder(root.display().to_string()));
    }

    tracing::info!("Scanning music folder: {}", root.display());
    let listing = spinner("Phase 1: Listing audio files");
    let (files, unreadable_entries) = collect_audio_files(root);
    listing.finish_with_message(format!("Phase 1: Found {} audio files", files.len()));

    let progress = PhaseProgress::new("Phase 2: Reading tags", files.len() as u64, 500);

    let results: Vec<Result<Track, ReadError>> = files
        .par_iter()
        .map(|path| {
            let result = read_track(path, reader);
            progress.tick();
            result
        })
        .collect();

    let mut scan = CatalogScan {
        files_found: files.len(),
        skipped: unreadable_entries,
        ..Default::default()
    };
    for (path, result) in files.iter().zip(results) {
        match result {
            Ok(track) => scan.tracks.push(track),
            Err(e) => {
                tracing::debug!("skipping {}: {}", path.display(), e);
                scan.skipped += 1;
            }
        }
    }

    progress.finish(format!(
        "Phase 2: {} tracks with valid tags ({} skipped)",
        scan.tracks.len(),
        scan.skipped
    ));
    Ok(scan)
}

fn read_track(path: &Path, reader: &dyn TagReader) -> Result<Track, ReadError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| ReadError::Unreadable("path is not valid UTF-8".to_string()))?;
    let tags = reader.read_tags(path)?;
    track_from_tags(path_str, tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Reads "artist|title" from the file body.
    struct BodyTagReader;

    impl TagReader for BodyTagReader {
        fn read_tags(&self, path: &Path) -> Result<TrackTags, ReadError> {
            let body = fs::read_to_string(path).map_err(|e| ReadError::Unreadable(e.to_string()))?;
            if body.is_empty() {
                return Err(ReadError::NoTags);
            }
            let mut parts = body.splitn(2, '|');
            let artist = parts.next().map(str::to_string);
            let title = parts.next().map(str::to_string);
            Ok(TrackTags { artist, title })
        }
    }

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file(Path::new("/m/a.mp3")));
        assert!(is_audio_file(Path::new("/m/a.FLAC")));
        assert!(is_audio_file(Path::new("/m/a.opus")));
        assert!(!is_audio_file(Path::new("/m/a.m4a")));
        assert!(!is_audio_file(Path::new("/m/cover.jpg")));
        assert!(!is_audio_file(Path::new("/m/mp3")));
    }

    #[test]
    fn test_track_from_tags_requires_both_fields() {
        let ok = track_from_tags(
            "/m/a.mp3",
            TrackTags { artist: Some("A".into()), title: Some("T".into()) },
        );
        assert_eq!(ok.unwrap(), Track::new("/m/a.mp3", "A", "T"));

        let no_title = track_from_tags("/m/a.mp3", TrackTags { artist: Some("A".into()), title: None });
        assert!(matches!(no_title, Err(ReadError::MissingField("title"))));

        let blank_artist = track_from_tags(
            "/m/a.mp3",
            TrackTags { artist: Some("  ".into()), title: Some("T".into()) },
        );
        assert!(matches!(blank_artist, Err(ReadError::MissingField("artist"))));
    }

    #[test]
    fn test_scan_catalog_counts_skips() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("Artist").join("Album");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("01.mp3"), "Artist|One").unwrap();
        fs::write(sub.join("02.flac"), "Artist|Two").unwrap();
        fs::write(sub.join("03.opus"), "Artist|").unwrap();
        fs::write(sub.join("04.mp3"), "").unwrap();
        fs::write(sub.join("notes.txt"), "Artist|Ignored").unwrap();

        let scan = scan_catalog(dir.path(), &BodyTagReader).unwrap();
        assert_eq!(scan.files_found, 4);
        assert_eq!(scan.tracks.len(), 2);
        assert_eq!(scan.skipped, 2);
        assert_eq!(scan.tracks[0].title, "One");
        assert_eq!(scan.tracks[1].title, "Two");
        assert!(scan.tracks[0].path.ends_with("01.mp3"));
    }

    #[test]
    fn test_scan_catalog_rejects_non_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.mp3");
        fs::write(&file, "x|y").unwrap();
        assert!(matches!(
            scan_catalog(&file, &BodyTagReader),
            Err(RunError::MusicFolder(_))
        ));
        assert!(scan_catalog(&dir.path().join("missing"), &BodyTagReader).is_err());
    }

    #[test]
    fn test_lofty_reader_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.mp3");
        fs::write(&file, b"not really audio").unwrap();
        let path = file.to_str().unwrap();
        let track = LoftyTagReader
            .read_tags(&file)
            .and_then(|tags| track_from_tags(path, tags));
        assert!(track.is_err());
    }
}
