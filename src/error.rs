//! Error types for the pipeline seams.
//!
//! Per-item failures (`ReadError`, most `LastfmError`s) are counted and
//! skipped by their callers. `UpdateError` and `RunError` carry the fatal
//! cases up to `main`.

use thiserror::Error;

/// Failure to read usable tags from one audio file.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The file could not be opened or parsed
    #[error("failed to read tags: {0}")]
    Unreadable(String),

    /// The file has no tag block at all
    #[error("no tags found")]
    NoTags,

    /// Artist or title is missing or empty
    #[error("missing {0} tag")]
    MissingField(&'static str),
}

/// Remote ranking service errors.
#[derive(Debug, Error)]
pub enum LastfmError {
    /// API key or secret not provided
    #[error("Last.fm API key and API secret are required")]
    MissingCredentials,

    /// The service rejected the credentials
    #[error("Last.fm rejected the API credentials: {0}")]
    InvalidCredentials(String),

    /// The artist is unknown to the service
    #[error("artist not found: {0}")]
    ArtistNotFound(String),

    /// Error payload returned by the API
    #[error("Last.fm API error {code}: {message}")]
    Api { code: i64, message: String },

    /// Network or HTTP transport failure
    #[error("Last.fm request failed: {0}")]
    Transport(String),

    /// Response body did not have the expected shape
    #[error("unexpected Last.fm response: {0}")]
    Decode(String),
}

impl LastfmError {
    /// Whether this failure means "no ranking for this artist" rather than
    /// a problem with the service itself.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LastfmError::ArtistNotFound(_))
    }
}

/// Database update errors.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The configured user does not exist in the server database
    #[error("user '{0}' not found in the database")]
    UserNotFound(String),

    /// SQLite failure
    #[error("database error: {0}")]
    Store(#[from] rusqlite::Error),

    /// SQLite failure after some rows were already committed
    #[error(
        "database error after {committed} committed updates: {source}; \
         restore the database from a backup before running again"
    )]
    PartiallyCommitted {
        committed: usize,
        #[source]
        source: rusqlite::Error,
    },
}

/// Fatal run errors, mapped to a non-zero exit status.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Credentials(LastfmError),

    #[error("music folder is not a directory: {0}")]
    MusicFolder(String),

    #[error("cannot open database {path}: {source}")]
    OpenDatabase {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error(transparent)]
    Update(#[from] UpdateError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
