//! Shared fixtures: a Navidrome-shaped SQLite database, a music folder of
//! fake audio files, and scripted tag/ranking collaborators.

#![allow(dead_code)]

use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use navidrome_popularity::catalog::TagReader;
use navidrome_popularity::error::{LastfmError, ReadError};
use navidrome_popularity::lastfm::RankingSource;
use navidrome_popularity::models::{RankedTitle, TrackTags};

pub const USER_ID: &str = "u-1";
pub const USERNAME: &str = "admin";

pub const SCHEMA: &str = r#"
    CREATE TABLE user (
        id VARCHAR(255) NOT NULL PRIMARY KEY,
        user_name VARCHAR(255) DEFAULT '' NOT NULL,
        name VARCHAR(255) DEFAULT '' NOT NULL
    );

    CREATE TABLE media_file (
        id VARCHAR(255) NOT NULL PRIMARY KEY,
        path VARCHAR(255) DEFAULT '' NOT NULL,
        title VARCHAR(255) DEFAULT '' NOT NULL
    );

    CREATE TABLE annotation (
        user_id VARCHAR(255) DEFAULT '' NOT NULL,
        item_id VARCHAR(255) DEFAULT '' NOT NULL,
        item_type VARCHAR(255) DEFAULT '' NOT NULL,
        play_count INTEGER DEFAULT 0,
        play_date DATETIME,
        rating INTEGER DEFAULT 0,
        starred BOOL DEFAULT FALSE NOT NULL,
        UNIQUE (user_id, item_id, item_type)
    );
"#;

/// Create a database file with the schema and the default user.
pub fn create_db(path: &Path) -> Connection {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    conn.execute(
        "INSERT INTO user (id, user_name, name) VALUES (?1, ?2, ?2)",
        params![USER_ID, USERNAME],
    )
    .unwrap();
    conn
}

pub fn add_media_file(conn: &Connection, id: &str, path: &str) {
    conn.execute(
        "INSERT INTO media_file (id, path) VALUES (?1, ?2)",
        params![id, path],
    )
    .unwrap();
}

pub fn add_annotation(conn: &Connection, item_id: &str, play_count: i64) {
    conn.execute(
        "INSERT INTO annotation (user_id, item_id, item_type, play_count, play_date)
         VALUES (?1, ?2, 'media_file', ?3, '2020-01-01 00:00:00')",
        params![USER_ID, item_id, play_count],
    )
    .unwrap();
}

pub fn play_count(conn: &Connection, item_id: &str) -> Option<i64> {
    conn.query_row(
        "SELECT play_count FROM annotation WHERE user_id = ?1 AND item_id = ?2",
        params![USER_ID, item_id],
        |row| row.get(0),
    )
    .ok()
}

pub fn annotation_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM annotation", [], |row| row.get(0))
        .unwrap()
}

/// Every annotation as (user, item, play count, play date), for before/after
/// comparisons.
pub fn annotation_rows(conn: &Connection) -> Vec<(String, String, Option<i64>, Option<String>)> {
    let mut stmt = conn
        .prepare("SELECT user_id, item_id, play_count, play_date FROM annotation ORDER BY user_id, item_id")
        .unwrap();
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    rows
}

/// Music folder with files whose body is "artist|title".
pub struct MusicFolder {
    pub root: PathBuf,
}

impl MusicFolder {
    pub fn new(root: PathBuf) -> Self {
        fs::create_dir_all(&root).unwrap();
        Self { root }
    }

    /// Add a file at `relative` and return its absolute path.
    pub fn add(&self, relative: &str, artist: &str, title: &str) -> String {
        let path = self.root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, format!("{}|{}", artist, title)).unwrap();
        path.to_str().unwrap().to_string()
    }
}

/// Reads "artist|title" from the file body instead of real tags.
pub struct BodyTagReader;

impl TagReader for BodyTagReader {
    fn read_tags(&self, path: &Path) -> Result<TrackTags, ReadError> {
        let body = fs::read_to_string(path).map_err(|e| ReadError::Unreadable(e.to_string()))?;
        let mut parts = body.splitn(2, '|');
        Ok(TrackTags {
            artist: parts.next().map(str::to_string),
            title: parts.next().map(str::to_string),
        })
    }
}

/// Ranking source answering from a fixed table. Artists not in the table
/// are "not found".
#[derive(Default)]
pub struct ScriptedSource {
    rankings: HashMap<String, Vec<String>>,
    failing: Vec<String>,
    pub reject_credentials: bool,
    pub calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, artist: &str, titles: &[&str]) -> Self {
        self.rankings.insert(
            artist.to_string(),
            titles.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    pub fn failing(mut self, artist: &str) -> Self {
        self.failing.push(artist.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RankingSource for ScriptedSource {
    fn validate(&self) -> Result<(), LastfmError> {
        if self.reject_credentials {
            Err(LastfmError::InvalidCredentials("Invalid API key".to_string()))
        } else {
            Ok(())
        }
    }

    fn top_tracks(&self, artist: &str, limit: u32) -> Result<Vec<RankedTitle>, LastfmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.iter().any(|a| a == artist) {
            return Err(LastfmError::Transport("connection refused".to_string()));
        }
        match self.rankings.get(artist) {
            Some(titles) => Ok(RankedTitle::from_ordered(
                titles.iter().take(limit as usize).cloned(),
            )),
            None => Err(LastfmError::ArtistNotFound(artist.to_string())),
        }
    }
}
