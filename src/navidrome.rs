//! Navidrome database updater.
//!
//! The schema is owned by Navidrome; only these tables and columns are used:
//!
//! ```sql
//! user(id, name)
//! media_file(id, path)
//! annotation(user_id, item_id, item_type, play_count, play_date)
//! ```
//!
//! Per planned track: translate the local path to the server's path, look
//! up the media file, then upsert the annotation for the configured user.
//! Tracks outside the music folder or unknown to the server are skipped and
//! counted. Record ids are passed through as opaque SQLite values.

use rusqlite::types::Value;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::config::{CommitMode, ScorePolicy};
use crate::error::UpdateError;
use crate::models::{PlannedScore, ScorePlan};
use crate::progress::PhaseProgress;

/// Navidrome row id (text in current schemas; kept opaque).
pub type RecordId = Value;

const ITEM_TYPE_MEDIA_FILE: &str = "media_file";

/// Navidrome may hold the database open while we write.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Path Translation
// ============================================================================

/// Server-side path for a local file: the part below `music_root`, joined
/// with `/`, optionally under `library_prefix`.
///
/// Returns `None` when the file is not strictly inside `music_root` or the
/// relative part contains anything but plain names.
pub fn translate_path(music_root: &Path, track_path: &Path, library_prefix: Option<&str>) -> Option<String> {
    let relative = track_path.strip_prefix(music_root).ok()?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }

    let relative = parts.join("/");
    match library_prefix.map(|p| p.trim_end_matches('/')) {
        Some(prefix) if !prefix.is_empty() => Some(format!("{}/{}", prefix, relative)),
        Some(_) if library_prefix == Some("/") => Some(format!("/{}", relative)),
        _ => Some(relative),
    }
}

// ============================================================================
// Update Plan
// ============================================================================

#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub music_root: PathBuf,
    pub library_prefix: Option<String>,
    pub username: String,
    pub policy: ScorePolicy,
    pub commit_mode: CommitMode,
}

/// A planned track with its server-side path, ready for SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite<'a> {
    pub planned: &'a PlannedScore,
    pub server_path: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub updated: usize,
    /// Unmatched tracks under the boost policy, which are never written.
    pub unchanged: usize,
    pub skipped_outside_root: usize,
    pub skipped_missing_media: usize,
}

impl UpdateReport {
    pub fn skipped(&self) -> usize {
        self.skipped_outside_root + self.skipped_missing_media
    }
}

/// Translate every planned path and drop the tracks that need no SQL:
/// files outside the music folder, and unmatched tracks under the boost
/// policy. Runs before the database is touched.
pub fn prepare_writes<'a>(plan: &'a ScorePlan, options: &UpdateOptions, report: &mut UpdateReport) -> Vec<PendingWrite<'a>> {
    let mut pending = Vec::with_capacity(plan.len());

    for planned in plan.iter() {
        let server_path = match translate_path(
            &options.music_root,
            Path::new(&planned.track.path),
            options.library_prefix.as_deref(),
        ) {
            Some(p) => p,
            None => {
                tracing::debug!("outside music folder, skipping: {}", planned.track.path);
                report.skipped_outside_root += 1;
                continue;
            }
        };

        if matches!(options.policy, ScorePolicy::AdditiveBoost { .. }) && !planned.is_match() {
            report.unchanged += 1;
            continue;
        }

        pending.push(PendingWrite { planned, server_path });
    }

    pending
}

// ============================================================================
// Queries
// ============================================================================

pub fn find_user(conn: &Connection, username: &str) -> rusqlite::Result<Option<RecordId>> {
    conn.query_row("SELECT id FROM user WHERE name = ?1", params![username], |row| row.get(0))
        .optional()
}

pub fn find_media_file(conn: &Connection, server_path: &str) -> rusqlite::Result<Option<RecordId>> {
    conn.prepare_cached("SELECT id FROM media_file WHERE path = ?1")?
        .query_row(params![server_path], |row| row.get(0))
        .optional()
}

pub fn play_count(conn: &Connection, user_id: &RecordId, item_id: &RecordId) -> rusqlite::Result<Option<Option<i64>>> {
    conn.prepare_cached("SELECT play_count FROM annotation WHERE item_id = ?1 AND user_id = ?2")?
        .query_row(params![item_id, user_id], |row| row.get(0))
        .optional()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOutcome {
    Written,
    MissingMedia,
}

/// Upsert one annotation. `planned.score` is the new play count under
/// `Overwrite` and the increment under `AdditiveBoost`.
fn write_annotation(
    conn: &Connection,
    user_id: &RecordId,
    write: &PendingWrite<'_>,
    policy: ScorePolicy,
) -> rusqlite::Result<WriteOutcome> {
    let Some(item_id) = find_media_file(conn, &write.server_path)? else {
        return Ok(WriteOutcome::MissingMedia);
    };

    let score = write.planned.score;
    let exists = play_count(conn, user_id, &item_id)?.is_some();

    if exists {
        let sql = match policy {
            ScorePolicy::Overwrite => {
                "UPDATE annotation SET play_count = ?1, play_date = CURRENT_TIMESTAMP
                 WHERE item_id = ?2 AND user_id = ?3"
            }
            ScorePolicy::AdditiveBoost { .. } => {
                "UPDATE annotation SET play_count = COALESCE(play_count, 0) + ?1, play_date = CURRENT_TIMESTAMP
                 WHERE item_id = ?2 AND user_id = ?3"
            }
        };
        conn.prepare_cached(sql)?.execute(params![score, item_id, user_id])?;
    } else {
        conn.prepare_cached(
            "INSERT INTO annotation (user_id, item_id, item_type, play_count, play_date)
             VALUES (?1, ?2, ?3, ?4, CURRENT_TIMESTAMP)",
        )?
        .execute(params![user_id, item_id, ITEM_TYPE_MEDIA_FILE, score])?;
    }

    Ok(WriteOutcome::Written)
}

// ============================================================================
// Database
// ============================================================================

pub struct NavidromeDb {
    conn: Connection,
}

impl NavidromeDb {
    /// Open an existing database read-write. A missing file is an error,
    /// never silently created; a file that is not SQLite fails here too.
    pub fn open<P: AsRef<Path>>(path: P) -> rusqlite::Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // Forces the header to be read.
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn resolve_user(&self, username: &str) -> Result<RecordId, UpdateError> {
        find_user(&self.conn, username)?.ok_or_else(|| UpdateError::UserNotFound(username.to_string()))
    }

    /// Write every planned score.
    ///
    /// The user is resolved before any write; if it is missing nothing is
    /// written. With `CommitMode::Atomic` a store error rolls back the whole
    /// batch. With `CommitMode::Incremental` each track commits on its own
    /// and an error reports how many tracks were already committed.
    pub fn apply_plan(&mut self, plan: &ScorePlan, options: &UpdateOptions) -> Result<UpdateReport, UpdateError> {
        let mut report = UpdateReport::default();
        let pending = prepare_writes(plan, options, &mut report);

        let user_id = self.resolve_user(&options.username)?;
        tracing::info!("Found user '{}' with id {:?}", options.username, user_id);

        let progress = PhaseProgress::new("Phase 4: Updating database", pending.len() as u64, 500);

        match options.commit_mode {
            CommitMode::Atomic => {
                let tx = self.conn.transaction()?;
                for write in &pending {
                    let outcome = write_annotation(&tx, &user_id, write, options.policy)?;
                    record(&mut report, write, outcome);
                    progress.tick();
                }
                tx.commit()?;
            }
            CommitMode::Incremental => {
                for write in &pending {
                    let outcome = self
                        .write_committed(&user_id, write, options.policy)
                        .map_err(|source| UpdateError::PartiallyCommitted {
                            committed: report.updated,
                            source,
                        })?;
                    record(&mut report, write, outcome);
                    progress.tick();
                }
            }
        }

        progress.finish(format!(
            "Phase 4: Updated {} tracks ({} skipped)",
            report.updated,
            report.skipped()
        ));
        Ok(report)
    }

    fn write_committed(
        &mut self,
        user_id: &RecordId,
        write: &PendingWrite<'_>,
        policy: ScorePolicy,
    ) -> rusqlite::Result<WriteOutcome> {
        let tx = self.conn.transaction()?;
        let outcome = write_annotation(&tx, user_id, write, policy)?;
        tx.commit()?;
        Ok(outcome)
    }
}

fn record(report: &mut UpdateReport, write: &PendingWrite<'_>, outcome: WriteOutcome) {
    match outcome {
        WriteOutcome::Written => report.updated += 1,
        WriteOutcome::MissingMedia => {
            tracing::debug!("not in Navidrome database, skipping: {}", write.server_path);
            report.skipped_missing_media += 1;
        }
    }
}
