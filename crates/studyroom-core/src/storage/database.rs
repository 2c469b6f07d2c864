//! SQLite-based session storage.
//!
//! Provides persistent storage for:
//! - Study session records (config, final counters, status)
//! - Highlights, queried by the wrap-up screen
//! - Key-value store for front-end state (the CLI parks the live session here)

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{
    data_dir, Highlight, NewSessionRecord, SessionPatch, SessionRecord, SessionStatus, SessionStore,
};
use crate::error::{DatabaseError, StoreError};
use crate::session::{SessionConfig, SessionMode, SessionStats};

const SESSION_COLUMNS: &str = "id, book_id, mode, work_minutes, break_minutes, afk_timeout_minutes,
     microbreak_interval_minutes, status, active_ms, total_afk_ms, total_break_ms,
     total_microbreak_ms, completed_pomodoros, highlights_during, notes_during, pages_viewed,
     words_read_estimate, started_at, ended_at";

/// SQLite database for session storage.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `~/.config/studyroom/studyroom.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StoreError> {
        let dir = data_dir().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::open_at(dir.join("studyroom.db"))
    }

    /// Open (or create) the database at `path`.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id                          TEXT PRIMARY KEY,
                book_id                     TEXT NOT NULL,
                mode                        TEXT NOT NULL,
                work_minutes                INTEGER NOT NULL,
                break_minutes               INTEGER NOT NULL,
                afk_timeout_minutes         INTEGER NOT NULL,
                microbreak_interval_minutes INTEGER NOT NULL DEFAULT 0,
                status                      TEXT NOT NULL,
                active_ms                   INTEGER NOT NULL DEFAULT 0,
                total_afk_ms                INTEGER NOT NULL DEFAULT 0,
                total_break_ms              INTEGER NOT NULL DEFAULT 0,
                total_microbreak_ms         INTEGER NOT NULL DEFAULT 0,
                completed_pomodoros         INTEGER NOT NULL DEFAULT 0,
                highlights_during           INTEGER NOT NULL DEFAULT 0,
                notes_during                INTEGER NOT NULL DEFAULT 0,
                pages_viewed                INTEGER NOT NULL DEFAULT 0,
                words_read_estimate         INTEGER NOT NULL DEFAULT 0,
                started_at                  TEXT NOT NULL,
                ended_at                    TEXT
            );

            CREATE TABLE IF NOT EXISTS highlights (
                id         TEXT PRIMARY KEY,
                book_id    TEXT NOT NULL,
                text       TEXT NOT NULL,
                note       TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_started_at ON sessions(started_at);
            CREATE INDEX IF NOT EXISTS idx_highlights_book_created ON highlights(book_id, created_at);",
        )?;
        Ok(())
    }

    /// Store a highlight made in the reader.
    pub fn add_highlight(
        &self,
        book_id: &str,
        text: &str,
        note: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Result<Highlight, StoreError> {
        let highlight = Highlight {
            id: Uuid::new_v4().to_string(),
            book_id: book_id.to_string(),
            text: text.to_string(),
            note: note.map(str::to_string),
            created_at,
        };
        self.conn.execute(
            "INSERT INTO highlights (id, book_id, text, note, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                highlight.id,
                highlight.book_id,
                highlight.text,
                highlight.note,
                ts(highlight.created_at),
            ],
        )?;
        Ok(highlight)
    }

    /// All highlights of a book, oldest first.
    pub fn list_highlights(&self, book_id: &str) -> Result<Vec<Highlight>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, book_id, text, note, created_at FROM highlights
             WHERE book_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![book_id], row_to_highlight)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Most recent sessions first.
    pub fn list_sessions(&self, limit: usize) -> Result<Vec<SessionRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY started_at DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], row_to_session)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_session(&self, id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![id],
                row_to_session,
            )
            .optional()?;
        Ok(record)
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn kv_delete(&self, key: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn ensure_updated(changed: usize, id: &str) -> Result<(), StoreError> {
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

impl SessionStore for Database {
    fn create_session_record(&mut self, record: &NewSessionRecord) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let cfg = &record.config;
        self.conn.execute(
            "INSERT INTO sessions (id, book_id, mode, work_minutes, break_minutes,
                afk_timeout_minutes, microbreak_interval_minutes, status, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                record.book_id,
                cfg.mode.as_str(),
                cfg.work_minutes,
                cfg.break_minutes,
                cfg.afk_timeout_minutes,
                cfg.microbreak_interval_minutes,
                SessionStatus::Active.as_str(),
                ts(record.started_at),
            ],
        )?;
        Ok(id)
    }

    fn update_session_record(&mut self, id: &str, patch: &SessionPatch) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE sessions SET
                status = COALESCE(?2, status),
                active_ms = COALESCE(?3, active_ms),
                completed_pomodoros = COALESCE(?4, completed_pomodoros),
                ended_at = COALESCE(?5, ended_at)
             WHERE id = ?1",
            params![
                id,
                patch.status.map(|s| s.as_str()),
                patch.active_ms,
                patch.completed_pomodoros,
                patch.ended_at.map(ts),
            ],
        )?;
        Self::ensure_updated(changed, id)
    }

    fn finalize_session_record(
        &mut self,
        id: &str,
        stats: &SessionStats,
        status: SessionStatus,
        ended_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE sessions SET
                status = ?2, active_ms = ?3, total_afk_ms = ?4, total_break_ms = ?5,
                total_microbreak_ms = ?6, completed_pomodoros = ?7, highlights_during = ?8,
                notes_during = ?9, pages_viewed = ?10, words_read_estimate = ?11, ended_at = ?12
             WHERE id = ?1",
            params![
                id,
                status.as_str(),
                stats.active_ms,
                stats.total_afk_ms,
                stats.total_break_ms,
                stats.total_microbreak_ms,
                stats.completed_pomodoros,
                stats.highlights_during,
                stats.notes_during,
                stats.pages_viewed,
                stats.words_read_estimate,
                ts(ended_at),
            ],
        )?;
        Self::ensure_updated(changed, id)
    }

    fn query_highlights(
        &self,
        book_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Highlight>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, book_id, text, note, created_at FROM highlights
             WHERE book_id = ?1 AND created_at >= ?2 AND created_at <= ?3
             ORDER BY (note IS NOT NULL) DESC, LENGTH(text) DESC, created_at ASC
             LIMIT ?4",
        )?;
        let rows = stmt.query_map(
            params![book_id, ts(since), ts(until), limit as i64],
            row_to_highlight,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

/// Fixed-width RFC 3339 so that text comparison orders by time.
fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn row_to_highlight(row: &Row<'_>) -> rusqlite::Result<Highlight> {
    Ok(Highlight {
        id: row.get(0)?,
        book_id: row.get(1)?,
        text: row.get(2)?,
        note: row.get(3)?,
        created_at: parse_ts(4, &row.get::<_, String>(4)?)?,
    })
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    let mode: String = row.get(2)?;
    let mode = mode
        .parse::<SessionMode>()
        .map_err(|e| conversion_error(2, e))?;
    let status: String = row.get(7)?;
    let status = SessionStatus::parse(&status)
        .ok_or_else(|| conversion_error(7, format!("unknown status: {status}")))?;
    let ended_at = match row.get::<_, Option<String>>(18)? {
        Some(raw) => Some(parse_ts(18, &raw)?),
        None => None,
    };

    Ok(SessionRecord {
        id: row.get(0)?,
        book_id: row.get(1)?,
        config: SessionConfig {
            mode,
            work_minutes: row.get(3)?,
            break_minutes: row.get(4)?,
            afk_timeout_minutes: row.get(5)?,
            microbreak_interval_minutes: row.get(6)?,
        },
        status,
        stats: SessionStats {
            active_ms: row.get(8)?,
            total_afk_ms: row.get(9)?,
            total_break_ms: row.get(10)?,
            total_microbreak_ms: row.get(11)?,
            completed_pomodoros: row.get(12)?,
            highlights_during: row.get(13)?,
            notes_during: row.get(14)?,
            pages_viewed: row.get(15)?,
            words_read_estimate: row.get(16)?,
        },
        started_at: parse_ts(17, &row.get::<_, String>(17)?)?,
        ended_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_record(book_id: &str, started_at: DateTime<Utc>) -> NewSessionRecord {
        NewSessionRecord {
            book_id: book_id.into(),
            config: SessionConfig::pomodoro(25, 5).with_microbreak_interval(20),
            started_at,
        }
    }

    #[test]
    fn create_and_finalize_session() {
        let mut db = Database::open_memory().unwrap();
        let start = Utc::now();
        let id = db.create_session_record(&new_record("b1", start)).unwrap();

        let record = db.get_session(&id).unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::Active);
        assert_eq!(record.config.microbreak_interval_minutes, 20);
        assert!(record.ended_at.is_none());

        let stats = SessionStats {
            active_ms: 1_500_000,
            total_afk_ms: 60_000,
            completed_pomodoros: 1,
            pages_viewed: 12,
            words_read_estimate: 3_600,
            ..SessionStats::default()
        };
        let end = start + Duration::minutes(30);
        db.finalize_session_record(&id, &stats, SessionStatus::Completed, end)
            .unwrap();

        let record = db.get_session(&id).unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::Completed);
        assert_eq!(record.stats, stats);
        assert_eq!(record.ended_at.map(|t| t.timestamp_millis()), Some(end.timestamp_millis()));
    }

    #[test]
    fn patch_only_touches_given_fields() {
        let mut db = Database::open_memory().unwrap();
        let id = db.create_session_record(&new_record("b1", Utc::now())).unwrap();
        db.update_session_record(
            &id,
            &SessionPatch {
                active_ms: Some(42_000),
                ..SessionPatch::default()
            },
        )
        .unwrap();
        db.update_session_record(
            &id,
            &SessionPatch {
                status: Some(SessionStatus::Abandoned),
                ..SessionPatch::default()
            },
        )
        .unwrap();
        let record = db.get_session(&id).unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::Abandoned);
        assert_eq!(record.stats.active_ms, 42_000);
        assert_eq!(record.stats.total_afk_ms, 0);
    }

    #[test]
    fn updating_missing_session_is_not_found() {
        let mut db = Database::open_memory().unwrap();
        let err = db
            .update_session_record("nope", &SessionPatch::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn highlights_ranked_within_window() {
        let db = Database::open_memory().unwrap();
        let start = Utc::now();
        db.add_highlight("b1", "too early", None, start - Duration::seconds(5))
            .unwrap();
        db.add_highlight("b1", "short", None, start + Duration::seconds(10))
            .unwrap();
        db.add_highlight("b1", "a considerably longer line", None, start + Duration::seconds(20))
            .unwrap();
        db.add_highlight("b1", "mine", Some("remember"), start + Duration::seconds(30))
            .unwrap();
        db.add_highlight("b2", "elsewhere", Some("x"), start + Duration::seconds(30))
            .unwrap();

        let found = db
            .query_highlights("b1", start, start + Duration::minutes(1), 2)
            .unwrap();
        let texts: Vec<_> = found.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, ["mine", "a considerably longer line"]);
    }

    #[test]
    fn sessions_listed_newest_first() {
        let mut db = Database::open_memory().unwrap();
        let start = Utc::now();
        let older = db.create_session_record(&new_record("b1", start)).unwrap();
        let newer = db
            .create_session_record(&new_record("b2", start + Duration::hours(1)))
            .unwrap();
        let list = db.list_sessions(10).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, newer);
        assert_eq!(list[1].id, older);
    }

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "hello");
        db.kv_delete("test").unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
    }

    #[test]
    fn file_database_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("studyroom.db");
        let id = {
            let mut db = Database::open_at(&path).unwrap();
            db.create_session_record(&new_record("b1", Utc::now())).unwrap()
        };
        let db = Database::open_at(&path).unwrap();
        assert!(db.get_session(&id).unwrap().is_some());
    }
}
