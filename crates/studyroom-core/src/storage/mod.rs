mod config;
pub mod database;
pub mod memory;

pub use config::{Config, SessionDefaults, TickerConfig, WrapUpConfig};
pub use database::Database;
pub use memory::MemoryStore;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::session::{SessionConfig, SessionStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            "abandoned" => Some(SessionStatus::Abandoned),
            _ => None,
        }
    }
}

/// What the engine knows when a session starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSessionRecord {
    pub book_id: String,
    pub config: SessionConfig,
    pub started_at: DateTime<Utc>,
}

/// Partial update to a session record. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionPatch {
    pub status: Option<SessionStatus>,
    pub active_ms: Option<u64>,
    pub completed_pomodoros: Option<u32>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// A session as persisted by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub book_id: String,
    pub config: SessionConfig,
    pub status: SessionStatus,
    pub stats: SessionStats,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub id: String,
    pub book_id: String,
    pub text: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The persistence collaborator the session engine writes through.
///
/// The engine issues at most one call per transition and never overlaps
/// writes for the same session id.
pub trait SessionStore: Send {
    /// Creates a record with `status = active` and returns its id.
    fn create_session_record(&mut self, record: &NewSessionRecord) -> Result<String, StoreError>;

    fn update_session_record(&mut self, id: &str, patch: &SessionPatch) -> Result<(), StoreError>;

    /// Writes the final counters and terminal status.
    fn finalize_session_record(
        &mut self,
        id: &str,
        stats: &SessionStats,
        status: SessionStatus,
        ended_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Highlights for `book_id` created in `[since, until]`, most relevant
    /// first. Relevance is the store's policy.
    fn query_highlights(
        &self,
        book_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Highlight>, StoreError>;
}

impl<S: SessionStore + ?Sized> SessionStore for Box<S> {
    fn create_session_record(&mut self, record: &NewSessionRecord) -> Result<String, StoreError> {
        (**self).create_session_record(record)
    }

    fn update_session_record(&mut self, id: &str, patch: &SessionPatch) -> Result<(), StoreError> {
        (**self).update_session_record(id, patch)
    }

    fn finalize_session_record(
        &mut self,
        id: &str,
        stats: &SessionStats,
        status: SessionStatus,
        ended_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        (**self).finalize_session_record(id, stats, status, ended_at)
    }

    fn query_highlights(
        &self,
        book_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Highlight>, StoreError> {
        (**self).query_highlights(book_id, since, until, limit)
    }
}

/// Orders highlights the way both bundled stores rank them: annotated ones
/// first, then longer passages, then oldest.
pub(crate) fn rank_highlights(highlights: &mut [Highlight]) {
    highlights.sort_by(|a, b| {
        b.note
            .is_some()
            .cmp(&a.note.is_some())
            .then_with(|| b.text.chars().count().cmp(&a.text.chars().count()))
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
}

/// Returns `~/.config/studyroom[-dev]/` based on STUDYROOM_ENV.
///
/// Set STUDYROOM_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("STUDYROOM_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("studyroom-dev")
    } else {
        base_dir.join("studyroom")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
