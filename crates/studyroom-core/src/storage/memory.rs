//! In-process session store.
//!
//! Keeps records in a map behind an `Arc<Mutex<_>>` so a test can hold a
//! clone and inspect what the engine wrote. Writes can be made to fail to
//! exercise the engine's persistence-failure policy.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    rank_highlights, Highlight, NewSessionRecord, SessionPatch, SessionRecord, SessionStatus,
    SessionStore,
};
use crate::error::StoreError;
use crate::session::SessionStats;

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<String, SessionRecord>,
    highlights: Vec<Highlight>,
    fail_writes: bool,
    write_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes every subsequent write fail with `StoreError::Unavailable`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    pub fn session(&self, id: &str) -> Option<SessionRecord> {
        self.lock().sessions.get(id).cloned()
    }

    pub fn sessions(&self) -> Vec<SessionRecord> {
        let mut list: Vec<_> = self.lock().sessions.values().cloned().collect();
        list.sort_by_key(|r| r.started_at);
        list
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.lock().write_count
    }

    pub fn add_highlight(
        &self,
        book_id: &str,
        text: &str,
        note: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Highlight {
        let highlight = Highlight {
            id: Uuid::new_v4().to_string(),
            book_id: book_id.to_string(),
            text: text.to_string(),
            note: note.map(str::to_string),
            created_at,
        };
        self.lock().highlights.push(highlight.clone());
        highlight
    }
}

impl Inner {
    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Unavailable("writes disabled".into()));
        }
        Ok(())
    }

    fn record_mut(&mut self, id: &str) -> Result<&mut SessionRecord, StoreError> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

impl SessionStore for MemoryStore {
    fn create_session_record(&mut self, record: &NewSessionRecord) -> Result<String, StoreError> {
        let mut inner = self.lock();
        inner.check_writable()?;
        let id = Uuid::new_v4().to_string();
        inner.sessions.insert(
            id.clone(),
            SessionRecord {
                id: id.clone(),
                book_id: record.book_id.clone(),
                config: record.config.clone(),
                status: SessionStatus::Active,
                stats: SessionStats::default(),
                started_at: record.started_at,
                ended_at: None,
            },
        );
        inner.write_count += 1;
        Ok(id)
    }

    fn update_session_record(&mut self, id: &str, patch: &SessionPatch) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.check_writable()?;
        let record = inner.record_mut(id)?;
        if let Some(status) = patch.status {
            record.status = status;
        }
        if let Some(active_ms) = patch.active_ms {
            record.stats.active_ms = active_ms;
        }
        if let Some(pomodoros) = patch.completed_pomodoros {
            record.stats.completed_pomodoros = pomodoros;
        }
        if let Some(ended_at) = patch.ended_at {
            record.ended_at = Some(ended_at);
        }
        inner.write_count += 1;
        Ok(())
    }

    fn finalize_session_record(
        &mut self,
        id: &str,
        stats: &SessionStats,
        status: SessionStatus,
        ended_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.check_writable()?;
        let record = inner.record_mut(id)?;
        record.stats = stats.clone();
        record.status = status;
        record.ended_at = Some(ended_at);
        inner.write_count += 1;
        Ok(())
    }

    fn query_highlights(
        &self,
        book_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Highlight>, StoreError> {
        let mut found: Vec<_> = self
            .lock()
            .highlights
            .iter()
            .filter(|h| h.book_id == book_id && h.created_at >= since && h.created_at <= until)
            .cloned()
            .collect();
        rank_highlights(&mut found);
        found.truncate(limit);
        Ok(found)
    }
}
