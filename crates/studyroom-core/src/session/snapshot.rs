use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::SessionMode;
use super::stats::SessionStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    PausedAfk,
    Completed,
    Abandoned,
}

/// Pomodoro sub-state. Free-mode sessions read in `Idle` for their whole life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Work,
    Break,
    Idle,
}

/// Read-only projection of the engine, re-emitted after every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Option<String>,
    pub book_id: Option<String>,
    pub mode: Option<SessionMode>,
    pub state: SessionState,
    pub phase: Phase,
    pub active_ms: u64,
    pub phase_elapsed_ms: u64,
    pub phase_started_at: Option<DateTime<Utc>>,
    /// Pomodoro only.
    pub phase_remaining_ms: Option<u64>,
    pub stats: SessionStats,
    /// AFK time since the last accounting point, not yet in `stats.total_afk_ms`.
    pub pending_afk_ms: u64,
    pub microbreak_due: bool,
    pub microbreak_active: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub at: DateTime<Utc>,
}

impl SessionSnapshot {
    /// Snapshot with no session behind it.
    pub fn idle(at: DateTime<Utc>) -> Self {
        Self {
            session_id: None,
            book_id: None,
            mode: None,
            state: SessionState::Idle,
            phase: Phase::Idle,
            active_ms: 0,
            phase_elapsed_ms: 0,
            phase_started_at: None,
            phase_remaining_ms: None,
            stats: SessionStats::default(),
            pending_afk_ms: 0,
            microbreak_due: false,
            microbreak_active: false,
            started_at: None,
            at,
        }
    }

    /// Re-labels a final snapshot once the session has left the engine.
    pub(crate) fn terminal(mut self, state: SessionState) -> Self {
        self.state = state;
        self.microbreak_due = false;
        self.microbreak_active = false;
        self.pending_afk_ms = 0;
        self
    }
}
