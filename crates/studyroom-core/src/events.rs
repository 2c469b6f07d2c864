use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{Phase, SessionMode, SessionStats};

/// Every state change of a study session produces an Event.
/// Front-ends drain them from the controller; snapshots carry the full state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionStarted {
        session_id: String,
        book_id: String,
        mode: SessionMode,
        at: DateTime<Utc>,
    },
    PhaseChanged {
        from: Phase,
        to: Phase,
        completed_pomodoros: u32,
        at: DateTime<Utc>,
    },
    BreakSkipped {
        break_elapsed_ms: u64,
        at: DateTime<Utc>,
    },
    /// Reader went idle. `since` is back-dated to the last activity.
    AfkStarted {
        since: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    AfkEnded {
        afk_ms: u64,
        at: DateTime<Utc>,
    },
    MicrobreakDue {
        at: DateTime<Utc>,
    },
    MicrobreakStarted {
        at: DateTime<Utc>,
    },
    MicrobreakEnded {
        duration_ms: u64,
        at: DateTime<Utc>,
    },
    MicrobreakPostponed {
        remind_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    MicrobreaksSuppressed {
        suppressed: bool,
        at: DateTime<Utc>,
    },
    SessionCompleted {
        session_id: String,
        stats: SessionStats,
        at: DateTime<Utc>,
    },
    SessionAbandoned {
        session_id: String,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// Transitions worth a progress checkpoint at the store.
    pub fn is_checkpoint(&self) -> bool {
        matches!(
            self,
            Event::PhaseChanged { .. }
                | Event::BreakSkipped { .. }
                | Event::AfkStarted { .. }
                | Event::AfkEnded { .. }
        )
    }
}
