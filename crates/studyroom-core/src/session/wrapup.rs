//! Session wrap-up.
//!
//! Built once, when a session ends successfully: the final counters plus the
//! highlights the reader made while the session ran.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::config::SessionMode;
use super::elapsed_ms;
use super::machine::LiveSession;
use super::stats::SessionStats;
use crate::storage::{Highlight, SessionStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrapUp {
    pub session_id: String,
    pub book_id: String,
    pub mode: SessionMode,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub stats: SessionStats,
    /// Most relevant first, as ranked by the store.
    pub highlights: Vec<Highlight>,
    /// The store could not be asked for highlights; `highlights` is empty.
    #[serde(default)]
    pub highlights_unavailable: bool,
}

impl WrapUp {
    /// Share of the session spent actively reading, 0.0 ..= 1.0.
    pub fn focus_ratio(&self) -> f64 {
        if self.elapsed_ms == 0 {
            return 0.0;
        }
        (self.stats.active_ms as f64 / self.elapsed_ms as f64).min(1.0)
    }
}

#[derive(Debug, Clone)]
pub struct WrapUpAssembler {
    highlight_limit: usize,
}

impl WrapUpAssembler {
    pub fn new(highlight_limit: usize) -> Self {
        Self { highlight_limit }
    }

    /// `stats` are the finished counters of `live`.
    pub fn assemble<S: SessionStore + ?Sized>(
        &self,
        store: &S,
        live: &LiveSession,
        stats: SessionStats,
        ended_at: DateTime<Utc>,
    ) -> WrapUp {
        let session_id = live.session_id().to_string();
        let book_id = live.book_id().to_string();
        let started_at = live.started_at();

        let (highlights, highlights_unavailable) =
            match store.query_highlights(&book_id, started_at, ended_at, self.highlight_limit) {
                Ok(list) => (list, false),
                Err(e) => {
                    warn!(%session_id, error = %e, "highlight query failed, wrap-up without highlights");
                    (Vec::new(), true)
                }
            };

        WrapUp {
            session_id,
            book_id,
            mode: live.config().mode,
            started_at,
            ended_at,
            elapsed_ms: elapsed_ms(started_at, ended_at),
            stats,
            highlights,
            highlights_unavailable,
        }
    }
}

impl Default for WrapUpAssembler {
    fn default() -> Self {
        Self::new(5)
    }
}
