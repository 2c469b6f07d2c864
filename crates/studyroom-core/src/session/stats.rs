//! Session counters.
//!
//! Every millisecond of a session lands in exactly one of four buckets:
//! active reading, AFK, Pomodoro break, or microbreak. Their sum tracks the
//! wall-clock time since the session started.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub active_ms: u64,
    pub total_afk_ms: u64,
    pub total_break_ms: u64,
    pub total_microbreak_ms: u64,
    pub completed_pomodoros: u32,
    pub highlights_during: u32,
    pub notes_during: u32,
    pub pages_viewed: u32,
    pub words_read_estimate: u64,
}

impl SessionStats {
    /// Sum of the four time buckets.
    pub fn tracked_ms(&self) -> u64 {
        self.active_ms
            .saturating_add(self.total_afk_ms)
            .saturating_add(self.total_break_ms)
            .saturating_add(self.total_microbreak_ms)
    }

    pub(crate) fn charge_active(&mut self, ms: u64) {
        self.active_ms = self.active_ms.saturating_add(ms);
    }

    pub(crate) fn charge_break(&mut self, ms: u64) {
        self.total_break_ms = self.total_break_ms.saturating_add(ms);
    }

    pub(crate) fn charge_microbreak(&mut self, ms: u64) {
        self.total_microbreak_ms = self.total_microbreak_ms.saturating_add(ms);
    }

    pub(crate) fn charge_afk(&mut self, ms: u64) {
        self.total_afk_ms = self.total_afk_ms.saturating_add(ms);
    }

    /// Moves active time that turned out to be idle into the AFK bucket.
    /// `tracked_ms` is unchanged.
    pub(crate) fn reclassify_as_afk(&mut self, ms: u64) {
        let moved = ms.min(self.active_ms);
        self.active_ms -= moved;
        self.total_afk_ms = self.total_afk_ms.saturating_add(moved);
    }

    pub(crate) fn complete_pomodoro(&mut self) {
        self.completed_pomodoros = self.completed_pomodoros.saturating_add(1);
    }

    pub(crate) fn record_page_view(&mut self, words: u32) {
        self.pages_viewed = self.pages_viewed.saturating_add(1);
        self.words_read_estimate = self.words_read_estimate.saturating_add(u64::from(words));
    }

    pub(crate) fn record_highlight(&mut self) {
        self.highlights_during = self.highlights_during.saturating_add(1);
    }

    pub(crate) fn record_note(&mut self) {
        self.notes_during = self.notes_during.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracked_ms_sums_all_buckets() {
        let mut stats = SessionStats::default();
        stats.charge_active(1_000);
        stats.charge_afk(2_000);
        stats.charge_break(3_000);
        stats.charge_microbreak(4_000);
        assert_eq!(stats.tracked_ms(), 10_000);
    }

    #[test]
    fn reclassify_keeps_tracked_total() {
        let mut stats = SessionStats::default();
        stats.charge_active(500);
        stats.reclassify_as_afk(2_000);
        assert_eq!(stats.active_ms, 0);
        assert_eq!(stats.total_afk_ms, 500);
        assert_eq!(stats.tracked_ms(), 500);
    }

    #[test]
    fn page_views_accumulate_words() {
        let mut stats = SessionStats::default();
        stats.record_page_view(250);
        stats.record_page_view(300);
        assert_eq!(stats.pages_viewed, 2);
        assert_eq!(stats.words_read_estimate, 550);
    }
}
