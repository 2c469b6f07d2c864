//! Microbreak reminders.
//!
//! A microbreak is a short optional pause, independent of the Pomodoro
//! phase. Becoming due only raises a flag; the reader decides whether to take
//! it, postpone it, or silence reminders for the rest of the day.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::elapsed_ms;

/// A postponed reminder fires again after this many minutes, whatever the
/// configured interval.
pub const POSTPONE_MINUTES: i64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MicrobreakScheduler {
    interval_minutes: u32,
    last_at: DateTime<Utc>,
    due: bool,
    active_since: Option<DateTime<Utc>>,
    suppressed: bool,
}

impl MicrobreakScheduler {
    pub fn new(interval_minutes: u32, now: DateTime<Utc>, suppressed: bool) -> Self {
        Self {
            interval_minutes,
            last_at: now,
            due: false,
            active_since: None,
            suppressed,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.interval_minutes > 0
    }

    pub fn is_due(&self) -> bool {
        self.due
    }

    pub fn is_active(&self) -> bool {
        self.active_since.is_some()
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    pub fn last_at(&self) -> DateTime<Utc> {
        self.last_at
    }

    /// Returns `true` only on the check that flips the reminder to due.
    pub fn check_due(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_enabled() || self.suppressed || self.due || self.is_active() {
            return false;
        }
        let interval_ms = u64::from(self.interval_minutes) * 60_000;
        if elapsed_ms(self.last_at, now) >= interval_ms {
            self.due = true;
            return true;
        }
        false
    }

    pub fn take(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_active() {
            return false;
        }
        self.due = false;
        self.active_since = Some(now);
        true
    }

    /// Ends the running microbreak and returns how long it lasted.
    pub fn end(&mut self, now: DateTime<Utc>) -> Option<u64> {
        let since = self.active_since.take()?;
        self.last_at = now;
        Some(elapsed_ms(since, now))
    }

    /// Back-dates the last microbreak so the next reminder lands
    /// [`POSTPONE_MINUTES`] from now. Returns when that will be.
    pub fn postpone(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.is_enabled() || self.is_active() {
            return None;
        }
        self.due = false;
        self.last_at =
            now - Duration::minutes(i64::from(self.interval_minutes) - POSTPONE_MINUTES);
        Some(now + Duration::minutes(POSTPONE_MINUTES))
    }

    pub fn set_suppressed(&mut self, suppressed: bool) {
        self.suppressed = suppressed;
        if suppressed {
            self.due = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(start: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
        start + Duration::seconds(secs)
    }

    #[test]
    fn disabled_scheduler_never_fires() {
        let start = Utc::now();
        let mut mb = MicrobreakScheduler::new(0, start, false);
        assert!(!mb.check_due(at(start, 86_400)));
        assert!(mb.postpone(at(start, 10)).is_none());
    }

    #[test]
    fn due_fires_once_per_interval() {
        let start = Utc::now();
        let mut mb = MicrobreakScheduler::new(5, start, false);
        assert!(!mb.check_due(at(start, 299)));
        assert!(mb.check_due(at(start, 300)));
        assert!(!mb.check_due(at(start, 301)));
        assert!(mb.is_due());
    }

    #[test]
    fn postpone_waits_five_minutes_for_long_intervals() {
        let start = Utc::now();
        let mut mb = MicrobreakScheduler::new(20, start, false);
        assert!(mb.check_due(at(start, 1200)));
        let remind_at = mb.postpone(at(start, 1200)).unwrap();
        assert_eq!(remind_at, at(start, 1500));
        assert!(!mb.is_due());
        assert!(!mb.check_due(at(start, 1499)));
        assert!(mb.check_due(at(start, 1500)));
    }

    #[test]
    fn postpone_waits_five_minutes_for_short_intervals() {
        let start = Utc::now();
        let mut mb = MicrobreakScheduler::new(2, start, false);
        assert!(mb.check_due(at(start, 120)));
        mb.postpone(at(start, 120));
        assert!(!mb.check_due(at(start, 419)));
        assert!(mb.check_due(at(start, 420)));
    }

    #[test]
    fn take_and_end_restart_the_interval() {
        let start = Utc::now();
        let mut mb = MicrobreakScheduler::new(5, start, false);
        mb.check_due(at(start, 300));
        assert!(mb.take(at(start, 300)));
        assert!(!mb.is_due());
        assert!(!mb.take(at(start, 310)));
        assert_eq!(mb.end(at(start, 330)), Some(30_000));
        assert_eq!(mb.last_at(), at(start, 330));
        assert!(!mb.check_due(at(start, 629)));
        assert!(mb.check_due(at(start, 630)));
    }

    #[test]
    fn suppression_clears_and_blocks_reminders() {
        let start = Utc::now();
        let mut mb = MicrobreakScheduler::new(5, start, false);
        mb.check_due(at(start, 300));
        mb.set_suppressed(true);
        assert!(!mb.is_due());
        assert!(!mb.check_due(at(start, 900)));
        mb.set_suppressed(false);
        assert!(mb.check_due(at(start, 901)));
    }
}
