//! Study session state machine.
//!
//! A [`LiveSession`] exists only between `start` and `end`/`abandon`. It
//! does not own a timer: the caller feeds it wall-clock instants through
//! [`LiveSession::tick`] and it charges the real time elapsed since the last
//! accounting point, so a late or missed tick (system sleep) loses nothing.
//!
//! ## Per-tick order
//!
//! ```text
//! charge elapsed time (split at phase boundaries, cut at the idle deadline) -> microbreak check
//! ```
//!
//! AFK is back-dated: when the timeout trips, active time charged since the
//! last activity moves to the AFK bucket, and the AFK interval starts there.
//! While AFK, each tick charges the time since the last accounting point to
//! AFK, so the bucket total never drops.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::config::{SessionConfig, SessionMode};
use super::elapsed_ms;
use super::microbreak::MicrobreakScheduler;
use super::snapshot::{Phase, SessionSnapshot, SessionState};
use super::stats::SessionStats;
use crate::events::Event;

/// Nominal driver cadence. Only used to flag reconciled gaps in logs.
pub const TICK_MS: u64 = 1_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveSession {
    session_id: String,
    book_id: String,
    config: SessionConfig,
    stats: SessionStats,
    phase: Phase,
    phase_elapsed_ms: u64,
    phase_started_at: DateTime<Utc>,
    started_at: DateTime<Utc>,
    /// Time up to which elapsed time has been charged to a bucket.
    accounted_until: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    /// Accounting point at or before the last activity. A back-dated AFK
    /// interval opens here.
    idle_anchor: DateTime<Utc>,
    /// Active time charged since `idle_anchor`.
    idle_charged_ms: u64,
    afk_since: Option<DateTime<Utc>>,
    microbreak: MicrobreakScheduler,
}

impl LiveSession {
    pub fn new(
        session_id: String,
        book_id: String,
        config: SessionConfig,
        now: DateTime<Utc>,
        microbreaks_suppressed: bool,
    ) -> Self {
        let phase = match config.mode {
            SessionMode::Pomodoro => Phase::Work,
            SessionMode::Free => Phase::Idle,
        };
        let microbreak =
            MicrobreakScheduler::new(config.microbreak_interval_minutes, now, microbreaks_suppressed);
        Self {
            session_id,
            book_id,
            config,
            stats: SessionStats::default(),
            phase,
            phase_elapsed_ms: 0,
            phase_started_at: now,
            started_at: now,
            accounted_until: now,
            last_activity: now,
            idle_anchor: now,
            idle_charged_ms: 0,
            afk_since: None,
            microbreak,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn phase_elapsed_ms(&self) -> u64 {
        self.phase_elapsed_ms
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_afk(&self) -> bool {
        self.afk_since.is_some()
    }

    pub fn state(&self) -> SessionState {
        if self.is_afk() {
            SessionState::PausedAfk
        } else {
            SessionState::Running
        }
    }

    pub fn microbreak(&self) -> &MicrobreakScheduler {
        &self.microbreak
    }

    fn phase_length_ms(&self) -> Option<u64> {
        match (self.config.mode, self.phase) {
            (SessionMode::Pomodoro, Phase::Work) => Some(self.config.work_ms()),
            (SessionMode::Pomodoro, Phase::Break) => Some(self.config.break_ms()),
            _ => None,
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> SessionSnapshot {
        SessionSnapshot {
            session_id: Some(self.session_id.clone()),
            book_id: Some(self.book_id.clone()),
            mode: Some(self.config.mode),
            state: self.state(),
            phase: self.phase,
            active_ms: self.stats.active_ms,
            phase_elapsed_ms: self.phase_elapsed_ms,
            phase_started_at: Some(self.phase_started_at),
            phase_remaining_ms: self
                .phase_length_ms()
                .map(|len| len.saturating_sub(self.phase_elapsed_ms)),
            stats: self.stats.clone(),
            pending_afk_ms: if self.is_afk() {
                elapsed_ms(self.accounted_until, now)
            } else {
                0
            },
            microbreak_due: self.microbreak.is_due(),
            microbreak_active: self.microbreak.is_active(),
            started_at: Some(self.started_at),
            at: now,
        }
    }

    // ── Driver ───────────────────────────────────────────────────────

    /// Advances the session to `now`.
    pub fn tick(&mut self, now: DateTime<Utc>, events: &mut Vec<Event>) {
        if self.is_afk() {
            self.charge_pending_afk(now);
            return;
        }
        self.advance_to(now, events);
        if self.is_afk() {
            return;
        }
        if self.phase != Phase::Break && self.microbreak.check_due(now) {
            debug!(session_id = %self.session_id, "microbreak due");
            events.push(Event::MicrobreakDue { at: now });
        }
    }

    /// Reading time left at `at` before the idle timeout trips.
    fn afk_room_ms(&self, at: DateTime<Utc>) -> u64 {
        self.config
            .afk_timeout_ms()
            .saturating_sub(elapsed_ms(self.last_activity, at))
    }

    fn enter_afk(&mut self, now: DateTime<Utc>, events: &mut Vec<Event>) {
        self.stats.reclassify_as_afk(self.idle_charged_ms);
        self.phase_elapsed_ms = self.phase_elapsed_ms.saturating_sub(self.idle_charged_ms);
        self.idle_charged_ms = 0;

        let since = self.idle_anchor;
        self.afk_since = Some(since);
        info!(session_id = %self.session_id, %since, "reader went AFK");
        events.push(Event::AfkStarted { since, at: now });
    }

    fn charge_pending_afk(&mut self, now: DateTime<Utc>) {
        self.stats.charge_afk(elapsed_ms(self.accounted_until, now));
        self.accounted_until = self.accounted_until.max(now);
    }

    /// Charges the time since the last accounting point, phase by phase.
    /// Reading stops at the idle deadline of each work phase; the session
    /// goes AFK there and the rest of the gap is AFK time.
    fn advance_to(&mut self, now: DateTime<Utc>, events: &mut Vec<Event>) {
        let mut remaining = elapsed_ms(self.accounted_until, now);
        if remaining == 0 {
            return;
        }
        if remaining > 2 * TICK_MS {
            debug!(
                session_id = %self.session_id,
                gap_ms = remaining,
                "reconciling tick gap"
            );
        }

        let mut cursor = self.accounted_until;
        self.accounted_until = now;

        while remaining > 0 {
            if self.microbreak.is_active() {
                // Phase clock is frozen during a microbreak.
                self.stats.charge_microbreak(remaining);
                return;
            }

            if self.phase == Phase::Break {
                let length = self.config.break_ms();
                let step = remaining.min(length.saturating_sub(self.phase_elapsed_ms));
                self.stats.charge_break(step);
                self.phase_elapsed_ms += step;
                remaining -= step;
                cursor += Duration::milliseconds(step as i64);
                if self.phase_elapsed_ms >= length {
                    self.enter_work(cursor, events);
                }
                continue;
            }

            let room = self.afk_room_ms(cursor);
            let phase_left = self
                .phase_length_ms()
                .map(|length| length.saturating_sub(self.phase_elapsed_ms));
            let step = remaining.min(room).min(phase_left.unwrap_or(u64::MAX));
            self.charge_reading(step);
            remaining -= step;
            cursor += Duration::milliseconds(step as i64);

            if step == room {
                self.enter_afk(now, events);
                self.stats.charge_afk(remaining);
                return;
            }
            if phase_left == Some(step) {
                self.enter_break(cursor, events);
            }
        }
    }

    fn charge_reading(&mut self, ms: u64) {
        self.stats.charge_active(ms);
        self.phase_elapsed_ms += ms;
        self.idle_charged_ms += ms;
    }

    fn enter_break(&mut self, at: DateTime<Utc>, events: &mut Vec<Event>) {
        self.stats.complete_pomodoro();
        self.switch_phase(Phase::Break, at, events);
    }

    fn enter_work(&mut self, at: DateTime<Utc>, events: &mut Vec<Event>) {
        // Idle time during the break never counts toward AFK.
        self.last_activity = self.last_activity.max(at);
        self.idle_anchor = at;
        self.idle_charged_ms = 0;
        self.switch_phase(Phase::Work, at, events);
    }

    fn switch_phase(&mut self, to: Phase, at: DateTime<Utc>, events: &mut Vec<Event>) {
        let from = self.phase;
        self.phase = to;
        self.phase_elapsed_ms = 0;
        self.phase_started_at = at;
        info!(
            session_id = %self.session_id,
            ?from,
            ?to,
            completed_pomodoros = self.stats.completed_pomodoros,
            "phase changed"
        );
        events.push(Event::PhaseChanged {
            from,
            to,
            completed_pomodoros: self.stats.completed_pomodoros,
            at,
        });
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Resets the idle timer. While AFK this also resumes the session.
    pub fn report_activity(&mut self, now: DateTime<Utc>, events: &mut Vec<Event>) {
        if !self.is_afk() {
            // Settle first so time up to this activity stays active.
            self.advance_to(now, events);
        }
        if self.is_afk() {
            self.resume(now, events);
            return;
        }
        self.mark_activity(now);
    }

    fn mark_activity(&mut self, now: DateTime<Utc>) {
        self.last_activity = self.last_activity.max(now);
        self.idle_anchor = self.accounted_until;
        self.idle_charged_ms = 0;
    }

    /// Explicit "I'm still here". Returns `false` if the session was not AFK.
    pub fn confirm_presence(&mut self, now: DateTime<Utc>, events: &mut Vec<Event>) -> bool {
        if !self.is_afk() {
            return false;
        }
        self.resume(now, events);
        true
    }

    fn resume(&mut self, now: DateTime<Utc>, events: &mut Vec<Event>) {
        let Some(since) = self.afk_since.take() else {
            return;
        };
        self.charge_pending_afk(now);
        let afk_ms = elapsed_ms(since, now);
        self.mark_activity(now);
        info!(session_id = %self.session_id, afk_ms, "reader back from AFK");
        events.push(Event::AfkEnded { afk_ms, at: now });
    }

    /// Ends the current break early. Returns `false` outside a break.
    pub fn skip_break(&mut self, now: DateTime<Utc>, events: &mut Vec<Event>) -> bool {
        if self.phase != Phase::Break {
            return false;
        }
        self.advance_to(now, events);
        if self.phase != Phase::Break {
            // The break ran out on its own while settling.
            return false;
        }
        let break_elapsed_ms = self.phase_elapsed_ms;
        events.push(Event::BreakSkipped {
            break_elapsed_ms,
            at: now,
        });
        self.enter_work(now, events);
        true
    }

    pub fn microbreak_take(&mut self, now: DateTime<Utc>, events: &mut Vec<Event>) -> bool {
        if self.is_afk() || self.phase == Phase::Break || self.microbreak.is_active() {
            return false;
        }
        self.advance_to(now, events);
        if self.is_afk() || self.phase == Phase::Break || !self.microbreak.take(now) {
            return false;
        }
        debug!(session_id = %self.session_id, "microbreak started");
        events.push(Event::MicrobreakStarted { at: now });
        true
    }

    pub fn microbreak_end(&mut self, now: DateTime<Utc>, events: &mut Vec<Event>) -> bool {
        if !self.microbreak.is_active() {
            return false;
        }
        self.advance_to(now, events);
        let Some(duration_ms) = self.microbreak.end(now) else {
            return false;
        };
        self.mark_activity(now);
        debug!(session_id = %self.session_id, duration_ms, "microbreak ended");
        events.push(Event::MicrobreakEnded {
            duration_ms,
            at: now,
        });
        true
    }

    pub fn microbreak_postpone(&mut self, now: DateTime<Utc>, events: &mut Vec<Event>) -> bool {
        let Some(remind_at) = self.microbreak.postpone(now) else {
            return false;
        };
        debug!(session_id = %self.session_id, %remind_at, "microbreak postponed");
        events.push(Event::MicrobreakPostponed { remind_at, at: now });
        true
    }

    pub fn set_microbreaks_suppressed(
        &mut self,
        suppressed: bool,
        now: DateTime<Utc>,
        events: &mut Vec<Event>,
    ) {
        if self.microbreak.is_suppressed() == suppressed {
            return;
        }
        self.microbreak.set_suppressed(suppressed);
        events.push(Event::MicrobreaksSuppressed {
            suppressed,
            at: now,
        });
    }

    pub fn record_page_view(&mut self, words: u32, now: DateTime<Utc>, events: &mut Vec<Event>) {
        self.stats.record_page_view(words);
        self.report_activity(now, events);
    }

    pub fn record_highlight(&mut self, now: DateTime<Utc>, events: &mut Vec<Event>) {
        self.stats.record_highlight();
        self.report_activity(now, events);
    }

    pub fn record_note(&mut self, now: DateTime<Utc>, events: &mut Vec<Event>) {
        self.stats.record_note();
        self.report_activity(now, events);
    }

    /// Brings the accounting up to `now` and closes any open AFK interval or
    /// microbreak. The session is not usable afterwards.
    pub fn finish(&mut self, now: DateTime<Utc>, events: &mut Vec<Event>) -> SessionStats {
        if !self.is_afk() {
            self.advance_to(now, events);
        }
        if self.afk_since.take().is_some() {
            self.charge_pending_afk(now);
        }
        self.microbreak.end(now);
        self.stats.clone()
    }
}
