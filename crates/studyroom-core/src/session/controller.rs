//! Session lifecycle and persistence policy.
//!
//! The controller owns at most one [`LiveSession`]. Every command runs to
//! completion before the next one starts; the caller serializes access
//! (`&mut self`, or the mutex inside [`crate::service::SessionService`]).
//!
//! Persistence policy:
//! - `start` fails without side effects if the record cannot be created.
//! - Transition checkpoints are best effort; failures are logged.
//! - `end` always produces a wrap-up. A failed final write is reported in
//!   [`SessionEnd::persist_error`] and queued for [`SessionController::retry_pending_writes`].
//! - `abandon` discards the session even if the status write fails.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::config::SessionConfig;
use super::machine::LiveSession;
use super::snapshot::{SessionSnapshot, SessionState};
use super::stats::SessionStats;
use super::wrapup::{WrapUp, WrapUpAssembler};
use crate::clock::Clock;
use crate::error::{SessionError, StoreError};
use crate::events::Event;
use crate::storage::{NewSessionRecord, SessionPatch, SessionStatus, SessionStore};

/// Oldest events are dropped once this many are waiting to be drained.
const MAX_BUFFERED_EVENTS: usize = 1024;

/// Result of a successful `end`.
#[derive(Debug)]
pub struct SessionEnd {
    pub wrap_up: WrapUp,
    /// The final write failed; it has been queued for retry.
    pub persist_error: Option<StoreError>,
}

#[derive(Debug, Clone)]
enum PendingWrite {
    Finalize {
        session_id: String,
        stats: SessionStats,
        ended_at: DateTime<Utc>,
    },
    Abandon {
        session_id: String,
        ended_at: DateTime<Utc>,
    },
}

impl PendingWrite {
    fn session_id(&self) -> &str {
        match self {
            PendingWrite::Finalize { session_id, .. } | PendingWrite::Abandon { session_id, .. } => {
                session_id
            }
        }
    }

    fn apply<S: SessionStore>(&self, store: &mut S) -> Result<(), StoreError> {
        match self {
            PendingWrite::Finalize {
                session_id,
                stats,
                ended_at,
            } => store.finalize_session_record(session_id, stats, SessionStatus::Completed, *ended_at),
            PendingWrite::Abandon {
                session_id,
                ended_at,
            } => store.update_session_record(
                session_id,
                &SessionPatch {
                    status: Some(SessionStatus::Abandoned),
                    ended_at: Some(*ended_at),
                    ..SessionPatch::default()
                },
            ),
        }
    }
}

pub struct SessionController<S: SessionStore, C: Clock> {
    store: S,
    clock: C,
    live: Option<LiveSession>,
    assembler: WrapUpAssembler,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    events: VecDeque<Event>,
    wrap_up: Option<WrapUp>,
    pending: VecDeque<PendingWrite>,
    /// "Disable for today". Survives across sessions until the caller clears it.
    microbreaks_suppressed: bool,
}

impl<S: SessionStore, C: Clock> SessionController<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::idle(clock.now()));
        Self {
            store,
            clock,
            live: None,
            assembler: WrapUpAssembler::default(),
            snapshot_tx,
            events: VecDeque::new(),
            wrap_up: None,
            pending: VecDeque::new(),
            microbreaks_suppressed: false,
        }
    }

    pub fn with_highlight_limit(mut self, limit: usize) -> Self {
        self.assembler = WrapUpAssembler::new(limit);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.live.is_some()
    }

    pub fn live(&self) -> Option<&LiveSession> {
        self.live.as_ref()
    }

    /// Wrap-up of the last session that ended with `end`.
    pub fn get_wrap_up(&self) -> Option<&WrapUp> {
        self.wrap_up.as_ref()
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    pub fn microbreaks_suppressed(&self) -> bool {
        self.microbreaks_suppressed
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Starts a session for `book_id`.
    ///
    /// # Errors
    ///
    /// `SessionAlreadyActive` while a session is live, `InvalidConfig` for a
    /// config that fails validation, `PersistenceFailure` if the record
    /// cannot be created. No session exists after any of them.
    pub fn start(
        &mut self,
        book_id: &str,
        config: SessionConfig,
    ) -> Result<SessionSnapshot, SessionError> {
        if self.live.is_some() {
            return Err(SessionError::SessionAlreadyActive);
        }
        config.validate()?;
        let book_id = book_id.trim();
        if book_id.is_empty() {
            return Err(SessionError::invalid("book_id", "must not be empty"));
        }

        if !self.pending.is_empty() {
            if let Err(e) = self.retry_pending_writes() {
                warn!(error = %e, "queued session write still failing");
            }
        }

        let now = self.clock.now();
        let session_id = self.store.create_session_record(&NewSessionRecord {
            book_id: book_id.to_string(),
            config: config.clone(),
            started_at: now,
        })?;

        let mode = config.mode;
        let live = LiveSession::new(
            session_id.clone(),
            book_id.to_string(),
            config,
            now,
            self.microbreaks_suppressed,
        );
        info!(%session_id, book_id, mode = mode.as_str(), "study session started");

        self.wrap_up = None;
        self.live = Some(live);
        self.push_events(vec![Event::SessionStarted {
            session_id,
            book_id: book_id.to_string(),
            mode,
            at: now,
        }]);
        Ok(self.publish(now))
    }

    /// Ends the live session and builds its wrap-up.
    ///
    /// # Errors
    ///
    /// `NoActiveSession` if there is nothing to end. A failing final write
    /// is not an error here; see [`SessionEnd::persist_error`].
    pub fn end(&mut self) -> Result<SessionEnd, SessionError> {
        let mut live = self.live.take().ok_or(SessionError::NoActiveSession)?;
        let now = self.clock.now();
        let mut events = Vec::new();
        let stats = live.finish(now, &mut events);
        let session_id = live.session_id().to_string();

        let persist_error = match self.store.finalize_session_record(
            &session_id,
            &stats,
            SessionStatus::Completed,
            now,
        ) {
            Ok(()) => None,
            Err(e) => {
                warn!(%session_id, error = %e, "final session write failed, queued for retry");
                self.queue(PendingWrite::Finalize {
                    session_id: session_id.clone(),
                    stats: stats.clone(),
                    ended_at: now,
                });
                Some(e)
            }
        };

        let final_snapshot = live.snapshot(now).terminal(SessionState::Completed);
        let wrap_up = self.assembler.assemble(&self.store, &live, stats.clone(), now);

        info!(
            %session_id,
            active_ms = stats.active_ms,
            afk_ms = stats.total_afk_ms,
            pomodoros = stats.completed_pomodoros,
            "study session completed"
        );
        events.push(Event::SessionCompleted {
            session_id,
            stats,
            at: now,
        });
        self.push_events(events);
        self.wrap_up = Some(wrap_up.clone());
        self.snapshot_tx.send_replace(final_snapshot);

        Ok(SessionEnd {
            wrap_up,
            persist_error,
        })
    }

    /// Discards the live session without a wrap-up.
    ///
    /// # Errors
    ///
    /// `NoActiveSession` if there is nothing to abandon. `PersistenceFailure`
    /// if the status write fails; the session is gone either way and the
    /// write is queued for retry.
    pub fn abandon(&mut self) -> Result<(), SessionError> {
        let live = self.live.take().ok_or(SessionError::NoActiveSession)?;
        let now = self.clock.now();
        let session_id = live.session_id().to_string();
        info!(%session_id, "study session abandoned");

        self.wrap_up = None;
        self.push_events(vec![Event::SessionAbandoned {
            session_id: session_id.clone(),
            at: now,
        }]);
        self.snapshot_tx
            .send_replace(live.snapshot(now).terminal(SessionState::Abandoned));

        let write = PendingWrite::Abandon {
            session_id,
            ended_at: now,
        };
        if let Err(e) = write.apply(&mut self.store) {
            warn!(session_id = write.session_id(), error = %e, "abandon write failed, queued for retry");
            self.queue(write);
            return Err(SessionError::PersistenceFailure(e));
        }
        Ok(())
    }

    /// Replays queued terminal writes in order. Returns how many succeeded.
    ///
    /// # Errors
    ///
    /// `PersistenceFailure` with the first write that still fails; it and
    /// everything after it stay queued.
    pub fn retry_pending_writes(&mut self) -> Result<usize, SessionError> {
        let mut done = 0;
        while let Some(write) = self.pending.front() {
            write.apply(&mut self.store)?;
            debug!(session_id = write.session_id(), "queued session write succeeded");
            self.pending.pop_front();
            done += 1;
        }
        Ok(done)
    }

    pub fn has_pending_writes(&self) -> bool {
        !self.pending.is_empty()
    }

    fn queue(&mut self, write: PendingWrite) {
        // One outstanding write per session; a newer one replaces it.
        self.pending.retain(|w| w.session_id() != write.session_id());
        self.pending.push_back(write);
    }

    // ── Driver and commands ──────────────────────────────────────────

    /// Advances the live session to the clock's current time.
    pub fn tick(&mut self) {
        let _ = self.with_live(|live, now, events| live.tick(now, events));
    }

    /// Any reader input. Ignored when no session is live.
    pub fn report_activity(&mut self) {
        let _ = self.with_live(|live, now, events| live.report_activity(now, events));
    }

    pub fn confirm_presence(&mut self) -> Result<bool, SessionError> {
        self.with_live(|live, now, events| live.confirm_presence(now, events))
    }

    pub fn skip_break(&mut self) -> Result<bool, SessionError> {
        self.with_live(|live, now, events| live.skip_break(now, events))
    }

    pub fn microbreak_take(&mut self) -> Result<bool, SessionError> {
        self.with_live(|live, now, events| live.microbreak_take(now, events))
    }

    pub fn microbreak_end(&mut self) -> Result<bool, SessionError> {
        self.with_live(|live, now, events| live.microbreak_end(now, events))
    }

    pub fn microbreak_postpone(&mut self) -> Result<bool, SessionError> {
        self.with_live(|live, now, events| live.microbreak_postpone(now, events))
    }

    /// Silences microbreak reminders for this and later sessions until
    /// [`Self::set_microbreaks_suppressed`] clears the flag.
    pub fn microbreak_disable_today(&mut self) -> Result<(), SessionError> {
        self.with_live(|live, now, events| live.set_microbreaks_suppressed(true, now, events))?;
        self.microbreaks_suppressed = true;
        Ok(())
    }

    /// Sets or clears the suppression flag, e.g. at the caller's day rollover.
    pub fn set_microbreaks_suppressed(&mut self, suppressed: bool) {
        self.microbreaks_suppressed = suppressed;
        let _ = self.with_live(|live, now, events| {
            live.set_microbreaks_suppressed(suppressed, now, events)
        });
    }

    pub fn record_page_view(&mut self, words: u32) -> Result<(), SessionError> {
        self.with_live(|live, now, events| live.record_page_view(words, now, events))
    }

    pub fn record_highlight(&mut self) -> Result<(), SessionError> {
        self.with_live(|live, now, events| live.record_highlight(now, events))
    }

    pub fn record_note(&mut self) -> Result<(), SessionError> {
        self.with_live(|live, now, events| live.record_note(now, events))
    }

    // ── Suspend / restore ────────────────────────────────────────────

    /// The live session, settled to now, for parking outside the process.
    pub fn export_live(&mut self) -> Option<LiveSession> {
        self.tick();
        self.live.clone()
    }

    /// Re-adopts a parked session. Time since it was parked is reconciled
    /// on the next tick.
    ///
    /// # Errors
    ///
    /// `SessionAlreadyActive` if a session is already live.
    pub fn restore_live(&mut self, live: LiveSession) -> Result<SessionSnapshot, SessionError> {
        if self.live.is_some() {
            return Err(SessionError::SessionAlreadyActive);
        }
        debug!(session_id = live.session_id(), "restored live session");
        self.live = Some(live);
        let now = self.clock.now();
        Ok(self.publish(now))
    }

    // ── Internals ────────────────────────────────────────────────────

    fn with_live<T>(
        &mut self,
        f: impl FnOnce(&mut LiveSession, DateTime<Utc>, &mut Vec<Event>) -> T,
    ) -> Result<T, SessionError> {
        let now = self.clock.now();
        let live = self.live.as_mut().ok_or(SessionError::NoActiveSession)?;
        let mut events = Vec::new();
        let out = f(live, now, &mut events);

        if events.iter().any(Event::is_checkpoint) {
            self.checkpoint();
        }
        self.push_events(events);
        self.publish(now);
        Ok(out)
    }

    fn checkpoint(&mut self) {
        let Some(live) = self.live.as_ref() else {
            return;
        };
        let patch = SessionPatch {
            active_ms: Some(live.stats().active_ms),
            completed_pomodoros: Some(live.stats().completed_pomodoros),
            ..SessionPatch::default()
        };
        if let Err(e) = self.store.update_session_record(live.session_id(), &patch) {
            warn!(session_id = live.session_id(), error = %e, "session checkpoint failed");
        }
    }

    fn push_events(&mut self, events: Vec<Event>) {
        self.events.extend(events);
        let overflow = self.events.len().saturating_sub(MAX_BUFFERED_EVENTS);
        if overflow > 0 {
            self.events.drain(..overflow);
        }
    }

    fn publish(&mut self, now: DateTime<Utc>) -> SessionSnapshot {
        let snapshot = match &self.live {
            Some(live) => live.snapshot(now),
            None => SessionSnapshot::idle(now),
        };
        self.snapshot_tx.send_replace(snapshot.clone());
        snapshot
    }
}
