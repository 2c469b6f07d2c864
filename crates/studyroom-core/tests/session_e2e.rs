//! End-to-end session tests.
//!
//! A controller over the SQLite store (in-memory) or the failure-injecting
//! `MemoryStore`, driven one tick at a time by a `ManualClock`.

use chrono::{Duration, TimeZone, Utc};
use studyroom_core::storage::MemoryStore;
use studyroom_core::{
    Clock, Database, Event, ManualClock, Phase, SessionConfig, SessionController, SessionError,
    SessionState, SessionStatus,
};

const TICK_MS: i64 = 1_000;

fn clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap())
}

fn tick_active<S: studyroom_core::SessionStore>(
    c: &mut SessionController<S, ManualClock>,
    clock: &ManualClock,
    n: u32,
) {
    for _ in 0..n {
        clock.advance_ms(TICK_MS);
        c.report_activity();
        c.tick();
    }
}

fn tick_idle<S: studyroom_core::SessionStore>(
    c: &mut SessionController<S, ManualClock>,
    clock: &ManualClock,
    n: u32,
) {
    for _ in 0..n {
        clock.advance_ms(TICK_MS);
        c.tick();
    }
}

#[test]
fn test_full_pomodoro_reaches_break_and_wraps_up() {
    let clock = clock();
    let db = Database::open_memory().unwrap();
    let mut c = SessionController::new(db, clock.clone());

    let id = c
        .start("b1", SessionConfig::pomodoro(25, 5).with_afk_timeout(5))
        .unwrap()
        .session_id
        .unwrap();

    tick_active(&mut c, &clock, 1499);
    assert_eq!(c.snapshot().phase, Phase::Work);
    tick_active(&mut c, &clock, 1);

    let snap = c.snapshot();
    assert_eq!(snap.phase, Phase::Break);
    assert_eq!(snap.stats.completed_pomodoros, 1);
    assert_eq!(snap.active_ms, 1_500_000);
    assert_eq!(snap.phase_remaining_ms, Some(300_000));

    let end = c.end().unwrap();
    assert!(end.persist_error.is_none());
    assert_eq!(end.wrap_up.stats.total_break_ms, 0);
    assert_eq!(end.wrap_up.stats.active_ms, 1_500_000);

    let record = c.store().get_session(&id).unwrap().unwrap();
    assert_eq!(record.status, SessionStatus::Completed);
    assert_eq!(record.stats.completed_pomodoros, 1);
    assert_eq!(record.ended_at, Some(end.wrap_up.ended_at));
}

#[test]
fn test_afk_round_trip_through_controller() {
    let clock = clock();
    let mut c = SessionController::new(MemoryStore::new(), clock.clone());
    c.start("b1", SessionConfig::pomodoro(25, 5).with_afk_timeout(5))
        .unwrap();
    c.drain_events();

    tick_idle(&mut c, &clock, 300);
    assert_eq!(c.snapshot().state, SessionState::PausedAfk);
    tick_idle(&mut c, &clock, 60);
    let snap = c.snapshot();
    assert_eq!(snap.stats.total_afk_ms, 360_000);
    assert_eq!(snap.stats.active_ms, 0);
    assert_eq!(snap.pending_afk_ms, 0);

    assert!(c.confirm_presence().unwrap());
    let snap = c.snapshot();
    assert_eq!(snap.state, SessionState::Running);
    assert_eq!(snap.stats.total_afk_ms, 360_000);
    assert_eq!(snap.active_ms, 0);

    let events = c.drain_events();
    assert!(matches!(events.first(), Some(Event::AfkStarted { .. })));
    assert!(matches!(events.last(), Some(Event::AfkEnded { afk_ms: 360_000, .. })));
}

#[test]
fn test_end_while_afk_flushes_pending_afk() {
    let clock = clock();
    let mut c = SessionController::new(MemoryStore::new(), clock.clone());
    c.start("b1", SessionConfig::free().with_afk_timeout(1)).unwrap();
    tick_active(&mut c, &clock, 30);
    tick_idle(&mut c, &clock, 120);
    assert_eq!(c.snapshot().state, SessionState::PausedAfk);

    let end = c.end().unwrap();
    assert_eq!(end.wrap_up.stats.active_ms, 30_000);
    assert_eq!(end.wrap_up.stats.total_afk_ms, 120_000);
    assert_eq!(end.wrap_up.elapsed_ms, 150_000);
    assert_eq!(c.snapshot().pending_afk_ms, 0);
}

#[test]
fn test_abandon_then_end_reports_no_session() {
    let clock = clock();
    let store = MemoryStore::new();
    let mut c = SessionController::new(store.clone(), clock.clone());
    let id = c
        .start("b1", SessionConfig::default())
        .unwrap()
        .session_id
        .unwrap();
    tick_active(&mut c, &clock, 10);

    c.abandon().unwrap();
    assert!(matches!(c.end(), Err(SessionError::NoActiveSession)));
    assert!(c.get_wrap_up().is_none());
    let record = store.session(&id).unwrap();
    assert_eq!(record.status, SessionStatus::Abandoned);
    assert_eq!(record.stats.active_ms, 0);
}

#[test]
fn test_persistence_failure_keeps_wrap_up() {
    let clock = clock();
    let store = MemoryStore::new();
    let mut c = SessionController::new(store.clone(), clock.clone());
    let id = c
        .start("b1", SessionConfig::free())
        .unwrap()
        .session_id
        .unwrap();
    store.add_highlight("b1", "kept passage", None, clock.now());
    tick_active(&mut c, &clock, 45);

    store.set_fail_writes(true);
    let end = c.end().unwrap();
    assert!(matches!(
        end.persist_error,
        Some(studyroom_core::StoreError::Unavailable(_))
    ));
    assert_eq!(end.wrap_up.highlights.len(), 1);
    assert_eq!(c.snapshot().state, SessionState::Completed);

    // The queued write goes out before the next session's record.
    store.set_fail_writes(false);
    c.start("b2", SessionConfig::free()).unwrap();
    assert!(!c.has_pending_writes());
    let record = store.session(&id).unwrap();
    assert_eq!(record.status, SessionStatus::Completed);
    assert_eq!(record.stats.active_ms, 45_000);
}

#[test]
fn test_start_failure_leaves_engine_idle() {
    let clock = clock();
    let store = MemoryStore::new();
    store.set_fail_writes(true);
    let mut c = SessionController::new(store.clone(), clock);
    assert!(matches!(
        c.start("b1", SessionConfig::default()),
        Err(SessionError::PersistenceFailure(_))
    ));
    assert!(!c.is_active());
    store.set_fail_writes(false);
    assert!(c.start("b1", SessionConfig::default()).is_ok());
}

#[test]
fn test_sleep_gap_is_reconciled_on_next_tick() {
    let clock = clock();
    let mut c = SessionController::new(MemoryStore::new(), clock.clone());
    c.start("b1", SessionConfig::pomodoro(25, 5).with_afk_timeout(10))
        .unwrap();
    tick_active(&mut c, &clock, 60);

    // Lid closed for two hours, then the reader comes back.
    clock.advance(Duration::hours(2));
    c.tick();
    assert_eq!(c.snapshot().state, SessionState::PausedAfk);
    c.report_activity();

    let snap = c.snapshot();
    assert_eq!(snap.state, SessionState::Running);
    assert_eq!(snap.active_ms, 60_000);
    assert_eq!(snap.stats.total_afk_ms, 2 * 3_600_000);
    assert_eq!(snap.phase, Phase::Work);
}

#[test]
fn test_wrap_up_ranks_highlights_from_sqlite() {
    let clock = clock();
    let db = Database::open_memory().unwrap();
    let mut c = SessionController::new(db, clock.clone()).with_highlight_limit(2);
    c.start("b1", SessionConfig::free()).unwrap();

    let at = clock.now();
    c.store().add_highlight("b1", "short", None, at).unwrap();
    c.store()
        .add_highlight("b1", "a considerably longer passage", None, at)
        .unwrap();
    c.store()
        .add_highlight("b1", "tiny", Some("remember this"), at)
        .unwrap();
    c.store().add_highlight("b2", "other book", None, at).unwrap();
    tick_active(&mut c, &clock, 5);

    let end = c.end().unwrap();
    let texts: Vec<_> = end.wrap_up.highlights.iter().map(|h| h.text.as_str()).collect();
    assert_eq!(texts, ["tiny", "a considerably longer passage"]);
}
