//! Property tests for session time accounting.
//!
//! Whatever the reader does, every millisecond of wall time lands in exactly
//! one bucket: active, AFK, break, or microbreak.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use studyroom_core::{Event, LiveSession, Phase, SessionConfig};

#[derive(Debug, Clone)]
enum Op {
    Advance(u32),
    Activity,
    Presence,
    SkipBreak,
    TakeMicrobreak,
    EndMicrobreak,
    Postpone,
    Page(u32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (1u32..=1_000).prop_map(Op::Advance),
        3 => (1_000u32..=400_000).prop_map(Op::Advance),
        3 => Just(Op::Activity),
        1 => Just(Op::Presence),
        1 => Just(Op::SkipBreak),
        1 => Just(Op::TakeMicrobreak),
        1 => Just(Op::EndMicrobreak),
        1 => Just(Op::Postpone),
        1 => (0u32..=500).prop_map(Op::Page),
    ]
}

fn config() -> impl Strategy<Value = SessionConfig> {
    (any::<bool>(), 1u32..=3, 1u32..=2, 1u32..=4, 0u32..=6).prop_map(
        |(free, work, brk, afk, micro)| {
            let base = if free {
                SessionConfig::free()
            } else {
                SessionConfig::pomodoro(work, brk)
            };
            base.with_afk_timeout(afk).with_microbreak_interval(micro)
        },
    )
}

fn elapsed(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    (to - from).num_milliseconds() as u64
}

fn apply(session: &mut LiveSession, op: &Op, now: &mut DateTime<Utc>, events: &mut Vec<Event>) {
    match *op {
        Op::Advance(ms) => {
            *now += Duration::milliseconds(i64::from(ms));
            session.tick(*now, events);
        }
        Op::Activity => session.report_activity(*now, events),
        Op::Presence => {
            session.confirm_presence(*now, events);
        }
        Op::SkipBreak => {
            session.skip_break(*now, events);
        }
        Op::TakeMicrobreak => {
            session.microbreak_take(*now, events);
        }
        Op::EndMicrobreak => {
            session.microbreak_end(*now, events);
        }
        Op::Postpone => {
            session.microbreak_postpone(*now, events);
        }
        Op::Page(words) => session.record_page_view(words, *now, events),
    }
}

proptest! {
    #[test]
    fn buckets_sum_to_wall_time(config in config(), ops in prop::collection::vec(op(), 1..300)) {
        let start = Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap();
        let mut now = start;
        let mut events = Vec::new();
        let mut session = LiveSession::new("s".into(), "b".into(), config, start, false);

        let mut last_tracked = 0;
        for op in &ops {
            apply(&mut session, op, &mut now, &mut events);
            let snap = session.snapshot(now);
            prop_assert!(snap.stats.tracked_ms() >= last_tracked);
            last_tracked = snap.stats.tracked_ms();
            if matches!(op, Op::Advance(_)) {
                prop_assert_eq!(snap.stats.tracked_ms(), elapsed(start, now));
                prop_assert_eq!(snap.pending_afk_ms, 0);
            }
        }

        let stats = session.finish(now, &mut events);
        prop_assert_eq!(stats.tracked_ms(), elapsed(start, now));
        prop_assert!(stats.active_ms <= elapsed(start, now));
    }

    #[test]
    fn pomodoros_match_work_to_break_transitions(ops in prop::collection::vec(op(), 1..300)) {
        let start = Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap();
        let mut now = start;
        let mut events = Vec::new();
        let config = SessionConfig::pomodoro(1, 1).with_afk_timeout(2);
        let mut session = LiveSession::new("s".into(), "b".into(), config, start, false);

        for op in &ops {
            apply(&mut session, op, &mut now, &mut events);
        }

        let to_break = events
            .iter()
            .filter(|e| matches!(e, Event::PhaseChanged { to: Phase::Break, .. }))
            .count() as u32;
        prop_assert_eq!(session.stats().completed_pomodoros, to_break);
        prop_assert!(session.stats().total_break_ms <= u64::from(to_break) * 60_000);
    }
}
