//! The study session engine.
//!
//! [`SessionController`] is the only entry point: it creates a
//! [`LiveSession`] on `start`, forwards commands and ticks to it, writes
//! through a [`crate::storage::SessionStore`], and publishes a
//! [`SessionSnapshot`] after every mutation.

mod config;
mod controller;
mod machine;
mod microbreak;
mod snapshot;
mod stats;
mod wrapup;

pub use config::{SessionConfig, SessionMode};
pub use controller::{SessionController, SessionEnd};
pub use machine::{LiveSession, TICK_MS};
pub use microbreak::{MicrobreakScheduler, POSTPONE_MINUTES};
pub use snapshot::{Phase, SessionSnapshot, SessionState};
pub use stats::SessionStats;
pub use wrapup::{WrapUp, WrapUpAssembler};

use chrono::{DateTime, Utc};

/// Milliseconds from `from` to `to`, zero if the clock went backwards.
pub(crate) fn elapsed_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    u64::try_from((to - from).num_milliseconds()).unwrap_or(0)
}
