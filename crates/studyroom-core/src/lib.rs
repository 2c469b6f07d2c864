//! # Studyroom Core Library
//!
//! This library provides the study session engine of the Studyroom e-book
//! reader. A front-end starts a session for a book, forwards reader input,
//! and renders the snapshots the engine publishes; the CLI in
//! `studyroom-cli` is one such front-end.
//!
//! ## Architecture
//!
//! - **Session Engine**: Runs Pomodoro or free-reading sessions. Each call to
//!   `tick()` charges the real time since the previous one, so late ticks and
//!   system sleep are reconciled from the clock. It also detects AFK intervals
//!   and schedules optional microbreaks
//! - **Service**: A tokio task that ticks the engine once a second while a
//!   session is live
//! - **Storage**: SQLite-based session and highlight storage and TOML-based
//!   configuration, behind the [`SessionStore`] trait
//!
//! ## Key Components
//!
//! - [`SessionController`]: Session lifecycle, commands, and persistence policy
//! - [`LiveSession`]: The per-session state machine
//! - [`WrapUp`]: End-of-session summary with the session's highlights
//! - [`Database`]: Session and highlight persistence
//! - [`Config`]: Application configuration management

pub mod clock;
pub mod error;
pub mod events;
pub mod service;
pub mod session;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock, TokioClock};
pub use error::{ConfigError, CoreError, DatabaseError, SessionError, StoreError};
pub use events::Event;
pub use service::SessionService;
pub use session::{
    LiveSession, Phase, SessionConfig, SessionController, SessionEnd, SessionMode,
    SessionSnapshot, SessionState, SessionStats, WrapUp,
};
pub use storage::{Config, Database, Highlight, MemoryStore, SessionStatus, SessionStore};
