//! Async tick driver.
//!
//! Wraps a [`SessionController`] behind a tokio mutex and runs a ticker task
//! for as long as a session is live. The ticker is aborted on `end`,
//! `abandon`, and when the service is dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use crate::clock::Clock;
use crate::error::SessionError;
use crate::session::{SessionConfig, SessionController, SessionEnd, SessionSnapshot};
use crate::storage::SessionStore;

/// Aborts the task when dropped.
struct Ticker(JoinHandle<()>);

impl Drop for Ticker {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct SessionService<S: SessionStore + 'static, C: Clock + 'static> {
    controller: Arc<Mutex<SessionController<S, C>>>,
    ticker: Mutex<Option<Ticker>>,
    tick_interval: Duration,
}

impl<S: SessionStore + 'static, C: Clock + 'static> SessionService<S, C> {
    pub fn new(controller: SessionController<S, C>, tick_interval: Duration) -> Self {
        Self {
            controller: Arc::new(Mutex::new(controller)),
            ticker: Mutex::new(None),
            tick_interval,
        }
    }

    /// Direct access for commands the service does not wrap.
    pub async fn lock(&self) -> MutexGuard<'_, SessionController<S, C>> {
        self.controller.lock().await
    }

    pub async fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.controller.lock().await.subscribe()
    }

    pub async fn start(
        &self,
        book_id: &str,
        config: SessionConfig,
    ) -> Result<SessionSnapshot, SessionError> {
        let snapshot = self.controller.lock().await.start(book_id, config)?;
        self.spawn_ticker().await;
        Ok(snapshot)
    }

    /// Starts ticking a session that was already adopted by the controller,
    /// e.g. through `restore_live`.
    pub async fn resume_ticking(&self) {
        if self.controller.lock().await.is_active() {
            self.spawn_ticker().await;
        }
    }

    pub async fn end(&self) -> Result<SessionEnd, SessionError> {
        self.cancel_ticker().await;
        self.controller.lock().await.end()
    }

    pub async fn abandon(&self) -> Result<(), SessionError> {
        self.cancel_ticker().await;
        self.controller.lock().await.abandon()
    }

    pub async fn report_activity(&self) {
        self.controller.lock().await.report_activity();
    }

    pub async fn is_ticking(&self) -> bool {
        self.ticker
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.0.is_finished())
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        *ticker_guard = None;

        let controller = self.controller.clone();
        let tick_interval = self.tick_interval;
        let handle = tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            // Late ticks are reconciled from the clock, bursts add nothing.
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                let mut guard = controller.lock().await;
                if !guard.is_active() {
                    debug!("ticker stopping, no live session");
                    break;
                }
                guard.tick();
            }
        });
        *ticker_guard = Some(Ticker(handle));
    }

    async fn cancel_ticker(&self) {
        *self.ticker.lock().await = None;
    }
}
