// src/event/sync_event.rs

//! One-shot, resettable boolean signal.
//!
//! The flag lives behind a `Mutex`; waiters park on a `tokio::sync::Notify`.
//! Every wait registers interest *before* re-checking the flag, so a
//! `signal()` racing with a new waiter can never be lost.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::trace;

use crate::errors::{Result, RunnerError};

#[derive(Debug)]
pub struct SyncEvent {
    name: String,
    flag: Mutex<bool>,
    notify: Notify,
}

impl SyncEvent {
    /// Create a cleared event. `name` only shows up in logs and timeout errors.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flag: Mutex::new(false),
            notify: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Clear the flag.
    ///
    /// Only call this between run iterations; a waiter that has not yet
    /// observed the previous `signal()` would otherwise miss it.
    pub fn reset(&self) {
        *self.lock() = false;
    }

    /// Set the flag and wake every waiter. Idempotent.
    pub fn signal(&self) {
        {
            let mut flag = self.lock();
            if *flag {
                return;
            }
            *flag = true;
        }
        trace!(event = %self.name, "event signalled");
        self.notify.notify_waiters();
    }

    pub fn is_set(&self) -> bool {
        *self.lock()
    }

    /// Block until the flag is set.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_set() {
                return;
            }
            notified.await;
        }
    }

    /// Block until the flag is set or `timeout` has elapsed.
    ///
    /// The deadline is fixed on entry; each wake-up waits only for what is
    /// left of the budget.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_set() {
                return Ok(());
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(RunnerError::Timeout {
                    event: self.name.clone(),
                    timeout,
                });
            }
            // Either outcome loops back to re-check the flag and the budget.
            let _ = tokio::time::timeout(remaining, notified).await;
        }
    }

    /// `wait()` when `timeout` is `None`, `wait_timeout()` otherwise.
    pub async fn wait_for(&self, timeout: Option<Duration>) -> Result<()> {
        match timeout {
            Some(t) => self.wait_timeout(t).await,
            None => {
                self.wait().await;
                Ok(())
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, bool> {
        self.flag.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
