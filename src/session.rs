//! Run cancellation and per-session supersede.
//!
//! A user who uploads a second document while the first is still being
//! processed only cares about the second one. Each run carries a
//! [`CancelFlag`]; the [`RunRegistry`] keeps the flag of the latest run per
//! session key and raises the previous flag when a new run begins.
//!
//! The flag is checked between OCR pages (blocking side, [`CancelFlag::is_cancelled`])
//! and raced against the model call (async side, [`CancelFlag::cancelled`]).
//!
//! A run whose caller goes away is cancelled too: [`RunGuard`] and
//! [`CancelOnDrop`] raise the flag when they are dropped, which is what
//! happens to a request future when the client disconnects.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Default)]
struct FlagInner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Shared cancellation flag for one run.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<FlagInner>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake every waiter. Idempotent.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once the flag is raised.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking so a concurrent cancel is not missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// A guard that raises this flag when dropped, unless disarmed first.
    pub fn cancel_on_drop(&self) -> CancelOnDrop {
        CancelOnDrop {
            flag: Some(self.clone()),
        }
    }
}

/// Raises a [`CancelFlag`] on drop unless [`CancelOnDrop::disarm`]ed.
#[derive(Debug)]
#[must_use = "the flag is raised as soon as the guard is dropped"]
pub struct CancelOnDrop {
    flag: Option<CancelFlag>,
}

impl CancelOnDrop {
    /// The guarded work finished; leave the flag alone.
    pub fn disarm(mut self) {
        self.flag = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(flag) = self.flag.take() {
            if !flag.is_cancelled() {
                debug!("Run abandoned by its caller; cancelling");
                flag.cancel();
            }
        }
    }
}

/// Handle for a run registered with a [`RunRegistry`].
#[derive(Debug, Clone)]
pub struct RunTicket {
    pub run_id: Uuid,
    pub session: Option<String>,
    pub cancel: CancelFlag,
}

impl RunTicket {
    /// A ticket that no registry knows about; never superseded.
    pub fn detached() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            session: None,
            cancel: CancelFlag::new(),
        }
    }
}

/// Latest run per session key.
#[derive(Debug, Default)]
pub struct RunRegistry {
    active: Mutex<HashMap<String, (Uuid, CancelFlag)>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a run. With a session key, the previous run of that session is
    /// cancelled; without one the run is independent.
    ///
    /// The run stays registered until the returned guard is dropped.
    pub fn begin(&self, session: Option<&str>) -> RunGuard<'_> {
        let ticket = RunTicket {
            run_id: Uuid::new_v4(),
            session: session.map(str::to_string),
            cancel: CancelFlag::new(),
        };

        if let Some(key) = session {
            let previous = self
                .lock()
                .insert(key.to_string(), (ticket.run_id, ticket.cancel.clone()));
            if let Some((prev_id, prev_flag)) = previous {
                info!("Session {}: run {} superseded by {}", key, prev_id, ticket.run_id);
                prev_flag.cancel();
            }
        }

        debug!("Run {} started", ticket.run_id);
        RunGuard {
            registry: self,
            ticket,
        }
    }

    /// Forget a finished run, unless a newer run of its session has
    /// already replaced it.
    pub fn finish(&self, ticket: &RunTicket) {
        if let Some(key) = ticket.session.as_deref() {
            let mut active = self.lock();
            if active.get(key).is_some_and(|(id, _)| *id == ticket.run_id) {
                active.remove(key);
            }
        }
    }

    /// Number of sessions with a run in flight.
    pub fn active_sessions(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (Uuid, CancelFlag)>> {
        // A poisoned map still holds valid flags.
        self.active.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// A run registered with a [`RunRegistry`].
///
/// Dereferences to its [`RunTicket`]. On drop the run's flag is raised and
/// its registry entry removed, whether the run completed or its caller
/// went away.
#[derive(Debug)]
#[must_use = "the run is cancelled as soon as the guard is dropped"]
pub struct RunGuard<'a> {
    registry: &'a RunRegistry,
    ticket: RunTicket,
}

impl Deref for RunGuard<'_> {
    type Target = RunTicket;

    fn deref(&self) -> &RunTicket {
        &self.ticket
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.ticket.cancel.cancel();
        self.registry.finish(&self.ticket);
    }
}
