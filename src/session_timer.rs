//! Inactivity timeout for authenticated sessions.
//!
//! DESIGN
//! ======
//! A single tokio task owns the deadline. Interaction events push the current
//! instant through a `watch` channel (rapid events coalesce), and the task
//! re-arms on every activity, on every transition into the authenticated
//! state and on every `AuthEvent::LoggedIn` (a new login while already
//! authenticated starts a fresh countdown). When the deadline passes while
//! authenticated, the session is closed with `LogoutReason::Inactivity`. The
//! countdown is idle while anonymous.
//!
//! A session that so far exists only in storage is adopted on start so it is
//! counted down like any other.

#[cfg(test)]
#[path = "session_timer_test.rs"]
mod tests;

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::state::auth::{AuthEvent, AuthState, LogoutReason, SessionState};

/// Interaction events that count as user activity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActivityEvent {
    MouseMove,
    MouseDown,
    KeyPress,
    Scroll,
    TouchStart,
    Click,
}

impl ActivityEvent {
    pub const ALL: [Self; 6] =
        [Self::MouseMove, Self::MouseDown, Self::KeyPress, Self::Scroll, Self::TouchStart, Self::Click];

    /// DOM event name, e.g. `"mousemove"`.
    #[must_use]
    pub fn dom_name(self) -> &'static str {
        match self {
            Self::MouseMove => "mousemove",
            Self::MouseDown => "mousedown",
            Self::KeyPress => "keypress",
            Self::Scroll => "scroll",
            Self::TouchStart => "touchstart",
            Self::Click => "click",
        }
    }

    #[must_use]
    pub fn from_dom_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.dom_name() == name)
    }
}

/// Clonable handle for reporting activity to a running timer.
#[derive(Clone, Debug)]
pub struct ActivityHandle {
    tx: watch::Sender<Instant>,
}

impl ActivityHandle {
    pub fn record(&self, event: ActivityEvent) {
        tracing::trace!(event = event.dom_name(), "activity");
        self.tx.send_replace(Instant::now());
    }

    /// Record a raw DOM event by name. Returns `false` for events not tracked.
    pub fn record_dom_event(&self, name: &str) -> bool {
        match ActivityEvent::from_dom_name(name) {
            Some(event) => {
                self.record(event);
                true
            }
            None => false,
        }
    }
}

/// Running inactivity timer. Dropping it stops the countdown.
#[derive(Debug)]
pub struct SessionTimer {
    activity: ActivityHandle,
    task: JoinHandle<()>,
    timeout: Duration,
}

impl SessionTimer {
    /// Spawn the timer task on the current tokio runtime.
    #[must_use]
    pub fn start(auth: AuthState, timeout: Duration) -> Self {
        let (tx, rx) = watch::channel(Instant::now());
        let events_rx = auth.events();
        let _ = auth.session();
        let session_rx = auth.subscribe();
        let task = tokio::spawn(run_timer(auth, timeout, rx, session_rx, events_rx));
        tracing::debug!(timeout_secs = timeout.as_secs(), "session timer started");
        Self { activity: ActivityHandle { tx }, task, timeout }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn activity(&self) -> ActivityHandle {
        self.activity.clone()
    }

    pub fn record(&self, event: ActivityEvent) {
        self.activity.record(event);
    }

    pub fn record_dom_event(&self, name: &str) -> bool {
        self.activity.record_dom_event(name)
    }

    pub fn stop(&self) {
        self.task.abort();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_timer(
    auth: AuthState,
    timeout: Duration,
    mut activity_rx: watch::Receiver<Instant>,
    mut session_rx: watch::Receiver<SessionState>,
    mut events_rx: broadcast::Receiver<AuthEvent>,
) {
    let mut deadline = Instant::now() + timeout;
    let mut authenticated = session_rx.borrow_and_update().is_authenticated();

    loop {
        tokio::select! {
            () = tokio::time::sleep_until(deadline), if authenticated => {
                tracing::info!(idle_secs = timeout.as_secs(), "session idle timeout reached");
                auth.force_logout(LogoutReason::Inactivity);
                authenticated = false;
            }
            changed = activity_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                deadline = *activity_rx.borrow_and_update() + timeout;
            }
            changed = session_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let now_authenticated = session_rx.borrow_and_update().is_authenticated();
                if now_authenticated && !authenticated {
                    deadline = Instant::now() + timeout;
                }
                authenticated = now_authenticated;
            }
            event = events_rx.recv() => match event {
                Ok(AuthEvent::LoggedIn { .. }) | Err(RecvError::Lagged(_)) => {
                    deadline = Instant::now() + timeout;
                }
                Ok(_) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }
    tracing::debug!("session timer stopped");
}
