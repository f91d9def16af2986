//! Auth-session state for the current user.
//!
//! DESIGN
//! ======
//! The session is one value, `SessionState`, published through a
//! `tokio::sync::watch` channel. Token, user and the authenticated flag are
//! read from the same snapshot, so `Authenticated` always carries both a
//! token and a user. Persistence is written before a new snapshot is
//! published; a failed write leaves memory untouched.
//!
//! Lifecycle events (`LoggedIn`, `LoggedOut { reason }`, `ProfileUpdated`)
//! go out on a broadcast channel for toasts and redirects.
//!
//! READS
//! =====
//! `is_authenticated`, `token` and `current_user` consult memory first. When
//! memory is empty (fresh process that has not called `restore` yet) a
//! complete persisted session is adopted into the snapshot, so subscribers
//! such as the inactivity timer see it too. After a logout in this process the
//! fallback is closed until the next `login` or `restore`, even if clearing
//! storage failed.

#[cfg(test)]
#[path = "auth_test.rs"]
mod auth_test;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{broadcast, watch};

use crate::net::backend::{AuthBackend, LoginError};
use crate::net::interceptor::ApiError;
use crate::net::types::{Credentials, UserProfile};
use crate::permissions;
use crate::storage::{SessionStore, StorageError};

const EVENT_CAPACITY: usize = 16;

/// An authenticated session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Anonymous,
    Authenticated(Session),
}

impl SessionState {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Authenticated(session) => Some(&session.token),
            Self::Anonymous => None,
        }
    }

    #[must_use]
    pub fn user(&self) -> Option<&UserProfile> {
        match self {
            Self::Authenticated(session) => Some(&session.user),
            Self::Anonymous => None,
        }
    }
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogoutReason {
    UserRequested,
    Inactivity,
    TokenRejected,
}

impl LogoutReason {
    /// Notice shown on the login screen after the session ends.
    #[must_use]
    pub fn notice(self) -> Option<&'static str> {
        match self {
            Self::UserRequested => None,
            Self::Inactivity => Some("Sesión cerrada por inactividad"),
            Self::TokenRejected => Some("Su sesión ha expirado. Inicie sesión nuevamente"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthEvent {
    LoggedIn { username: String },
    LoggedOut { reason: LogoutReason },
    ProfileUpdated,
}

/// Shared handle to the session. Clones observe and mutate the same state.
#[derive(Clone)]
pub struct AuthState {
    inner: Arc<AuthInner>,
}

struct AuthInner {
    backend: Arc<dyn AuthBackend>,
    store: SessionStore,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<AuthEvent>,
    /// Set by `force_logout`; blocks the storage fallback.
    signed_out: AtomicBool,
}

impl AuthState {
    pub fn new(backend: Arc<dyn AuthBackend>, store: SessionStore) -> Self {
        let (state, _) = watch::channel(SessionState::Anonymous);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { inner: Arc::new(AuthInner { backend, store, state, events, signed_out: AtomicBool::new(false) }) }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Load a persisted session into memory. Returns whether one was found.
    ///
    /// A token without a user (or the reverse) is a torn write and is cleared.
    pub fn restore(&self) -> Result<bool, StorageError> {
        let token = self.inner.store.token()?;
        let user = self.inner.store.user()?;
        match (token, user) {
            (Some(token), Some(user)) => {
                tracing::debug!(user = %user.username, "restored persisted session");
                self.inner.signed_out.store(false, Ordering::SeqCst);
                self.inner.state.send_replace(SessionState::Authenticated(Session { token, user }));
                Ok(true)
            }
            (None, None) => Ok(false),
            _ => {
                tracing::warn!("clearing incomplete persisted session");
                self.inner.store.clear()?;
                Ok(false)
            }
        }
    }

    /// Authenticate against the server and open a session.
    ///
    /// # Errors
    ///
    /// Returns a `LoginError` whose `Display` is the message for the user.
    pub async fn login(&self, credentials: &Credentials) -> Result<UserProfile, LoginError> {
        if credentials.username.trim().is_empty() || credentials.password.is_empty() {
            return Err(LoginError::MissingCredentials);
        }

        let payload = match self.inner.backend.login(credentials).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(username = %credentials.username, error = ?e, "login failed");
                return Err(e);
            }
        };

        self.inner.store.save(&payload.token, &payload.user)?;
        self.inner.signed_out.store(false, Ordering::SeqCst);
        let user = payload.user.clone();
        self.inner.state.send_replace(SessionState::Authenticated(Session { token: payload.token, user: payload.user }));
        tracing::info!(user = %user.username, role = %user.role_name, "login succeeded");
        let _ = self.inner.events.send(AuthEvent::LoggedIn { username: user.username.clone() });
        Ok(user)
    }

    /// Close the session at the user's request. Idempotent.
    pub fn logout(&self) {
        self.force_logout(LogoutReason::UserRequested);
    }

    /// Clear persisted and in-memory session. Returns whether a session was open.
    ///
    /// Storage failures are logged; memory is cleared regardless.
    pub fn force_logout(&self, reason: LogoutReason) -> bool {
        self.inner.signed_out.store(true, Ordering::SeqCst);
        if let Err(e) = self.inner.store.clear() {
            tracing::warn!(error = %e, "failed to clear persisted session");
        }
        let was_open = self.inner.state.send_if_modified(|state| {
            let was_open = state.is_authenticated();
            *state = SessionState::Anonymous;
            was_open
        });
        if was_open {
            tracing::info!(?reason, "session closed");
            let _ = self.inner.events.send(AuthEvent::LoggedOut { reason });
        }
        was_open
    }

    /// Tell the server to drop the token, then log out locally.
    ///
    /// The server call is best-effort; the local session always ends.
    pub async fn sign_out(&self) {
        if let Some(token) = self.token() {
            if let Err(e) = self.inner.backend.logout(&token).await {
                tracing::warn!(error = %e, "server logout failed");
            }
        }
        self.logout();
    }

    // =========================================================================
    // PROFILE
    // =========================================================================

    /// Overwrite the current user's profile. No-op when logged out.
    pub fn update_profile(&self, user: UserProfile) -> Result<bool, StorageError> {
        if !self.inner.state.borrow().is_authenticated() {
            return Ok(false);
        }
        self.inner.store.save_user(&user)?;
        let updated = self.inner.state.send_if_modified(|state| match state {
            SessionState::Authenticated(session) => {
                session.user = user;
                true
            }
            SessionState::Anonymous => false,
        });
        if updated {
            let _ = self.inner.events.send(AuthEvent::ProfileUpdated);
        }
        Ok(updated)
    }

    /// Re-fetch the profile from the server and store it.
    ///
    /// A token rejection closes the session before the error is returned.
    pub async fn refresh_profile(&self) -> Result<UserProfile, ApiError> {
        let Some(token) = self.token() else {
            return Err(ApiError::SessionExpired { code: "NO_TOKEN".to_owned() });
        };
        match self.inner.backend.fetch_profile(&token).await {
            Ok(user) => {
                if let Err(e) = self.update_profile(user.clone()) {
                    tracing::warn!(error = %e, "failed to persist refreshed profile");
                }
                Ok(user)
            }
            Err(e) => {
                if e.is_session_rejection() {
                    self.force_logout(LogoutReason::TokenRejected);
                }
                Err(e)
            }
        }
    }

    // =========================================================================
    // READS
    // =========================================================================

    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Watch session snapshots. The receiver starts at the current value.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    /// Current session, adopting a complete persisted one when memory is empty.
    #[must_use]
    pub fn session(&self) -> SessionState {
        let current = self.snapshot();
        if current.is_authenticated() || self.inner.signed_out.load(Ordering::SeqCst) {
            return current;
        }
        let (Some(token), Some(user)) = (self.stored_token(), self.stored_user()) else {
            return current;
        };
        tracing::debug!(user = %user.username, "adopted persisted session");
        let adopted = Session { token, user };
        let signed_out = &self.inner.signed_out;
        self.inner.state.send_if_modified(|state| match state {
            SessionState::Anonymous if !signed_out.load(Ordering::SeqCst) => {
                *state = SessionState::Authenticated(adopted);
                true
            }
            _ => false,
        });
        self.snapshot()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session().is_authenticated()
    }

    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.session().token().map(str::to_owned)
    }

    #[must_use]
    pub fn current_user(&self) -> Option<UserProfile> {
        self.session().user().cloned()
    }

    fn stored_token(&self) -> Option<String> {
        self.inner
            .store
            .token()
            .inspect_err(|e| tracing::debug!(error = %e, "stored token unreadable"))
            .ok()
            .flatten()
    }

    fn stored_user(&self) -> Option<UserProfile> {
        self.inner
            .store
            .user()
            .inspect_err(|e| tracing::debug!(error = %e, "stored user unreadable"))
            .ok()
            .flatten()
    }

    // =========================================================================
    // AUTHORIZATION
    // =========================================================================

    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.current_user().is_some_and(|u| permissions::has_permission(&u, permission))
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.current_user().is_some_and(|u| permissions::has_role(&u, role))
    }

    #[must_use]
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        self.current_user().is_some_and(|u| permissions::has_any_role(&u, roles))
    }

    #[must_use]
    pub fn has_module_access(&self, module: &str) -> bool {
        self.current_user().is_some_and(|u| permissions::has_module_access(&u, module))
    }

    #[must_use]
    pub fn has_action_permission(&self, module: &str, action: &str) -> bool {
        self.current_user()
            .is_some_and(|u| permissions::has_action_permission(&u, module, action))
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("authenticated", &self.inner.state.borrow().is_authenticated())
            .finish_non_exhaustive()
    }
}
