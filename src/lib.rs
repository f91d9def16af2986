//! Session, authorization and API plumbing for the Terra Canada client.
//!
//! ARCHITECTURE
//! ============
//! `storage` persists the token and profile, `state::auth` owns the session,
//! `session_timer` ends idle sessions, `guards` gate navigation and
//! `net::interceptor` carries the bearer token on internal API calls.

pub mod config;
pub mod guards;
pub mod net;
pub mod permissions;
pub mod session_timer;
pub mod state;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::TerraConfig;
pub use net::backend::{AuthBackend, LoginError, RestAuthBackend};
pub use net::interceptor::{ApiClient, ApiError};
pub use net::types::{Credentials, UserProfile};
pub use session_timer::{ActivityEvent, SessionTimer};
pub use state::auth::{AuthEvent, AuthState, LogoutReason, SessionState};
