//! Client-side session state.
//!
//! SYSTEM CONTEXT
//! ==============
//! `auth` owns the current session and is shared by the route guards, the
//! API interceptor and the inactivity timer. It is passed around explicitly
//! as a `Clone` handle over an `Arc`.

pub mod auth;
