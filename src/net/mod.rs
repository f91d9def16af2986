//! Networking modules for the Terra REST API.
//!
//! SYSTEM CONTEXT
//! ==============
//! `backend` owns the auth endpoints used by the session state, `interceptor`
//! wraps every other API call with bearer-token plumbing, and `types` defines
//! the shared `{ success, data, error }` wire schema.

pub mod backend;
pub mod interceptor;
pub mod types;
