//! Auth endpoints: login, logout and current-profile fetch.
//!
//! SYSTEM CONTEXT
//! ==============
//! `AuthState` talks to the server only through the `AuthBackend` trait so
//! session logic can be exercised with an in-process mock. `RestAuthBackend`
//! is the production implementation over `reqwest`.
//!
//! ERROR HANDLING
//! ==============
//! Login failures are translated into the messages shown to the user. Nothing
//! here retries; a failed call surfaces immediately.

#[cfg(test)]
#[path = "backend_test.rs"]
mod backend_test;

use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;

use super::interceptor::{ApiError, decode_envelope};
use super::types::{ApiEnvelope, Credentials, LoginPayload, UserProfile};
use crate::config::TerraConfig;
use crate::storage::StorageError;

/// Login failures, rendered as the text shown to the user.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("Ingrese usuario y contraseña")]
    MissingCredentials,
    #[error("Usuario o contraseña incorrectos")]
    InvalidCredentials,
    #[error("Usuario inactivo. Contacte al administrador")]
    AccountDisabled,
    #[error("{message}")]
    Server { status: u16, message: String },
    #[error("No se pudo conectar con el servidor")]
    Network(#[source] reqwest::Error),
    #[error("Respuesta inesperada del servidor")]
    Malformed(String),
    #[error("No se pudo guardar la sesión")]
    Storage(#[from] StorageError),
}

/// Server-side auth operations used by the session state.
#[async_trait::async_trait]
pub trait AuthBackend: Send + Sync {
    /// Exchange credentials for a token and profile.
    async fn login(&self, credentials: &Credentials) -> Result<LoginPayload, LoginError>;

    /// Invalidate `token` server-side.
    async fn logout(&self, token: &str) -> Result<(), ApiError>;

    /// Fetch the profile of the user owning `token`.
    async fn fetch_profile(&self, token: &str) -> Result<UserProfile, ApiError>;
}

/// `AuthBackend` over the REST API at `TerraConfig::api_url`.
#[derive(Clone, Debug)]
pub struct RestAuthBackend {
    http: reqwest::Client,
    config: Arc<TerraConfig>,
}

impl RestAuthBackend {
    /// Build a backend with a client honoring the configured request timeout.
    pub fn new(config: Arc<TerraConfig>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { http, config })
    }
}

#[async_trait::async_trait]
impl AuthBackend for RestAuthBackend {
    async fn login(&self, credentials: &Credentials) -> Result<LoginPayload, LoginError> {
        let url = self
            .config
            .endpoint("auth/login")
            .map_err(|e| LoginError::Malformed(e.to_string()))?;
        let resp = self
            .http
            .post(url)
            .json(credentials)
            .send()
            .await
            .map_err(LoginError::Network)?;
        let status = resp.status();
        let body = resp.text().await.map_err(LoginError::Network)?;
        login_outcome(status, &body)
    }

    async fn logout(&self, token: &str) -> Result<(), ApiError> {
        let url = self.config.endpoint("auth/logout")?;
        let resp = self
            .http
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if status.is_success() {
            return Ok(());
        }
        decode_envelope::<serde_json::Value>(status, &body).map(|_| ())
    }

    async fn fetch_profile(&self, token: &str) -> Result<UserProfile, ApiError> {
        let url = self.config.endpoint("auth/me")?;
        let resp = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        decode_envelope(status, &body)
    }
}

/// Map a login response to a payload or a user-facing error.
pub(crate) fn login_outcome(status: StatusCode, body: &str) -> Result<LoginPayload, LoginError> {
    let envelope: ApiEnvelope<LoginPayload> = match serde_json::from_str(body) {
        Ok(env) => env,
        Err(_) if status.is_success() => return Err(LoginError::Malformed(format!("unparseable body ({status})"))),
        Err(_) => return Err(status_error(status, None, None)),
    };

    if status.is_success() && envelope.success {
        let payload = envelope
            .data
            .ok_or_else(|| LoginError::Malformed("login response without data".into()))?;
        if payload.token.trim().is_empty() {
            return Err(LoginError::Malformed("login response with empty token".into()));
        }
        return Ok(payload);
    }

    let error = envelope.error.unwrap_or_default();
    Err(status_error(status, error.code.as_deref(), error.message))
}

fn status_error(status: StatusCode, code: Option<&str>, message: Option<String>) -> LoginError {
    match code {
        Some("INVALID_CREDENTIALS" | "USER_NOT_FOUND") => return LoginError::InvalidCredentials,
        Some("USER_INACTIVE" | "ACCOUNT_DISABLED") => return LoginError::AccountDisabled,
        _ => {}
    }
    match status {
        StatusCode::UNAUTHORIZED => LoginError::InvalidCredentials,
        StatusCode::FORBIDDEN => LoginError::AccountDisabled,
        _ => LoginError::Server {
            status: status.as_u16(),
            message: message.unwrap_or_else(|| "Error al iniciar sesión".to_owned()),
        },
    }
}
