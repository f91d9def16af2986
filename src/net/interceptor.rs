//! Authenticated API client: bearer-token attachment and session rejection.
//!
//! ARCHITECTURE
//! ============
//! Every request goes through `ApiClient::execute`. Requests aimed at the
//! internal API (same origin as `TerraConfig::api_url` and under its path)
//! get `Authorization: Bearer <token>` and an `x-request-id`; anything else,
//! such as the n8n webhooks, is sent untouched.
//!
//! A 401 from the internal API whose `error.code` is one of
//! `SESSION_REJECTION_CODES` closes the session and surfaces
//! `ApiError::SessionExpired`. All other responses pass through unchanged.

#[cfg(test)]
#[path = "interceptor_test.rs"]
mod interceptor_test;

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue, InvalidHeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::types::ApiEnvelope;
use crate::config::{ConfigError, TerraConfig};
use crate::guards::LOGIN_PATH;
use crate::state::auth::{AuthState, LogoutReason};

/// Error codes on a 401 that mean the stored token is no longer usable.
pub const SESSION_REJECTION_CODES: &[&str] = &["INVALID_TOKEN", "TOKEN_EXPIRED", "NO_TOKEN"];

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("session rejected by server ({code})")]
    SessionExpired { code: String },
    #[error("api error {status} (code: {code:?}, message: {message:?})")]
    Api { status: u16, code: Option<String>, message: Option<String> },
    #[error("response envelope reported success without data")]
    MissingData,
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::SessionExpired { .. } => Some(StatusCode::UNAUTHORIZED.as_u16()),
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::SessionExpired { code } => Some(code),
            Self::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// True when the server rejected the bearer token itself.
    #[must_use]
    pub fn is_session_rejection(&self) -> bool {
        match self {
            Self::SessionExpired { .. } => true,
            Self::Api { status, code, .. } => is_session_rejection(*status, code.as_deref()),
            _ => false,
        }
    }

    /// Where the UI should navigate after this error, if anywhere.
    #[must_use]
    pub fn redirect(&self) -> Option<&'static str> {
        self.is_session_rejection().then_some(LOGIN_PATH)
    }

    /// Toast text: server message first, then a message by code, then by status.
    #[must_use]
    pub fn user_message(&self) -> String {
        if let Self::Api { message: Some(message), .. } = self {
            if !message.trim().is_empty() {
                return message.clone();
            }
        }
        if self.is_session_rejection() {
            return "Su sesión ha expirado. Inicie sesión nuevamente".to_owned();
        }
        let by_code = match self.code() {
            Some("VALIDATION_ERROR") => Some("Datos inválidos"),
            Some("NOT_FOUND") => Some("Registro no encontrado"),
            Some("DUPLICATE_ENTRY") => Some("El registro ya existe"),
            Some("FORBIDDEN") => Some("No tiene permisos para esta acción"),
            _ => None,
        };
        if let Some(text) = by_code {
            return text.to_owned();
        }
        match self.status() {
            Some(403) => "No tiene permisos para esta acción".to_owned(),
            Some(404) => "Recurso no encontrado".to_owned(),
            Some(status) if status >= 500 => "Error del servidor. Intente más tarde".to_owned(),
            _ if matches!(self, Self::Http(_)) => "No se pudo conectar con el servidor".to_owned(),
            _ => "Ocurrió un error inesperado".to_owned(),
        }
    }
}

/// Whether a 401 carrying `code` should end the session.
#[must_use]
pub fn is_session_rejection(status: u16, code: Option<&str>) -> bool {
    status == StatusCode::UNAUTHORIZED.as_u16() && code.is_some_and(|c| SESSION_REJECTION_CODES.contains(&c))
}

/// Unwrap a `{ success, data, error }` body into `T`.
pub(crate) fn decode_envelope<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T, ApiError> {
    let parsed = serde_json::from_str::<ApiEnvelope<T>>(body);
    match parsed {
        Ok(env) if status.is_success() && env.success => env.data.ok_or(ApiError::MissingData),
        Ok(env) => {
            let error = env.error.unwrap_or_default();
            Err(ApiError::Api { status: status.as_u16(), code: error.code, message: error.message })
        }
        Err(e) if status.is_success() => Err(ApiError::Decode(e)),
        Err(_) => Err(ApiError::Api { status: status.as_u16(), code: None, message: None }),
    }
}

/// Error code of an envelope body, if it parses.
fn envelope_error_code(body: &str) -> Option<String> {
    serde_json::from_str::<ApiEnvelope<serde_json::Value>>(body)
        .ok()
        .and_then(|env| env.error)
        .and_then(|error| error.code)
}

// =============================================================================
// RESPONSE
// =============================================================================

/// A fully-read response that was not intercepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    /// Decode the envelope, mapping failures to `ApiError::Api`.
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        decode_envelope(self.status, &self.body)
    }
}

// =============================================================================
// CLIENT
// =============================================================================

/// HTTP client bound to the session state.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: Arc<TerraConfig>,
    auth: AuthState,
}

impl ApiClient {
    pub fn new(config: Arc<TerraConfig>, auth: AuthState) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { http, config, auth })
    }

    #[must_use]
    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    /// Same origin as the API base and under its path prefix.
    #[must_use]
    pub fn is_internal(&self, url: &Url) -> bool {
        let base = &self.config.api_url;
        let prefix = base.path().trim_end_matches('/');
        let path = url.path();
        url.origin() == base.origin()
            && path.strip_prefix(prefix).is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    /// Send `request`, attaching credentials when it targets the internal API.
    pub async fn execute(&self, mut request: reqwest::Request) -> Result<ApiResponse, ApiError> {
        let internal = self.is_internal(request.url());
        if internal {
            if let Some(token) = self.auth.token() {
                let value = HeaderValue::from_str(&format!("Bearer {token}"))?;
                request.headers_mut().insert(AUTHORIZATION, value);
            }
            let request_id = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string())?;
            request.headers_mut().insert(HeaderName::from_static(REQUEST_ID_HEADER), request_id);
        }

        let method = request.method().clone();
        let path = request.url().path().to_owned();
        let resp = self.http.execute(request).await?;
        let status = resp.status();
        let body = resp.text().await?;

        if internal && status == StatusCode::UNAUTHORIZED {
            if let Some(code) = envelope_error_code(&body).filter(|c| is_session_rejection(status.as_u16(), Some(c.as_str()))) {
                tracing::warn!(%method, %path, %code, "server rejected session token");
                self.auth.force_logout(LogoutReason::TokenRejected);
                return Err(ApiError::SessionExpired { code });
            }
        }

        tracing::debug!(%method, %path, status = status.as_u16(), "api response");
        Ok(ApiResponse { status, body })
    }

    /// Build a request for `path`, resolved against the API base unless absolute.
    pub fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, ApiError> {
        let url = self.config.endpoint(path)?;
        Ok(self.http.request(method, url))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.request(Method::GET, path)?.build()?;
        self.execute(request).await?.into_data()
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let request = self.request(Method::POST, path)?.json(body).build()?;
        self.execute(request).await?.into_data()
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let request = self.request(Method::PUT, path)?.json(body).build()?;
        self.execute(request).await?.into_data()
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.request(Method::DELETE, path)?.build()?;
        self.execute(request).await?.into_data()
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient").field("api_url", &self.config.api_url.as_str()).finish_non_exhaustive()
    }
}
