//! Wire DTOs for the Terra REST API.
//!
//! DESIGN
//! ======
//! Every endpoint under `/api/v1` answers with the same envelope:
//! `{ "success": bool, "data": T?, "error": { "code"?, "message"? }? }`.
//! Older handlers send `error` as a bare string, so the error body accepts
//! both shapes. Field names are camelCase on the wire.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// Standard response envelope returned by the API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default, deserialize_with = "deserialize_error_body")]
    pub error: Option<ApiErrorBody>,
}

/// Error payload carried in a failed envelope.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// Machine-readable code (e.g. `"INVALID_TOKEN"`).
    #[serde(default)]
    pub code: Option<String>,
    /// Human-readable message, usually already localized by the server.
    #[serde(default)]
    pub message: Option<String>,
}

/// The authenticated user's profile as stored in the session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    pub role_id: i64,
    /// Role name: `administrador`, `supervisor` or `equipo`.
    pub role_name: String,
    /// Dotted permission tokens such as `pagos.crear`.
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Username/password pair posted to `/auth/login`.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// `data` payload of a successful login.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginPayload {
    pub token: String,
    pub user: UserProfile,
}

fn deserialize_error_body<'de, D>(deserializer: D) -> Result<Option<ApiErrorBody>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(message)) => Ok(Some(ApiErrorBody { code: None, message: Some(message) })),
        Some(object @ serde_json::Value::Object(_)) => serde_json::from_value(object).map(Some).map_err(D::Error::custom),
        Some(_) => Err(D::Error::custom("expected error object or string")),
    }
}
