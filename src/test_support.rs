//! Shared fixtures for unit tests: profiles, mock backend, mock REST API.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use axum::Json;
use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use serde_json::{Value, json};

use crate::net::backend::{AuthBackend, LoginError};
use crate::net::interceptor::ApiError;
use crate::net::types::{Credentials, LoginPayload, UserProfile};
use crate::state::auth::AuthState;
use crate::storage::{KeyValueStore, MemoryStore, SessionStore, StorageError};

pub const TEST_USERNAME: &str = "admin";
pub const TEST_PASSWORD: &str = "secret";
pub const TEST_TOKEN: &str = "jwt-test-token";

// =============================================================================
// FIXTURES
// =============================================================================

#[must_use]
pub fn user_with_role(role: &str) -> UserProfile {
    UserProfile {
        id: 1,
        username: TEST_USERNAME.to_owned(),
        email: "admin@terracanada.ca".to_owned(),
        full_name: "Ana Gagnon".to_owned(),
        role_id: match role {
            "administrador" => 1,
            "supervisor" => 2,
            _ => 3,
        },
        role_name: role.to_owned(),
        permissions: Vec::new(),
    }
}

/// Unique path under the system temp dir for file-backed store tests.
#[must_use]
pub fn scratch_path(tag: &str) -> PathBuf {
    std::env::temp_dir()
        .join("terra-session-tests")
        .join(format!("{tag}-{}.json", uuid::Uuid::new_v4()))
}

// =============================================================================
// MOCK BACKEND
// =============================================================================

pub struct MockBackend {
    pub user: UserProfile,
    pub logout_calls: AtomicUsize,
    pub fail_logout: AtomicBool,
    pub reject_profile: AtomicBool,
}

impl MockBackend {
    #[must_use]
    pub fn new(role: &str) -> Self {
        Self {
            user: user_with_role(role),
            logout_calls: AtomicUsize::new(0),
            fail_logout: AtomicBool::new(false),
            reject_profile: AtomicBool::new(false),
        }
    }
}

#[async_trait::async_trait]
impl AuthBackend for MockBackend {
    async fn login(&self, credentials: &Credentials) -> Result<LoginPayload, LoginError> {
        if credentials.username == TEST_USERNAME && credentials.password == TEST_PASSWORD {
            Ok(LoginPayload { token: TEST_TOKEN.to_owned(), user: self.user.clone() })
        } else {
            Err(LoginError::InvalidCredentials)
        }
    }

    async fn logout(&self, _token: &str) -> Result<(), ApiError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(ApiError::Api { status: 500, code: None, message: Some("down".into()) });
        }
        Ok(())
    }

    async fn fetch_profile(&self, _token: &str) -> Result<UserProfile, ApiError> {
        if self.reject_profile.load(Ordering::SeqCst) {
            return Err(ApiError::Api { status: 401, code: Some("INVALID_TOKEN".into()), message: None });
        }
        let mut user = self.user.clone();
        user.full_name = "Ana Gagnon-Tremblay".to_owned();
        Ok(user)
    }
}

/// Key-value store whose writes always fail.
pub struct FailingStore;

impl KeyValueStore for FailingStore {
    fn get_item(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Ok(None)
    }

    fn set_item(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("quota exceeded".into()))
    }

    fn remove_item(&self, _key: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Store that reads and writes normally but refuses every removal.
pub struct UndeletableStore(pub MemoryStore);

impl KeyValueStore for UndeletableStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.0.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.0.set_item(key, value)
    }

    fn remove_item(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("storage is read-only".into()))
    }
}

/// Anonymous auth state over a mock backend and a fresh memory store.
#[must_use]
pub fn mock_auth(role: &str) -> (AuthState, Arc<MockBackend>, MemoryStore) {
    let backend = Arc::new(MockBackend::new(role));
    let memory = MemoryStore::new();
    let auth = AuthState::new(backend.clone(), SessionStore::new(Arc::new(memory.clone())));
    (auth, backend, memory)
}

/// Auth state already logged in as `role`.
pub async fn logged_in(role: &str) -> (AuthState, Arc<MockBackend>, MemoryStore) {
    let (auth, backend, memory) = mock_auth(role);
    auth.login(&Credentials::new(TEST_USERNAME, TEST_PASSWORD))
        .await
        .expect("mock login should succeed");
    (auth, backend, memory)
}

// =============================================================================
// MOCK REST API
// =============================================================================

fn envelope_error(status: StatusCode, code: &str, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "success": false, "error": { "code": code, "message": message } })))
}

fn bearer_is_valid(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TEST_TOKEN}"))
}

async fn api_login(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    match (body["username"].as_str(), body["password"].as_str()) {
        (Some(TEST_USERNAME), Some(TEST_PASSWORD)) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": { "token": TEST_TOKEN, "user": user_with_role("administrador") }
            })),
        ),
        (Some("inactivo"), _) => envelope_error(StatusCode::FORBIDDEN, "USER_INACTIVE", "Usuario inactivo"),
        (Some("vacio"), _) => (StatusCode::OK, Json(json!({ "success": true, "data": { "token": "", "user": user_with_role("equipo") } }))),
        _ => envelope_error(StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS", "Credenciales inválidas"),
    }
}

async fn api_logout() -> Json<Value> {
    Json(json!({ "success": true, "data": null }))
}

async fn api_me(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if !bearer_is_valid(&headers) {
        return envelope_error(StatusCode::UNAUTHORIZED, "INVALID_TOKEN", "Token inválido");
    }
    (StatusCode::OK, Json(json!({ "success": true, "data": user_with_role("administrador") })))
}

async fn api_pagos(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if !bearer_is_valid(&headers) {
        return envelope_error(StatusCode::UNAUTHORIZED, "INVALID_TOKEN", "Token inválido");
    }
    (
        StatusCode::OK,
        Json(json!({ "success": true, "data": [ { "id": 1, "monto": 1250.5 }, { "id": 2, "monto": 80.0 } ] })),
    )
}

async fn api_echo_headers(headers: HeaderMap) -> Json<Value> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned);
    Json(json!({
        "success": true,
        "data": { "authorization": header("authorization"), "requestId": header("x-request-id") }
    }))
}

async fn api_expired() -> (StatusCode, Json<Value>) {
    envelope_error(StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED", "Token expirado")
}

async fn api_unrelated_401() -> (StatusCode, Json<Value>) {
    envelope_error(StatusCode::UNAUTHORIZED, "INVALID_PIN", "PIN de tarjeta incorrecto")
}

async fn api_broken() -> (StatusCode, Json<Value>) {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "success": false, "error": "Error interno" })))
}

async fn api_create(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    (StatusCode::CREATED, Json(json!({ "success": true, "data": body })))
}

/// Serve the mock API on an ephemeral port; returns the `/api/v1` base URL.
pub async fn spawn_mock_api() -> String {
    let app = Router::new()
        .route("/api/v1/auth/login", post(api_login))
        .route("/api/v1/auth/logout", post(api_logout))
        .route("/api/v1/auth/me", get(api_me))
        .route("/api/v1/pagos", get(api_pagos).post(api_create))
        .route("/api/v1/echo-headers", get(api_echo_headers))
        .route("/api/v1/expired", get(api_expired))
        .route("/api/v1/tarjetas/pin", get(api_unrelated_401))
        .route("/api/v1/broken", get(api_broken))
        .route("/webhook/echo-headers", get(api_echo_headers))
        .route("/webhook/expired", get(api_expired));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock api");
    let addr = listener.local_addr().expect("mock api addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock api server failed");
    });
    format!("http://{addr}/api/v1")
}
