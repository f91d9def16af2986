use super::*;
use crate::state::auth::AuthEvent;
use crate::storage::{KeyValueStore, MemoryStore, SessionStore, TOKEN_KEY, USER_KEY};
use crate::test_support::{MockBackend, TEST_TOKEN, logged_in, mock_auth, spawn_mock_api, user_with_role};
use serde_json::Value;

async fn client_for(auth: AuthState) -> (ApiClient, String) {
    let base = spawn_mock_api().await;
    let config = TerraConfig::with_api_url(&base).unwrap();
    (ApiClient::new(Arc::new(config), auth).unwrap(), base)
}

/// Auth state restored from storage holding a token the mock API rejects.
fn stale_session() -> AuthState {
    let memory = MemoryStore::new();
    memory.set_item(TOKEN_KEY, "stale-jwt").unwrap();
    memory
        .set_item(USER_KEY, &serde_json::to_string(&user_with_role("supervisor")).unwrap())
        .unwrap();
    let auth = AuthState::new(Arc::new(MockBackend::new("supervisor")), SessionStore::new(Arc::new(memory)));
    auth.restore().unwrap();
    auth
}

// =============================================================================
// pure helpers
// =============================================================================

#[test]
fn session_rejection_needs_401_and_known_code() {
    assert!(is_session_rejection(401, Some("INVALID_TOKEN")));
    assert!(is_session_rejection(401, Some("TOKEN_EXPIRED")));
    assert!(!is_session_rejection(401, Some("INVALID_CREDENTIALS")));
    assert!(!is_session_rejection(401, None));
    assert!(!is_session_rejection(403, Some("INVALID_TOKEN")));
}

#[test]
fn decode_envelope_success_and_failure() {
    let data: Vec<i32> = decode_envelope(StatusCode::OK, r#"{"success":true,"data":[1]}"#).unwrap();
    assert_eq!(data, vec![1]);

    let err = decode_envelope::<Value>(StatusCode::NOT_FOUND, r#"{"success":false,"error":{"code":"NOT_FOUND"}}"#)
        .unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.user_message(), "Registro no encontrado");

    let err = decode_envelope::<Value>(StatusCode::OK, "not json").unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
}

#[test]
fn user_message_prefers_server_text() {
    let err = ApiError::Api { status: 400, code: Some("VALIDATION_ERROR".into()), message: Some("Monto requerido".into()) };
    assert_eq!(err.user_message(), "Monto requerido");

    let err = ApiError::Api { status: 400, code: Some("VALIDATION_ERROR".into()), message: None };
    assert_eq!(err.user_message(), "Datos inválidos");

    let err = ApiError::Api { status: 503, code: None, message: None };
    assert_eq!(err.user_message(), "Error del servidor. Intente más tarde");
}

#[test]
fn session_expired_redirects_to_login() {
    let err = ApiError::SessionExpired { code: "TOKEN_EXPIRED".into() };
    assert_eq!(err.redirect(), Some(LOGIN_PATH));
    assert_eq!(err.status(), Some(401));
    assert!(ApiError::MissingData.redirect().is_none());
}

#[tokio::test]
async fn is_internal_checks_origin_and_base_path() {
    let (auth, _, _) = mock_auth("equipo");
    let config = TerraConfig::with_api_url("https://api.terracanada.ca/api/v1").unwrap();
    let client = ApiClient::new(Arc::new(config), auth).unwrap();

    let internal = |raw: &str| client.is_internal(&Url::parse(raw).unwrap());
    assert!(internal("https://api.terracanada.ca/api/v1/pagos"));
    assert!(!internal("https://api.terracanada.ca/webhook/ocr"));
    assert!(!internal("http://api.terracanada.ca/api/v1/pagos"));
    assert!(!internal("https://api.terracanada.ca:8443/api/v1/pagos"));
    assert!(!internal("https://n8n.terracanada.ca/api/v1/pagos"));
    assert!(!internal("https://api.terracanada.ca/api/v10/pagos"));
}

#[tokio::test]
async fn bare_api_base_is_internal() {
    let (auth, _, _) = mock_auth("equipo");
    let config = TerraConfig::with_api_url("https://api.terracanada.ca/api/v1/").unwrap();
    let client = ApiClient::new(Arc::new(config), auth).unwrap();

    assert!(client.is_internal(&Url::parse("https://api.terracanada.ca/api/v1").unwrap()));
    assert!(client.is_internal(&Url::parse("https://api.terracanada.ca/api/v1/").unwrap()));
    assert!(client.is_internal(&Url::parse("https://api.terracanada.ca/api/v1?page=2").unwrap()));
}

// =============================================================================
// header attachment
// =============================================================================

#[tokio::test]
async fn internal_request_carries_bearer_and_request_id() {
    let (auth, _, _) = logged_in("equipo").await;
    let (client, _) = client_for(auth).await;

    let echoed: Value = client.get("/echo-headers").await.unwrap();
    assert_eq!(echoed["authorization"], format!("Bearer {TEST_TOKEN}"));
    let request_id = echoed["requestId"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(request_id).is_ok());
}

#[tokio::test]
async fn anonymous_request_has_no_bearer() {
    let (auth, _, _) = mock_auth("equipo");
    let (client, _) = client_for(auth).await;

    let echoed: Value = client.get("echo-headers").await.unwrap();
    assert!(echoed["authorization"].is_null());
    assert!(echoed["requestId"].is_string());
}

#[tokio::test]
async fn request_outside_api_base_is_untouched() {
    let (auth, _, _) = logged_in("equipo").await;
    let (client, base) = client_for(auth).await;
    let webhook = base.replace("/api/v1", "/webhook/echo-headers");

    let echoed: Value = client.get(&webhook).await.unwrap();
    assert!(echoed["authorization"].is_null());
    assert!(echoed["requestId"].is_null());
}

// =============================================================================
// 401 handling
// =============================================================================

#[tokio::test]
async fn invalid_token_401_forces_logout() {
    let auth = stale_session();
    let mut events = auth.events();
    let (client, _) = client_for(auth.clone()).await;

    let err = client.get::<Value>("pagos").await.unwrap_err();
    assert!(matches!(err, ApiError::SessionExpired { ref code } if code == "INVALID_TOKEN"));
    assert_eq!(err.redirect(), Some(LOGIN_PATH));
    assert!(!auth.is_authenticated());
    assert_eq!(events.recv().await.unwrap(), AuthEvent::LoggedOut { reason: LogoutReason::TokenRejected });
}

#[tokio::test]
async fn token_expired_401_forces_logout() {
    let (auth, _, memory) = logged_in("administrador").await;
    let (client, _) = client_for(auth.clone()).await;

    let err = client.get::<Value>("expired").await.unwrap_err();
    assert!(matches!(err, ApiError::SessionExpired { .. }));
    assert!(!auth.is_authenticated());
    assert!(memory.is_empty());
}

#[tokio::test]
async fn unrelated_401_passes_through_without_logout() {
    let (auth, _, _) = logged_in("equipo").await;
    let (client, _) = client_for(auth.clone()).await;

    let request = client.request(Method::GET, "tarjetas/pin").unwrap().build().unwrap();
    let response = client.execute(request).await.unwrap();
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert!(response.body.contains("INVALID_PIN"));
    assert!(auth.is_authenticated());

    let err = response.into_data::<Value>().unwrap_err();
    assert_eq!(err.code(), Some("INVALID_PIN"));
    assert_eq!(err.user_message(), "PIN de tarjeta incorrecto");
    assert!(err.redirect().is_none());
}

#[tokio::test]
async fn external_401_with_session_code_does_not_logout() {
    let (auth, _, _) = logged_in("equipo").await;
    let (client, base) = client_for(auth.clone()).await;
    let webhook = base.replace("/api/v1", "/webhook/expired");

    let request = client.request(Method::GET, &webhook).unwrap().build().unwrap();
    let response = client.execute(request).await.unwrap();
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert!(auth.is_authenticated());
}

// =============================================================================
// typed helpers
// =============================================================================

#[tokio::test]
async fn get_list_with_valid_session() {
    let (auth, _, _) = logged_in("supervisor").await;
    let (client, _) = client_for(auth).await;

    let pagos: Vec<Value> = client.get("pagos").await.unwrap();
    assert_eq!(pagos.len(), 2);
    assert_eq!(pagos[0]["id"], 1);
}

#[tokio::test]
async fn post_returns_created_payload() {
    let (auth, _, _) = logged_in("supervisor").await;
    let (client, _) = client_for(auth).await;

    let body = serde_json::json!({ "monto": 300, "proveedorId": 4 });
    let created: Value = client.post("pagos", &body).await.unwrap();
    assert_eq!(created, body);
}

#[tokio::test]
async fn server_error_string_becomes_toast_message() {
    let (auth, _, _) = logged_in("supervisor").await;
    let (client, _) = client_for(auth.clone()).await;

    let err = client.get::<Value>("broken").await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.user_message(), "Error interno");
    assert!(auth.is_authenticated());
}
