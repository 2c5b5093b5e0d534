use super::*;
use crate::metadata::Scope;
use crate::test_helpers::{ada, meta};
use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// =============================================================================
// Stub identity service
// =============================================================================

#[derive(Clone, Default)]
struct Stub {
    user: Arc<Mutex<Option<ServerUser>>>,
    server_keys: Arc<Mutex<Vec<Option<String>>>>,
    invalidated: Arc<Mutex<Vec<String>>>,
    fail: Arc<AtomicBool>,
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

async fn me(State(stub): State<Stub>, headers: HeaderMap) -> Response {
    stub.server_keys
        .lock()
        .unwrap()
        .push(header(&headers, SERVER_KEY_HEADER));
    if stub.fail.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }
    let user = stub.user.lock().unwrap().clone();
    match (header(&headers, SESSION_TOKEN_HEADER).as_deref(), user) {
        (Some("good"), Some(user)) => Json(user).into_response(),
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn patch_user(State(stub): State<Stub>, Path(id): Path<String>, Json(update): Json<UserUpdate>) -> Response {
    let mut guard = stub.user.lock().unwrap();
    match guard.as_mut().filter(|u| u.profile.id == id) {
        Some(user) => {
            if let Some(name) = update.display_name {
                user.profile.display_name = Some(name);
            }
            user.metadata.replace_with(update.metadata);
            Json(user.clone()).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn drop_sessions(State(stub): State<Stub>, Path(id): Path<String>) -> StatusCode {
    stub.invalidated.lock().unwrap().push(id);
    StatusCode::NO_CONTENT
}

async fn serve(stub: Stub) -> String {
    let app = Router::new()
        .route("/users/me", get(me))
        .route("/users/{id}", patch(patch_user))
        .route("/users/{id}/sessions", delete(drop_sessions))
        .with_state(stub);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn client(base: &str, server_key: Option<&str>) -> HttpBackend {
    HttpBackend::new(base, server_key.map(str::to_owned), Duration::from_secs(5)).expect("client builds")
}

// =============================================================================
// fetch_session
// =============================================================================

#[tokio::test]
async fn fetch_with_valid_token_returns_full_user() {
    let stub = Stub::default();
    *stub.user.lock().unwrap() = Some(ada());
    let base = serve(stub.clone()).await;

    let user = client(&base, Some("sk_test"))
        .fetch_session(&Credentials::from_token("good"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(user, ada());
    assert_eq!(*stub.server_keys.lock().unwrap(), vec![Some("sk_test".to_owned())]);
}

#[tokio::test]
async fn fetch_with_rejected_token_is_anonymous() {
    let stub = Stub::default();
    *stub.user.lock().unwrap() = Some(ada());
    let base = serve(stub).await;

    let user = client(&base, None)
        .fetch_session(&Credentials::from_token("bad"))
        .await
        .unwrap();
    assert!(user.is_none());
}

#[tokio::test]
async fn fetch_without_token_makes_no_request() {
    let stub = Stub::default();
    let base = serve(stub.clone()).await;

    let user = client(&base, None)
        .fetch_session(&Credentials::anonymous())
        .await
        .unwrap();
    assert!(user.is_none());
    assert!(stub.server_keys.lock().unwrap().is_empty());
}

#[tokio::test]
async fn fetch_server_error_is_status_error() {
    let stub = Stub::default();
    stub.fail.store(true, Ordering::SeqCst);
    let base = serve(stub).await;

    let err = client(&base, None)
        .fetch_session(&Credentials::from_token("good"))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Status { status: 500, ref body } if body == "boom"));
}

#[tokio::test]
async fn unreachable_backend_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{addr}"), None)
        .fetch_session(&Credentials::from_token("good"))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Transport(_)));
}

// =============================================================================
// apply_update / invalidate_session
// =============================================================================

#[tokio::test]
async fn apply_update_returns_authoritative_record() {
    let stub = Stub::default();
    *stub.user.lock().unwrap() = Some(ada());
    let base = serve(stub.clone()).await;

    let update = UserUpdate::default()
        .display_name("Countess")
        .server_metadata(meta(json!({"role": "admin"})));
    let user = client(&base, None)
        .apply_update("user-ada", &update)
        .await
        .unwrap();

    assert_eq!(user.profile.display_name.as_deref(), Some("Countess"));
    assert_eq!(user.metadata.server(Scope::Server).unwrap()["role"], "admin");
    assert_eq!(stub.user.lock().unwrap().clone(), Some(user));
}

#[tokio::test]
async fn apply_update_unknown_user() {
    let base = serve(Stub::default()).await;
    let err = client(&base, None)
        .apply_update("ghost", &UserUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::UnknownUser(ref id) if id == "ghost"));
}

#[tokio::test]
async fn invalidate_session_hits_sessions_endpoint() {
    let stub = Stub::default();
    let base = serve(stub.clone()).await;

    client(&base, None)
        .invalidate_session("user-ada")
        .await
        .unwrap();
    assert_eq!(*stub.invalidated.lock().unwrap(), vec!["user-ada".to_owned()]);
}

// =============================================================================
// construction
// =============================================================================

#[test]
fn base_url_trailing_slash_trimmed() {
    let backend = client("http://id.example.com/api/", None);
    assert_eq!(backend.base_url(), "http://id.example.com/api");
}

#[test]
fn user_path_encodes_id() {
    assert_eq!(user_path("a/b c"), "/users/a%2Fb%20c");
}

#[test]
fn from_config_without_url_is_none() {
    let backend = HttpBackend::from_config(&SessionConfig::default()).unwrap();
    assert!(backend.is_none());
}

#[test]
fn from_config_with_url_builds_client() {
    let config = SessionConfig { backend_url: Some("http://id.internal".into()), ..SessionConfig::default() };
    let backend = HttpBackend::from_config(&config).unwrap().unwrap();
    assert_eq!(backend.base_url(), "http://id.internal");
}
