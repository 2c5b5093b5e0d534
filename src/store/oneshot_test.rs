use super::*;
use crate::guard::test_helpers::RecordingRedirector;
use crate::test_helpers::{MockBackend, SECRET_MARKER, ada, meta};
use serde_json::{Value, json};
use std::sync::atomic::Ordering;
use tokio::time::{Duration, timeout};

fn store_with(backend: Arc<MockBackend>) -> OneShotStore {
    OneShotStore::new(backend, Credentials::from_token("token"), &SessionConfig::default())
}

// =============================================================================
// get_current
// =============================================================================

#[tokio::test]
async fn request_resolves_session_exactly_once() {
    let backend = Arc::new(MockBackend::with_user(ada()));
    let store = store_with(backend.clone());

    store.get_current().await.unwrap();
    store.get_client_session().await.unwrap();
    store
        .authorize(&AccessPolicy::require_authenticated())
        .await
        .unwrap();
    store.clone().get_current().await.unwrap();
    assert_eq!(backend.fetch_count(), 1);
}

#[tokio::test]
async fn failed_fetch_is_retried_on_next_read() {
    let backend = Arc::new(MockBackend::with_user(ada()));
    backend.fail_fetch.store(true, Ordering::SeqCst);
    let store = store_with(backend.clone());

    assert!(store.get_current().await.is_err());
    backend.fail_fetch.store(false, Ordering::SeqCst);
    assert!(store.get_current().await.unwrap().is_authenticated());
    assert_eq!(backend.fetch_count(), 2);
}

#[tokio::test]
async fn separate_requests_do_not_share_state() {
    let backend = Arc::new(MockBackend::with_user(ada()));
    let first = store_with(backend.clone());
    let second = store_with(backend.clone());

    assert!(first.get_current().await.unwrap().is_authenticated());
    backend.set_user(None);
    assert_eq!(second.get_current().await.unwrap(), Session::Anonymous);
}

#[tokio::test]
async fn server_session_exposes_server_metadata() {
    let backend = Arc::new(MockBackend::with_user(ada()));
    let store = store_with(backend);

    let session = store.get_current().await.unwrap();
    let user = session.user().unwrap();
    assert_eq!(user.metadata.server(Scope::Server).unwrap()["api_key"], SECRET_MARKER);
}

#[tokio::test]
async fn client_session_from_server_context_is_leak_free() {
    let backend = Arc::new(MockBackend::with_user(ada()));
    let store = store_with(backend);

    let client = store.get_client_session().await.unwrap();
    assert!(!serde_json::to_string(&client).unwrap().contains(SECRET_MARKER));
}

#[tokio::test]
async fn cancelled_fetch_returns_nothing() {
    let backend = Arc::new(MockBackend::held(Some(ada())));
    let store = store_with(backend.clone());

    let result = timeout(Duration::from_millis(50), store.get_current()).await;
    assert!(result.is_err());
    assert_eq!(backend.fetch_count(), 1);

    backend.hold_fetch.store(false, Ordering::SeqCst);
    assert!(store.get_current().await.unwrap().is_authenticated());
    assert_eq!(backend.fetch_count(), 2);
}

// =============================================================================
// authorize / user_or
// =============================================================================

#[tokio::test]
async fn authorize_proceeds_for_signed_in_user() {
    let store = store_with(Arc::new(MockBackend::with_user(ada())));
    let (session, outcome) = store
        .authorize(&AccessPolicy::require_authenticated())
        .await
        .unwrap();
    assert!(session.is_authenticated());
    assert_eq!(outcome, GuardResult::Proceed);
}

#[tokio::test]
async fn authorize_redirects_anonymous_to_sign_in() {
    let store = store_with(Arc::new(MockBackend::anonymous()));
    let (_, outcome) = store
        .authorize(&AccessPolicy::require_authenticated())
        .await
        .unwrap();
    assert_eq!(outcome, GuardResult::Redirect("/handler/sign-in".into()));
}

#[tokio::test]
async fn user_or_redirect_uses_supplied_redirector() {
    let store = store_with(Arc::new(MockBackend::anonymous()));
    let redirector = RecordingRedirector::default();

    let user = store.user_or(UserOr::Redirect, &redirector).await.unwrap();
    assert!(user.is_none());
    assert_eq!(redirector.urls(), vec!["/handler/sign-in".to_owned()]);
}

#[tokio::test]
async fn user_or_throw_on_anonymous() {
    let store = store_with(Arc::new(MockBackend::anonymous()));
    let redirector = RecordingRedirector::default();
    let err = store
        .user_or(UserOr::Throw, &redirector)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotAuthenticated));
}

// =============================================================================
// update / sign_out
// =============================================================================

#[tokio::test]
async fn server_update_merges_server_metadata() {
    let backend = Arc::new(MockBackend::with_user(ada()));
    let store = store_with(backend.clone());

    let session = store
        .update(UserUpdate::default().server_metadata(meta(json!({"role": "admin"}))))
        .await
        .unwrap();

    let server = session.user().unwrap().metadata.server(Scope::Server).unwrap();
    assert_eq!(Value::Object(server.clone()), json!({"api_key": SECRET_MARKER, "role": "admin"}));
}

#[tokio::test]
async fn update_acts_on_resolved_session_and_replaces_it() {
    let backend = Arc::new(MockBackend::with_user(ada()));
    let store = store_with(backend.clone());
    store.get_current().await.unwrap();

    store
        .update(UserUpdate::default().display_name("Countess"))
        .await
        .unwrap();
    let session = store.get_current().await.unwrap();

    assert_eq!(session.user().unwrap().profile.display_name.as_deref(), Some("Countess"));
    assert_eq!(backend.fetch_count(), 1);
}

#[tokio::test]
async fn server_update_may_write_read_only_metadata() {
    let backend = Arc::new(MockBackend::with_user(ada()));
    let store = store_with(backend);

    let session = store
        .update(UserUpdate::default().client_read_only_metadata(meta(json!({"seats": 5}))))
        .await
        .unwrap();
    let user = session.user().unwrap();
    assert_eq!(Value::Object(user.metadata.client_read_only().clone()), json!({"plan": "pro", "seats": 5}));
}

#[tokio::test]
async fn anonymous_server_update_is_not_authenticated() {
    let backend = Arc::new(MockBackend::anonymous());
    let store = store_with(backend.clone());

    let err = store
        .update(UserUpdate::default().display_name("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotAuthenticated));
    assert_eq!(backend.update_count(), 0);
}

#[tokio::test]
async fn update_backend_failure_is_surfaced() {
    let backend = Arc::new(MockBackend::with_user(ada()));
    backend.fail_update.store(true, Ordering::SeqCst);
    let store = store_with(backend);

    let err = store
        .update(UserUpdate::default().display_name("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::BackendUnavailable(_)));
}

#[tokio::test]
async fn sign_out_invalidates_and_redirects() {
    let backend = Arc::new(MockBackend::with_user(ada()));
    let store = store_with(backend.clone());
    let redirector = RecordingRedirector::default();

    store.sign_out(&redirector).await.unwrap();

    assert_eq!(backend.invalidations.load(Ordering::SeqCst), 1);
    assert_eq!(redirector.urls(), vec!["/".to_owned()]);
    assert_eq!(store.get_current().await.unwrap(), Session::Anonymous);
    assert_eq!(backend.fetch_count(), 1);
}

#[tokio::test]
async fn sign_out_backend_failure_skips_redirect() {
    let backend = Arc::new(MockBackend::with_user(ada()));
    backend.fail_fetch.store(true, Ordering::SeqCst);
    let store = store_with(backend);
    let redirector = RecordingRedirector::default();

    assert!(store.sign_out(&redirector).await.is_err());
    assert!(redirector.urls().is_empty());
}
