//! Demo server wiring the one-shot store into an axum app.
//!
//! Uses the REST identity service when `IDENTITY_BACKEND_URL` is set,
//! otherwise an in-memory backend with a passwordless sign-in route.

use std::sync::Arc;

use axum::Router;
use axum::extract::{FromRef, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use sessionkit::backend::{BackendError, HttpBackend, IdentityBackend, MemoryBackend};
use sessionkit::config::env_parse;
use sessionkit::web::{self, ApiUser, AuthContext, AuthRejection, CurrentSession, RequireUser};
use sessionkit::{ClientUser, Scope, SessionConfig, UserUpdate, greeting};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
struct DemoState {
    auth: AuthContext,
    memory: Option<MemoryBackend>,
}

impl FromRef<DemoState> for AuthContext {
    fn from_ref(state: &DemoState) -> Self {
        state.auth.clone()
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = SessionConfig::from_env();
    let port: u16 = env_parse("PORT", 3000);

    let (backend, memory): (Arc<dyn IdentityBackend>, Option<MemoryBackend>) =
        match HttpBackend::from_config(&config).expect("identity client init failed") {
            Some(http) => {
                tracing::info!(base_url = http.base_url(), "using identity service");
                (Arc::new(http), None)
            }
            None => {
                tracing::warn!("IDENTITY_BACKEND_URL not set; using in-memory identity backend");
                let memory = MemoryBackend::new();
                (Arc::new(memory.clone()), Some(memory))
            }
        };

    let state = DemoState { auth: AuthContext::new(backend, config), memory };
    let app = app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "sessionkit demo listening");
    axum::serve(listener, app).await.expect("server failed");
}

fn app(state: DemoState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/protected", get(protected))
        .route("/api/me", get(me).patch(update_me))
        .route("/handler/sign-in", get(sign_in))
        .route("/handler/sign-out", post(sign_out))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// HANDLERS
// =============================================================================

async fn home(current: CurrentSession) -> String {
    greeting(&current.session.to_client())
}

async fn protected(auth: RequireUser) -> Json<ClientUser> {
    Json(auth.user.to_client())
}

async fn me(current: CurrentSession) -> Json<Option<ClientUser>> {
    Json(current.session.to_client().into_user())
}

/// Browser-originated update: only client metadata and display name.
async fn update_me(auth: ApiUser, Json(update): Json<UserUpdate>) -> Result<Json<Option<ClientUser>>, AuthRejection> {
    update.metadata.check_scope(Scope::Client)?;
    let session = auth.store.update(update).await?;
    Ok(Json(session.to_client().into_user()))
}

#[derive(Deserialize)]
struct SignInParams {
    email: Option<String>,
    after_auth_return_to: Option<String>,
}

async fn sign_in(State(state): State<DemoState>, jar: CookieJar, Query(params): Query<SignInParams>) -> Response {
    let Some(memory) = state.memory.as_ref() else {
        return (StatusCode::NOT_FOUND, "sign-in is handled by the identity service").into_response();
    };
    let Some(email) = params.email.as_deref() else {
        return (StatusCode::BAD_REQUEST, "email query parameter required").into_response();
    };
    match memory.sign_in_with_email(email) {
        Ok((user, token)) => {
            tracing::info!(user_id = %user.profile.id, "demo sign-in");
            web::signed_in(&state.auth, jar, token, params.after_auth_return_to.as_deref())
        }
        Err(BackendError::Invalid(msg)) => (StatusCode::BAD_REQUEST, msg).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "demo sign-in failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn sign_out(State(state): State<DemoState>, current: CurrentSession, jar: CookieJar) -> Response {
    web::sign_out(&state.auth, &current.store, jar).await
}

async fn healthz() -> &'static str {
    "ok"
}
