//! End-to-end tests against an in-process backend.
//!
//! The backend accepts exactly one access token at a time. Rotating it
//! simulates expiry; `/auth/token` issues `access-2` for `refresh-1`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

use resourcehub_core::{
    ApiClient, ApiError, AuthTokens, CredentialStore, NewResource, RegisterForm, ResourceQuery,
    SessionManager, SessionState, SortBy, StorageKind, UserProfile,
};

#[derive(Default)]
struct Backend {
    valid_token: Mutex<String>,
    login_calls: AtomicUsize,
    register_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    token_calls: AtomicUsize,
    resource_calls: AtomicUsize,
    locked_calls: AtomicUsize,
    /// Replaces the normal `/auth/token` reply when set
    token_reply: Mutex<Option<Value>>,
    last_query: Mutex<Option<HashMap<String, String>>>,
    last_authorization: Mutex<Option<String>>,
    logout_bodies: Mutex<Vec<Value>>,
    writes: Mutex<Vec<(Method, Value)>>,
}

impl Backend {
    fn new() -> Self {
        let backend = Self::default();
        *backend.valid_token.lock() = "access-1".to_string();
        backend
    }

    /// Invalidate whatever token clients currently hold
    fn expire_tokens(&self) {
        *self.valid_token.lock() = "rotated".to_string();
    }

    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn check_auth(&self, headers: &HeaderMap) -> bool {
        let received = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *self.last_authorization.lock() = received.clone();
        received == Some(format!("Bearer {}", self.valid_token.lock()))
    }
}

type Shared = Arc<Backend>;

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
}

fn resource(id: &str, title: &str) -> Value {
    json!({ "id": id, "title": title, "createdAt": "2024-05-01T09:30:00Z" })
}

async fn login(State(b): State<Shared>, Json(body): Json<Value>) -> Response {
    b.login_calls.fetch_add(1, Ordering::SeqCst);
    if body["email"] == "ada@example.com" && body["password"] == "hunter2" {
        Json(json!({
            "user": { "id": 1, "username": "ada", "email": "ada@example.com" },
            "accessToken": "access-1",
            "refreshToken": "refresh-1",
        }))
        .into_response()
    } else {
        unauthorized("Invalid email or password")
    }
}

async fn register(State(b): State<Shared>, Json(body): Json<Value>) -> Response {
    b.register_calls.fetch_add(1, Ordering::SeqCst);
    if body["email"] == "taken@example.com" {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Email already in use" }))).into_response();
    }
    (StatusCode::CREATED, Json(json!({ "message": "Registered", "username": body["username"] }))).into_response()
}

async fn logout(State(b): State<Shared>, Json(body): Json<Value>) -> StatusCode {
    b.logout_calls.fetch_add(1, Ordering::SeqCst);
    b.logout_bodies.lock().push(body);
    StatusCode::NO_CONTENT
}

async fn token(State(b): State<Shared>, Json(body): Json<Value>) -> Response {
    b.token_calls.fetch_add(1, Ordering::SeqCst);
    // Long enough for concurrent callers to pile up behind the refresh
    tokio::time::sleep(Duration::from_millis(50)).await;
    if let Some(reply) = b.token_reply.lock().clone() {
        return Json(reply).into_response();
    }
    if body["refreshToken"] == "refresh-1" {
        *b.valid_token.lock() = "access-2".to_string();
        Json(json!({ "accessToken": "access-2" })).into_response()
    } else {
        unauthorized("Invalid refresh token")
    }
}

async fn list_resources(
    State(b): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    b.resource_calls.fetch_add(1, Ordering::SeqCst);
    *b.last_query.lock() = Some(query.clone());
    if !b.check_auth(&headers) {
        return unauthorized("Token expired");
    }
    if query.get("limit").map(String::as_str) == Some("5") {
        return Json(json!([])).into_response();
    }
    Json(json!([resource("1", "Rust Book"), resource("2", "Tokio Tutorial")])).into_response()
}

async fn create_resource(State(b): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    b.writes.lock().push((Method::POST, body.clone()));
    if !b.check_auth(&headers) {
        return unauthorized("Token expired");
    }
    (StatusCode::CREATED, Json(json!({ "id": 99, "title": body["title"], "url": body["url"] }))).into_response()
}

async fn get_resource(State(b): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    if !b.check_auth(&headers) {
        return unauthorized("Token expired");
    }
    if id == "missing" {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "Resource not found" }))).into_response();
    }
    Json(resource(&id, "Detail")).into_response()
}

async fn update_resource(
    State(b): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    b.writes.lock().push((Method::PUT, body.clone()));
    if !b.check_auth(&headers) {
        return unauthorized("Token expired");
    }
    Json(json!({ "id": id, "title": body["title"] })).into_response()
}

async fn delete_resource(State(b): State<Shared>, headers: HeaderMap) -> Response {
    if !b.check_auth(&headers) {
        return unauthorized("Token expired");
    }
    StatusCode::NO_CONTENT.into_response()
}

/// Rejects every token, even a freshly refreshed one
async fn locked(State(b): State<Shared>, headers: HeaderMap) -> Response {
    b.locked_calls.fetch_add(1, Ordering::SeqCst);
    b.check_auth(&headers);
    unauthorized("Account suspended")
}

async fn spawn_backend() -> (String, Shared) {
    let backend = Arc::new(Backend::new());
    let app = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/logout", post(logout))
        .route("/auth/token", post(token))
        .route("/api/resources", get(list_resources).post(create_resource))
        .route("/api/locked", get(locked))
        .route(
            "/api/resources/{id}",
            get(get_resource).put(update_resource).delete(delete_resource),
        )
        .with_state(Arc::clone(&backend));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test backend");
    let addr = listener.local_addr().expect("Failed to read local address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test backend stopped");
    });

    (format!("http://{}", addr), backend)
}

fn client_for(base_url: &str) -> ApiClient {
    let store = Arc::new(CredentialStore::in_memory());
    let session = Arc::new(SessionManager::new(store, reqwest::Client::new(), base_url));
    session.initialize();
    ApiClient::new(session)
}

fn ada() -> UserProfile {
    UserProfile::new(json!({ "id": 1, "username": "ada", "email": "ada@example.com" }))
}

// ============================================================================
// Login / logout
// ============================================================================

#[tokio::test]
async fn test_password_login_authenticates_with_server_profile() {
    let (url, backend) = spawn_backend().await;
    let client = client_for(&url);

    let user = client
        .login_with_password("ada@example.com", "hunter2", true)
        .await
        .expect("login should succeed");

    assert_eq!(user, ada());
    let session = client.session();
    assert_eq!(session.state(), SessionState::Authenticated(ada()));
    let stored = session.store().read().unwrap();
    assert_eq!(stored.kind, StorageKind::Durable);
    assert_eq!(stored.credentials.access_token, "access-1");
    assert_eq!(stored.credentials.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(Backend::count(&backend.login_calls), 1);
}

#[tokio::test]
async fn test_rejected_login_surfaces_message_without_refresh() {
    let (url, backend) = spawn_backend().await;
    let client = client_for(&url);

    let err = client
        .login_with_password("ada@example.com", "wrong", false)
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Http { status, .. } if status == StatusCode::UNAUTHORIZED));
    assert_eq!(err.to_string(), "Invalid email or password");
    assert_eq!(Backend::count(&backend.token_calls), 0);
    assert_eq!(client.session().state(), SessionState::Anonymous);
}

#[tokio::test]
async fn test_empty_login_form_never_hits_network() {
    let (url, backend) = spawn_backend().await;
    let client = client_for(&url);

    let err = client.login_with_password("  ", "", false).await.unwrap_err();

    assert!(matches!(err, ApiError::Validation(_)));
    assert_eq!(Backend::count(&backend.login_calls), 0);
}

#[tokio::test]
async fn test_logout_revokes_refresh_token_and_is_idempotent() {
    let (url, backend) = spawn_backend().await;
    let client = client_for(&url);
    client.login_with_password("ada@example.com", "hunter2", true).await.unwrap();

    client.logout().await;

    assert_eq!(client.session().state(), SessionState::Anonymous);
    assert!(client.session().store().read().is_none());
    assert_eq!(Backend::count(&backend.logout_calls), 1);
    assert_eq!(backend.logout_bodies.lock()[0], json!({ "refreshToken": "refresh-1" }));

    // Nothing left to revoke
    client.logout().await;
    assert_eq!(client.session().state(), SessionState::Anonymous);
    assert_eq!(Backend::count(&backend.logout_calls), 1);
}

// ============================================================================
// Refresh and retry
// ============================================================================

#[tokio::test]
async fn test_expired_token_refreshes_once_and_retries_once() {
    let (url, backend) = spawn_backend().await;
    let client = client_for(&url);
    client.login_with_password("ada@example.com", "hunter2", false).await.unwrap();
    backend.expire_tokens();

    let resources = client
        .list_resources(&ResourceQuery::new())
        .await
        .expect("retry should succeed");

    assert_eq!(resources.len(), 2);
    assert_eq!(Backend::count(&backend.token_calls), 1);
    assert_eq!(Backend::count(&backend.resource_calls), 2);
    assert_eq!(client.session().access_token().as_deref(), Some("access-2"));
    assert!(client.session().is_authenticated());
    // Refresh token and area are untouched
    let stored = client.session().store().read().unwrap();
    assert_eq!(stored.kind, StorageKind::Ephemeral);
    assert_eq!(stored.credentials.refresh_token.as_deref(), Some("refresh-1"));
}

#[tokio::test]
async fn test_failed_refresh_surfaces_original_error_and_logs_out() {
    let (url, backend) = spawn_backend().await;
    let client = client_for(&url);
    client
        .session()
        .login(ada(), AuthTokens::new("stale", "revoked"), false);

    let err = client.list_resources(&ResourceQuery::new()).await.unwrap_err();

    assert!(matches!(err, ApiError::AuthExpired(ref m) if m == "Token expired"));
    assert!(err.is_auth_failure());
    assert_eq!(Backend::count(&backend.token_calls), 1);
    assert_eq!(Backend::count(&backend.resource_calls), 1);
    assert_eq!(Backend::count(&backend.logout_calls), 1);
    assert_eq!(client.session().state(), SessionState::Anonymous);
    assert!(client.session().store().read().is_none());
}

#[tokio::test]
async fn test_retry_replays_original_method_and_body() {
    let (url, backend) = spawn_backend().await;
    let client = client_for(&url);
    client.login_with_password("ada@example.com", "hunter2", false).await.unwrap();
    backend.expire_tokens();

    let new = NewResource {
        title: "Async Book".to_string(),
        description: None,
        url: Some("https://rust-lang.github.io/async-book/".to_string()),
    };
    let created = client.create_resource(&new).await.expect("create should succeed");

    assert_eq!(created.id, "99");
    assert_eq!(created.title, "Async Book");
    let writes = backend.writes.lock();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0], writes[1]);
    assert_eq!(writes[1].0, Method::POST);
    assert_eq!(writes[1].1["title"], "Async Book");
}

#[tokio::test]
async fn test_concurrent_unauthorized_requests_share_one_refresh() {
    let (url, backend) = spawn_backend().await;
    let client = client_for(&url);
    client.login_with_password("ada@example.com", "hunter2", false).await.unwrap();
    backend.expire_tokens();

    let query = ResourceQuery::new();
    let (first, second) = tokio::join!(client.list_resources(&query), client.list_resources(&query));

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(Backend::count(&backend.token_calls), 1);
}

#[tokio::test]
async fn test_unauthorized_retry_is_final() {
    let (url, backend) = spawn_backend().await;
    let client = client_for(&url);
    client.login_with_password("ada@example.com", "hunter2", false).await.unwrap();

    let err = client.get::<Value>("/api/locked").await.unwrap_err();

    assert!(matches!(err, ApiError::Http { status, ref message }
        if status == StatusCode::UNAUTHORIZED && message == "Account suspended"));
    assert_eq!(Backend::count(&backend.token_calls), 1);
    assert_eq!(Backend::count(&backend.locked_calls), 2);
    // The replay carried the refreshed token
    assert_eq!(backend.last_authorization.lock().as_deref(), Some("Bearer access-2"));
    // A rejected replay is not a failed refresh
    assert!(client.session().is_authenticated());
    assert_eq!(Backend::count(&backend.logout_calls), 0);
}

#[tokio::test]
async fn test_unusable_token_response_logs_out() {
    for reply in [json!({ "token": "access-2" }), json!({ "accessToken": "" })] {
        let (url, backend) = spawn_backend().await;
        let client = client_for(&url);
        client.login_with_password("ada@example.com", "hunter2", true).await.unwrap();
        backend.expire_tokens();
        *backend.token_reply.lock() = Some(reply.clone());

        let err = client.list_resources(&ResourceQuery::new()).await.unwrap_err();

        assert!(matches!(err, ApiError::AuthExpired(ref m) if m == "Token expired"), "reply {}", reply);
        assert_eq!(Backend::count(&backend.token_calls), 1);
        assert_eq!(Backend::count(&backend.resource_calls), 1);
        assert_eq!(Backend::count(&backend.logout_calls), 1);
        assert_eq!(client.session().state(), SessionState::Anonymous);
        assert!(client.session().store().read().is_none());
    }
}

#[tokio::test]
async fn test_anonymous_request_omits_authorization_header() {
    let (url, backend) = spawn_backend().await;
    let client = client_for(&url);

    let err = client.list_resources(&ResourceQuery::new()).await.unwrap_err();

    assert!(backend.last_authorization.lock().is_none());
    assert!(matches!(err, ApiError::AuthExpired(_)));
    // No refresh token, so nothing to exchange
    assert_eq!(Backend::count(&backend.token_calls), 0);
    assert_eq!(client.session().state(), SessionState::Anonymous);
}

// ============================================================================
// Resources
// ============================================================================

#[tokio::test]
async fn test_empty_list_with_sort_and_limit() {
    let (url, backend) = spawn_backend().await;
    let client = client_for(&url);
    client.login_with_password("ada@example.com", "hunter2", false).await.unwrap();

    let query = ResourceQuery::new().sort_by(SortBy::Newest).limit(5);
    let resources = client.list_resources(&query).await.expect("empty list is not an error");

    assert!(resources.is_empty());
    let seen = backend.last_query.lock().clone().unwrap();
    assert_eq!(seen.get("sortBy").map(String::as_str), Some("newest"));
    assert_eq!(seen.get("limit").map(String::as_str), Some("5"));
}

#[tokio::test]
async fn test_resource_detail_and_not_found() {
    let (url, _backend) = spawn_backend().await;
    let client = client_for(&url);
    client.login_with_password("ada@example.com", "hunter2", false).await.unwrap();

    let resource = client.get_resource("42").await.unwrap();
    assert_eq!(resource.id, "42");
    assert_eq!(resource.created_display(), "2024-05-01");

    // Ids are escaped as a single path segment
    let resource = client.get_resource("rust book/2").await.unwrap();
    assert_eq!(resource.id, "rust book/2");

    let err = client.get_resource("missing").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(err.to_string(), "Resource not found");
}

#[tokio::test]
async fn test_create_requires_title() {
    let (url, backend) = spawn_backend().await;
    let client = client_for(&url);

    let err = client.create_resource(&NewResource::default()).await.unwrap_err();

    assert_eq!(err.to_string(), "Title is required");
    assert!(backend.writes.lock().is_empty());
}

#[tokio::test]
async fn test_put_and_delete_verbs() {
    let (url, backend) = spawn_backend().await;
    let client = client_for(&url);
    client.login_with_password("ada@example.com", "hunter2", false).await.unwrap();

    let updated: Value = client
        .put("/api/resources/7", &json!({ "title": "Renamed" }))
        .await
        .unwrap();
    assert_eq!(updated, json!({ "id": "7", "title": "Renamed" }));
    assert_eq!(backend.writes.lock()[0].0, Method::PUT);

    // 204 No Content reads as null
    client.delete::<()>("/api/resources/7").await.unwrap();
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_register_password_mismatch_never_hits_network() {
    let (url, backend) = spawn_backend().await;
    let client = client_for(&url);

    let form = RegisterForm {
        username: "ada".to_string(),
        email: "ada@example.com".to_string(),
        password: "hunter2".to_string(),
        confirm_password: "hunter3".to_string(),
    };
    let err = client.register(&form).await.unwrap_err();

    assert!(matches!(err, ApiError::Validation(ref m) if m == "Passwords do not match"));
    assert_eq!(Backend::count(&backend.register_calls), 0);
}

#[tokio::test]
async fn test_register_success_and_server_error() {
    let (url, backend) = spawn_backend().await;
    let client = client_for(&url);

    let mut form = RegisterForm {
        username: "ada".to_string(),
        email: "ada@example.com".to_string(),
        password: "hunter2".to_string(),
        confirm_password: "hunter2".to_string(),
    };
    let response = client.register(&form).await.unwrap();
    assert_eq!(response["username"], "ada");

    form.email = "taken@example.com".to_string();
    let err = client.register(&form).await.unwrap_err();
    assert_eq!(err.to_string(), "Email already in use");
    assert_eq!(Backend::count(&backend.register_calls), 2);
    // Registration does not log in
    assert!(!client.session().is_authenticated());
}
