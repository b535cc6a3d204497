//! In-process mock of the to-do API for session tests
//!
//! Serves login, register, token refresh/verify and user endpoints on
//! `127.0.0.1:0`. Each refresh mints a new access token `at_refreshed_<n>`
//! and invalidates the previous one.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};
use todo_auth::Endpoints;
use tokio::net::TcpListener;

pub const VALID_REFRESH: &str = "rt_valid";

pub struct MockState {
    pub current_access: Mutex<String>,
    pub refresh_ok: AtomicBool,
    pub refresh_delay: Mutex<Duration>,
    pub refresh_calls: AtomicUsize,
    pub user_calls: AtomicUsize,
    pub always_401_calls: AtomicUsize,
    pub seen_authorization: Mutex<Vec<Option<String>>>,
    pub seen_request_ids: Mutex<Vec<String>>,
}

impl MockState {
    fn new(access: &str) -> Self {
        Self {
            current_access: Mutex::new(access.to_string()),
            refresh_ok: AtomicBool::new(true),
            refresh_delay: Mutex::new(Duration::ZERO),
            refresh_calls: AtomicUsize::new(0),
            user_calls: AtomicUsize::new(0),
            always_401_calls: AtomicUsize::new(0),
            seen_authorization: Mutex::new(Vec::new()),
            seen_request_ids: Mutex::new(Vec::new()),
        }
    }

    pub fn current_access(&self) -> String {
        self.current_access.lock().unwrap().clone()
    }

    /// Invalidate the current access token, as if it had expired.
    pub fn expire_access(&self) {
        *self.current_access.lock().unwrap() = String::from("at_unissued");
    }

    pub fn set_refresh_ok(&self, ok: bool) {
        self.refresh_ok.store(ok, Ordering::SeqCst);
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn user_calls(&self) -> usize {
        self.user_calls.load(Ordering::SeqCst)
    }

    pub fn always_401_calls(&self) -> usize {
        self.always_401_calls.load(Ordering::SeqCst)
    }

    pub fn seen_authorization(&self) -> Vec<Option<String>> {
        self.seen_authorization.lock().unwrap().clone()
    }

    pub fn seen_request_ids(&self) -> Vec<String> {
        self.seen_request_ids.lock().unwrap().clone()
    }

    fn record(&self, headers: &HeaderMap) {
        let authorization = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        self.seen_authorization.lock().unwrap().push(authorization);
        if let Some(id) = headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
            self.seen_request_ids.lock().unwrap().push(id.to_owned());
        }
    }

    fn is_authorized(&self, headers: &HeaderMap) -> bool {
        let expected = format!("Bearer {}", self.current_access());
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == expected)
            .unwrap_or(false)
    }
}

pub struct MockApi {
    pub endpoints: Endpoints,
    pub state: Arc<MockState>,
    _server: tokio::task::JoinHandle<()>,
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "detail": "Given token not valid for any token type",
            "code": "token_not_valid"
        })),
    )
        .into_response()
}

async fn login(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    if body["username"] == "alice" && body["password"] == "secret" {
        let access = String::from("at_login");
        *state.current_access.lock().unwrap() = access.clone();
        return Json(json!({"access": access, "refresh": VALID_REFRESH})).into_response();
    }
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "No active account found with the given credentials"})),
    )
        .into_response()
}

async fn register(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    let mut errors = serde_json::Map::new();
    for field in ["first_name", "last_name", "username", "email", "password"] {
        if body[field].as_str().map(str::trim).unwrap_or("").is_empty() {
            errors.insert(field.to_string(), json!(["This field is required."]));
        }
    }
    if !errors.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": "Registration failed.", "errors": errors})),
        )
            .into_response();
    }
    let access = String::from("at_registered");
    *state.current_access.lock().unwrap() = access.clone();
    (
        StatusCode::CREATED,
        Json(json!({
            "message": "Registration successful!",
            "id": 1,
            "username": body["username"],
            "email": body["email"],
            "access": access,
            "refresh": VALID_REFRESH
        })),
    )
        .into_response()
}

async fn refresh(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record(&headers);
    let n = state.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let delay = *state.refresh_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    if !state.refresh_ok.load(Ordering::SeqCst) || body["refresh"] != VALID_REFRESH {
        return unauthorized();
    }
    let access = format!("at_refreshed_{n}");
    *state.current_access.lock().unwrap() = access.clone();
    Json(json!({"access": access})).into_response()
}

async fn verify(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.record(&headers);
    unauthorized()
}

async fn user(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.record(&headers);
    state.user_calls.fetch_add(1, Ordering::SeqCst);
    if !state.is_authorized(&headers) {
        return unauthorized();
    }
    Json(json!({
        "id": 1,
        "first_name": "Alice",
        "last_name": "Liddell",
        "username": "alice",
        "email": "alice@example.com"
    }))
    .into_response()
}

async fn always_401(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.record(&headers);
    state.always_401_calls.fetch_add(1, Ordering::SeqCst);
    unauthorized()
}

async fn broken(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.record(&headers);
    (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
}

async fn create_todo(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record(&headers);
    if !state.is_authorized(&headers) {
        return unauthorized();
    }
    (StatusCode::CREATED, Json(json!({"id": 10, "title": body["title"]}))).into_response()
}

/// Start the mock API with `access` as the currently valid access token.
pub async fn start(access: &str) -> MockApi {
    let state = Arc::new(MockState::new(access));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = axum::Router::new()
        .route("/api/login/", post(login))
        .route("/api/register/", post(register))
        .route("/api/token/refresh/", post(refresh))
        .route("/api/token/verify/", post(verify))
        .route("/api/user/", get(user))
        .route("/api/always-401/", get(always_401))
        .route("/api/broken/", get(broken))
        .route("/api/todos/", post(create_todo))
        .with_state(state.clone());

    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockApi {
        endpoints: Endpoints::new(&format!("http://{addr}/api/")).unwrap(),
        state,
        _server: server,
    }
}
