//! Subcommand handlers
//!
//! Each handler writes its user-facing lines to `out` and reports an
//! `Outcome`. Failures the user can act on (bad credentials, validation,
//! expired session) are outcomes; I/O on the session file or the terminal
//! propagates as an error.

use std::io::Write;
use std::process::ExitCode;

use common::Secret;
use todo_auth::{Registration, jwt};
use todo_session::{Error, SessionManager};
use tracing::{debug, warn};

use crate::forms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => ExitCode::SUCCESS,
            Outcome::Failure => ExitCode::FAILURE,
        }
    }
}

/// Consume the session-expired flag, telling the user when it was set.
pub async fn announce_expired_session(
    session: &SessionManager,
    out: &mut impl Write,
) -> anyhow::Result<bool> {
    let expired = session.take_session_expired().await?;
    if expired {
        writeln!(out, "{}", forms::SESSION_EXPIRED)?;
    }
    Ok(expired)
}

pub async fn login(
    session: &SessionManager,
    username: &str,
    password: &Secret<String>,
    out: &mut impl Write,
) -> anyhow::Result<Outcome> {
    if !forms::login_complete(username, password.expose()) {
        writeln!(out, "{}", forms::LOGIN_INCOMPLETE)?;
        return Ok(Outcome::Failure);
    }

    match session.login(username, password.expose()).await {
        Ok(()) => {
            writeln!(out, "{}", forms::LOGIN_SUCCEEDED)?;
            Ok(Outcome::Success)
        }
        Err(e) => {
            warn!(error = %e, "login failed");
            writeln!(out, "{}", forms::LOGIN_FAILED)?;
            Ok(Outcome::Failure)
        }
    }
}

pub async fn register(
    session: &SessionManager,
    registration: &Registration,
    out: &mut impl Write,
) -> anyhow::Result<Outcome> {
    if !registration.is_complete() {
        writeln!(out, "{}", forms::REGISTER_INCOMPLETE)?;
        return Ok(Outcome::Failure);
    }

    match session.register(registration).await {
        Ok(registered) => {
            debug!(message = %registered.message, "registration accepted");
            writeln!(out, "{}", forms::REGISTER_SUCCEEDED)?;
            Ok(Outcome::Success)
        }
        Err(Error::Auth(todo_auth::Error::Validation(failure))) => {
            for line in forms::validation_lines(&failure) {
                writeln!(out, "{line}")?;
            }
            Ok(Outcome::Failure)
        }
        Err(Error::Auth(todo_auth::Error::Rejected { status, body })) => {
            warn!(status, body = %body, "registration rejected");
            writeln!(out, "{}", forms::REGISTER_FAILED)?;
            Ok(Outcome::Failure)
        }
        Err(e) => {
            warn!(error = %e, "registration failed");
            writeln!(out, "{}", forms::UNEXPECTED_ERROR)?;
            Ok(Outcome::Failure)
        }
    }
}

pub async fn dashboard(session: &SessionManager, out: &mut impl Write) -> anyhow::Result<Outcome> {
    writeln!(out, "{}", forms::DASHBOARD_TITLE)?;
    match session.user_info().await {
        Ok(profile) => {
            writeln!(out, "{}", forms::welcome(profile.display_name()))?;
            Ok(Outcome::Success)
        }
        Err(e) => {
            warn!(error = %e, "failed to fetch user info");
            writeln!(out, "Failed to fetch user info: {e}")?;
            Ok(Outcome::Failure)
        }
    }
}

pub async fn logout(session: &SessionManager, out: &mut impl Write) -> anyhow::Result<Outcome> {
    session.logout().await?;
    writeln!(out, "Logged out.")?;
    Ok(Outcome::Success)
}

/// Report whether a session is stored and when its access token expires.
/// `now` is unix seconds.
pub async fn status(
    session: &SessionManager,
    now: u64,
    out: &mut impl Write,
) -> anyhow::Result<Outcome> {
    let base = session.endpoints().base();
    let Some(access) = session.store().access().await else {
        writeln!(out, "Not logged in to {base}")?;
        if session.store().session_expired().await {
            writeln!(out, "{}", forms::SESSION_EXPIRED)?;
        }
        return Ok(Outcome::Failure);
    };

    writeln!(out, "Logged in to {base}")?;
    match jwt::seconds_remaining(&access, now) {
        Some(remaining) if remaining > 0 => {
            writeln!(out, "Access token expires in {remaining}s")?;
        }
        Some(_) => writeln!(out, "Access token expired; it is refreshed on the next request")?,
        None => {}
    }
    Ok(Outcome::Success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigator::TerminalNavigator;
    use axum::Json;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use base64::Engine;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use todo_auth::{CredentialPair, Endpoints, SessionStore};
    use tokio::net::TcpListener;

    async fn login_handler(Json(body): Json<Value>) -> Response {
        if body["username"] == "alice" && body["password"] == "secret" {
            return Json(json!({"access": "at_valid", "refresh": "rt_valid"})).into_response();
        }
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "No active account found with the given credentials"})),
        )
            .into_response()
    }

    async fn register_handler(Json(body): Json<Value>) -> Response {
        match body["username"].as_str() {
            Some("taken") => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "message": "Registration failed.",
                    "errors": {"username": ["A user with that username already exists."]}
                })),
            )
                .into_response(),
            Some("conflict") => (
                StatusCode::CONFLICT,
                Json(json!({
                    "message": "Username taken.",
                    "errors": {"username": ["A user with that username already exists."]}
                })),
            )
                .into_response(),
            Some("boom") => (StatusCode::INTERNAL_SERVER_ERROR, "oops").into_response(),
            _ => (
                StatusCode::CREATED,
                Json(json!({
                    "message": "Registration successful!",
                    "username": body["username"],
                    "email": body["email"],
                    "access": "at_valid",
                    "refresh": "rt_valid"
                })),
            )
                .into_response(),
        }
    }

    async fn refresh_handler(Json(body): Json<Value>) -> Response {
        if body["refresh"] == "rt_valid" {
            return Json(json!({"access": "at_valid"})).into_response();
        }
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Token is invalid or expired", "code": "token_not_valid"})),
        )
            .into_response()
    }

    async fn user_handler(headers: HeaderMap) -> Response {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "Bearer at_valid");
        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"code": "token_not_valid"})),
            )
                .into_response();
        }
        Json(json!({"id": 1, "first_name": "Alice", "username": "alice"})).into_response()
    }

    struct Harness {
        session: SessionManager,
        navigator: Arc<TerminalNavigator>,
        _server: tokio::task::JoinHandle<()>,
        _dir: tempfile::TempDir,
    }

    async fn harness(stored: Option<(&str, &str)>) -> Harness {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new()
            .route("/api/login/", post(login_handler))
            .route("/api/register/", post(register_handler))
            .route("/api/token/refresh/", post(refresh_handler))
            .route("/api/user/", get(user_handler));
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let endpoints = Endpoints::new(&format!("http://{addr}/api/")).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path().join("session.json"), endpoints.origin())
            .await
            .unwrap();
        if let Some((access, refresh)) = stored {
            store
                .store_pair(&CredentialPair::new(access, refresh))
                .await
                .unwrap();
        }
        let navigator = Arc::new(TerminalNavigator::new());
        let session = SessionManager::new(
            reqwest::Client::new(),
            endpoints,
            Arc::new(store),
            navigator.clone(),
        );
        Harness {
            session,
            navigator,
            _server: server,
            _dir: dir,
        }
    }

    fn text(out: Vec<u8>) -> String {
        String::from_utf8(out).unwrap()
    }

    fn registration(username: &str) -> Registration {
        Registration {
            first_name: "Alice".into(),
            last_name: "Liddell".into(),
            username: username.into(),
            email: "alice@example.com".into(),
            password: "secret".into(),
        }
    }

    #[tokio::test]
    async fn login_stores_session() {
        let h = harness(None).await;
        let mut out = Vec::new();

        let outcome = login(&h.session, "alice", &Secret::new("secret".into()), &mut out)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Success);
        assert_eq!(text(out), "Login successful!\n");
        assert!(h.session.is_authenticated().await);
    }

    #[tokio::test]
    async fn login_with_wrong_password_reports_failure() {
        let h = harness(None).await;
        let mut out = Vec::new();

        let outcome = login(&h.session, "alice", &Secret::new("nope".into()), &mut out)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Failure);
        assert_eq!(text(out), "Login failed. Please check your credentials.\n");
        assert!(!h.session.is_authenticated().await);
    }

    #[tokio::test]
    async fn login_with_blank_field_is_not_submitted() {
        let h = harness(None).await;
        let mut out = Vec::new();

        let outcome = login(&h.session, "alice", &Secret::new("   ".into()), &mut out)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Failure);
        assert_eq!(text(out), "Fill in all fields to login\n");
    }

    #[tokio::test]
    async fn expired_session_announced_once() {
        let h = harness(None).await;
        h.session.store().mark_session_expired().await.unwrap();

        let mut out = Vec::new();
        assert!(announce_expired_session(&h.session, &mut out).await.unwrap());
        assert!(!announce_expired_session(&h.session, &mut out).await.unwrap());
        assert_eq!(text(out), "Your session has expired. Please log in again.\n");
    }

    #[tokio::test]
    async fn register_success() {
        let h = harness(None).await;
        let mut out = Vec::new();

        let outcome = register(&h.session, &registration("alice"), &mut out)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Success);
        assert_eq!(text(out), "Registration successful!\n");
        assert!(h.session.is_authenticated().await);
    }

    #[tokio::test]
    async fn register_validation_prints_field_errors() {
        let h = harness(None).await;
        let mut out = Vec::new();

        let outcome = register(&h.session, &registration("taken"), &mut out)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Failure);
        assert_eq!(
            text(out),
            "Registration failed.\nusername: A user with that username already exists.\n"
        );
        assert!(!h.session.is_authenticated().await);
    }

    #[tokio::test]
    async fn register_conflict_prints_server_message() {
        let h = harness(None).await;
        let mut out = Vec::new();

        let outcome = register(&h.session, &registration("conflict"), &mut out)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Failure);
        assert_eq!(
            text(out),
            "Username taken.\nusername: A user with that username already exists.\n"
        );
        assert!(!h.session.is_authenticated().await);
    }

    #[tokio::test]
    async fn register_server_error_is_generic_failure() {
        let h = harness(None).await;
        let mut out = Vec::new();

        let outcome = register(&h.session, &registration("boom"), &mut out)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Failure);
        assert_eq!(text(out), "Registration failed.\n");
    }

    #[tokio::test]
    async fn register_incomplete_form() {
        let h = harness(None).await;
        let mut out = Vec::new();
        let mut form = registration("alice");
        form.email.clear();

        let outcome = register(&h.session, &form, &mut out).await.unwrap();

        assert_eq!(outcome, Outcome::Failure);
        assert_eq!(text(out), "Fill in all fields to register\n");
    }

    #[tokio::test]
    async fn dashboard_greets_user() {
        let h = harness(Some(("at_valid", "rt_valid"))).await;
        let mut out = Vec::new();

        let outcome = dashboard(&h.session, &mut out).await.unwrap();

        assert_eq!(outcome, Outcome::Success);
        assert_eq!(text(out), "Dashboard\nWelcome back, Alice!\n");
    }

    #[tokio::test]
    async fn dashboard_recovers_expired_access_token() {
        let h = harness(Some(("at_stale", "rt_valid"))).await;
        let mut out = Vec::new();

        let outcome = dashboard(&h.session, &mut out).await.unwrap();

        assert_eq!(outcome, Outcome::Success);
        assert_eq!(
            h.session.store().access().await.as_deref(),
            Some("at_valid")
        );
        assert!(!h.navigator.notified());
    }

    #[tokio::test]
    async fn dashboard_with_revoked_refresh_logs_out() {
        let h = harness(Some(("at_stale", "rt_revoked"))).await;
        let mut out = Vec::new();

        let outcome = dashboard(&h.session, &mut out).await.unwrap();

        assert_eq!(outcome, Outcome::Failure);
        assert!(text(out).starts_with("Dashboard\nFailed to fetch user info:"));
        assert!(h.navigator.notified());
        assert!(!h.session.is_authenticated().await);
        assert!(h.session.store().session_expired().await);
    }

    #[tokio::test]
    async fn logout_clears_without_expiry_flag() {
        let h = harness(Some(("at_valid", "rt_valid"))).await;
        let mut out = Vec::new();

        logout(&h.session, &mut out).await.unwrap();

        assert_eq!(text(out), "Logged out.\n");
        assert!(!h.session.is_authenticated().await);
        assert!(!h.session.store().session_expired().await);
    }

    #[tokio::test]
    async fn status_reports_token_expiry() {
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(r#"{"exp":1000}"#);
        let token = format!("eyJhbGciOiJIUzI1NiJ9.{payload}.sig");
        let h = harness(Some((&token, "rt_valid"))).await;

        let mut out = Vec::new();
        let outcome = status(&h.session, 400, &mut out).await.unwrap();
        assert_eq!(outcome, Outcome::Success);
        assert!(text(out).ends_with("Access token expires in 600s\n"));

        let mut out = Vec::new();
        status(&h.session, 2000, &mut out).await.unwrap();
        assert!(text(out).contains("Access token expired"));
    }

    #[tokio::test]
    async fn status_when_logged_out() {
        let h = harness(None).await;
        let mut out = Vec::new();

        let outcome = status(&h.session, 0, &mut out).await.unwrap();

        assert_eq!(outcome, Outcome::Failure);
        assert!(text(out).starts_with("Not logged in to http://127.0.0.1:"));
    }
}
