//! Per-request retry state machine
//!
//! Pure state machine: receives events, returns (new_state, action). The
//! session manager performs the I/O implied by each action. The state is
//! carried on the `Attempt` wrapper rather than as a flag on the request, so
//! a request can be refreshed-and-resent at most once.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use uuid::Uuid;

/// An outbound request description, rebuildable for a resend.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub id: Uuid,
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl PendingRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url, body: serde_json::Value) -> Self {
        Self::new(Method::POST, url).with_body(body)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set `Authorization: Bearer <token>`, replacing any existing value.
    ///
    /// Returns false (header untouched) when the token is not a valid header
    /// value.
    pub fn set_bearer(&mut self, token: &str) -> bool {
        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                self.headers.insert(AUTHORIZATION, value);
                true
            }
            Err(_) => false,
        }
    }

    /// The bearer token currently on the request, if any.
    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")
    }
}

/// Where a request is in the refresh-and-retry policy.
///
/// Transitions:
/// - Initial → AwaitingRefresh (401 from a non-token endpoint)
/// - AwaitingRefresh → Retried (refresh succeeded, request resent)
/// - AwaitingRefresh → Failed (refresh failed, session logged out)
/// - Retried, Failed → terminal, every response is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Initial,
    AwaitingRefresh,
    Retried,
    Failed,
}

impl RetryState {
    /// Label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            RetryState::Initial => "initial",
            RetryState::AwaitingRefresh => "awaiting_refresh",
            RetryState::Retried => "retried",
            RetryState::Failed => "failed",
        }
    }
}

/// Events that drive transitions.
#[derive(Debug, Clone, Copy)]
pub enum AttemptEvent {
    /// A response arrived. `token_endpoint` marks responses from the token
    /// obtain/refresh/verify family, which never trigger a refresh.
    Response {
        status: StatusCode,
        token_endpoint: bool,
    },
    RefreshSucceeded,
    RefreshFailed,
}

/// What the manager should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptAction {
    /// Hand the current response to the caller
    Deliver,
    /// Obtain a new access token
    Refresh,
    /// Re-dispatch the request with the new token
    Resend,
    /// Clear credentials, flag the session expired, navigate to login
    ForceLogout,
}

/// Handle a state transition. Pure function: no I/O.
pub fn handle_event(state: RetryState, event: AttemptEvent) -> (RetryState, AttemptAction) {
    match (state, event) {
        (
            RetryState::Initial,
            AttemptEvent::Response {
                status: StatusCode::UNAUTHORIZED,
                token_endpoint: false,
            },
        ) => (RetryState::AwaitingRefresh, AttemptAction::Refresh),

        (RetryState::AwaitingRefresh, AttemptEvent::RefreshSucceeded) => {
            (RetryState::Retried, AttemptAction::Resend)
        }

        (RetryState::AwaitingRefresh, AttemptEvent::RefreshFailed) => {
            (RetryState::Failed, AttemptAction::ForceLogout)
        }

        // Retried requests deliver whatever comes back, including a second 401
        (state, _) => (state, AttemptAction::Deliver),
    }
}

/// A request threaded through the pipeline together with its retry state.
#[derive(Debug)]
pub struct Attempt {
    pub request: PendingRequest,
    pub state: RetryState,
}

impl Attempt {
    pub fn new(request: PendingRequest) -> Self {
        Self {
            request,
            state: RetryState::Initial,
        }
    }

    /// Apply `event`, store the new state, and return the action.
    pub fn advance(&mut self, event: AttemptEvent) -> AttemptAction {
        let (state, action) = handle_event(self.state, event);
        self.state = state;
        action
    }
}
