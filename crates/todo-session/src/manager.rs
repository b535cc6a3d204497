//! Session manager: bearer attachment, refresh-on-401 and forced logout
//!
//! Every request goes through `send`. The stored access token is attached,
//! the request dispatched, and the response fed into the `attempt` state
//! machine. A first 401 from a non-token endpoint triggers one refresh and
//! one resend; a failed refresh clears the session and surfaces the original
//! 401.
//!
//! Refreshes are single-flight. Concurrent 401s queue on `refresh_lock`; the
//! first holder calls the refresh endpoint, later holders see that the stored
//! access token no longer matches the one they were rejected with and reuse
//! the new token without another network call.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use todo_auth::{Endpoints, Registered, Registration, SessionStore};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::attempt::{Attempt, AttemptAction, AttemptEvent, PendingRequest};
use crate::error::{Error, Result};
use crate::navigator::Navigator;

/// Header carrying the per-request id
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Profile returned by the user-info endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl UserProfile {
    /// Name for greetings: first name, else username.
    pub fn display_name(&self) -> &str {
        if !self.first_name.trim().is_empty() {
            return &self.first_name;
        }
        self.username.as_deref().unwrap_or("")
    }
}

/// Authenticated HTTP session over one API base URL.
///
/// Cheap to share behind an `Arc`; the reqwest client pools connections and
/// the store serializes its own writes.
pub struct SessionManager {
    client: reqwest::Client,
    endpoints: Endpoints,
    store: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
    refresh_lock: Mutex<()>,
}

impl SessionManager {
    pub fn new(
        client: reqwest::Client,
        endpoints: Endpoints,
        store: Arc<SessionStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        info!(base_url = %endpoints.base(), origin = store.origin(), "session manager initialized");
        Self {
            client,
            endpoints,
            store,
            navigator,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Send a request through the interception pipeline.
    ///
    /// Returns the response for 2xx. A 401 that could not be recovered is
    /// `Error::Unauthorized`; other statuses are `Error::Status` with the
    /// body; transport failures are `Error::Network`.
    #[instrument(skip_all, fields(request_id = %request.id, method = %request.method, url = %request.url))]
    pub async fn send(&self, request: PendingRequest) -> Result<reqwest::Response> {
        let mut attempt = Attempt::new(request);

        loop {
            let response = self.dispatch(&mut attempt.request).await?;
            let event = AttemptEvent::Response {
                status: response.status(),
                token_endpoint: self.endpoints.is_token_endpoint(&attempt.request.url),
            };

            match attempt.advance(event) {
                AttemptAction::Refresh => {}
                _ => return Self::deliver(response).await,
            }

            // The 401 is what the caller sees if recovery fails
            let original = Self::deliver(response).await;
            let stale = attempt.request.bearer().map(str::to_owned);
            debug!(state = attempt.state.label(), "access token rejected, refreshing");

            // Held through a forced logout so queued requests see the cleared session
            let refresh_guard = self.refresh_lock.lock().await;
            let refreshed = self.refresh(&refresh_guard, stale.as_deref()).await;
            let event = if refreshed.is_ok() {
                AttemptEvent::RefreshSucceeded
            } else {
                AttemptEvent::RefreshFailed
            };

            match (attempt.advance(event), refreshed) {
                (AttemptAction::Resend, Ok(access)) => {
                    drop(refresh_guard);
                    attempt.request.set_bearer(&access);
                    debug!(state = attempt.state.label(), "resending with refreshed token");
                }
                (AttemptAction::ForceLogout, Err(e)) => {
                    warn!(error = %e, "token refresh failed, forcing logout");
                    self.force_logout().await;
                    return original;
                }
                _ => return original,
            }
        }
    }

    /// GET an API path relative to the base URL.
    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let url = self.endpoints.resolve(path)?;
        self.send(PendingRequest::get(url)).await
    }

    /// POST a JSON body to an API path relative to the base URL.
    pub async fn post(&self, path: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        let url = self.endpoints.resolve(path)?;
        self.send(PendingRequest::post(url, body)).await
    }

    /// GET an API path and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.get(path).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| Error::InvalidResponse(format!("decoding {path}: {e}")))
    }

    /// Profile of the logged-in user.
    pub async fn user_info(&self) -> Result<UserProfile> {
        let response = self
            .send(PendingRequest::get(self.endpoints.user().clone()))
            .await?;
        response
            .json::<UserProfile>()
            .await
            .map_err(|e| Error::InvalidResponse(format!("decoding user profile: {e}")))
    }

    /// Log in and persist the returned credential pair.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let pair = todo_auth::login(&self.client, &self.endpoints, username, password).await?;
        self.store.store_pair(&pair).await?;
        info!(username, "logged in");
        Ok(())
    }

    /// Register an account and persist its credential pair. Nothing is
    /// stored when the server rejects the form.
    pub async fn register(&self, registration: &Registration) -> Result<Registered> {
        let registered = todo_auth::register(&self.client, &self.endpoints, registration).await?;
        self.store.store_pair(&registered.pair).await?;
        info!(username = %registration.username, "registered");
        Ok(registered)
    }

    /// User-initiated logout. Does not raise the session-expired flag.
    pub async fn logout(&self) -> Result<()> {
        self.store.clear_credentials().await?;
        info!("logged out");
        Ok(())
    }

    /// Consume the session-expired flag set by a forced logout.
    pub async fn take_session_expired(&self) -> Result<bool> {
        Ok(self.store.take_session_expired().await?)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.store.credentials().await.is_some()
    }

    /// Attach the stored bearer token (if any) and send the request once.
    async fn dispatch(&self, request: &mut PendingRequest) -> Result<reqwest::Response> {
        if let Some(access) = self.store.access().await {
            if !request.set_bearer(&access) {
                warn!("stored access token is not a valid header value, sending without it");
            }
        }

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .header(REQUEST_ID_HEADER, request.id.to_string());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            metrics::counter!("todo_session_requests_total", "status" => "network_error")
                .increment(1);
            Error::Network(format!("{} {} failed: {e}", request.method, request.url))
        })?;

        let status = response.status();
        metrics::counter!("todo_session_requests_total", "status" => status.as_u16().to_string())
            .increment(1);
        debug!(status = status.as_u16(), "response received");
        Ok(response)
    }

    /// Turn a final response into the caller's result.
    async fn deliver(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        let body = todo_auth::truncate_body(&body);
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized(body));
        }
        Err(Error::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Refresh under `refresh_lock`. `stale` is the access token the failing
    /// request carried.
    async fn refresh(&self, _lock: &MutexGuard<'_, ()>, stale: Option<&str>) -> Result<String> {
        if let Some(current) = self.store.access().await {
            if stale != Some(current.as_str()) {
                debug!("access token already replaced, reusing it");
                metrics::counter!("todo_session_refresh_total", "outcome" => "coalesced")
                    .increment(1);
                return Ok(current);
            }
        }

        let result = self.refresh_from_store().await;
        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!("todo_session_refresh_total", "outcome" => outcome).increment(1);
        result
    }

    async fn refresh_from_store(&self) -> Result<String> {
        let refresh = self.store.refresh().await.ok_or_else(|| {
            todo_auth::Error::InvalidCredentials("no refresh token stored".into())
        })?;
        let access = todo_auth::refresh_access(&self.client, &self.endpoints, &refresh).await?;
        if !self.store.replace_access(access.clone()).await? {
            return Err(todo_auth::Error::InvalidCredentials(
                "session cleared while refreshing".into(),
            )
            .into());
        }
        info!("access token refreshed");
        Ok(access)
    }

    /// Clear credentials, flag the session as expired, navigate to login.
    async fn force_logout(&self) {
        if let Err(e) = self.store.clear_credentials().await {
            warn!(error = %e, "failed to clear credentials during forced logout");
        }
        if let Err(e) = self.store.mark_session_expired().await {
            warn!(error = %e, "failed to set session-expired flag");
        }
        metrics::counter!("todo_session_forced_logout_total").increment(1);
        self.navigator.redirect_to_login();
    }
}
