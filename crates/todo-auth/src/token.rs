//! Credential endpoint calls
//!
//! Login, registration and access-token refresh. These go straight through a
//! plain `reqwest::Client`: they never carry a bearer token and are never
//! retried, so a rejected refresh cannot recurse into another refresh.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::endpoints::Endpoints;
use crate::error::{Error, Result, ValidationFailure, truncate_body};
use crate::store::CredentialPair;

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Token pair returned by login and registration.
#[derive(Deserialize)]
struct TokenPairResponse {
    access: String,
    refresh: String,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access: String,
}

/// Account details submitted by the registration form.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Registration {
    /// Whether every field is non-blank, the condition for enabling submit.
    pub fn is_complete(&self) -> bool {
        [
            &self.first_name,
            &self.last_name,
            &self.username,
            &self.email,
            &self.password,
        ]
        .iter()
        .all(|value| !value.trim().is_empty())
    }
}

#[derive(Deserialize)]
struct RegisterResponse {
    #[serde(default = "default_registered_message")]
    message: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    email: Option<String>,
    access: String,
    refresh: String,
}

fn default_registered_message() -> String {
    String::from("Registration successful!")
}

/// A successful registration: the server's message plus the new session.
#[derive(Debug)]
pub struct Registered {
    pub message: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub pair: CredentialPair,
}

/// Exchange a username and password for a credential pair.
pub async fn login(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    username: &str,
    password: &str,
) -> Result<CredentialPair> {
    let response = client
        .post(endpoints.login().clone())
        .json(&LoginRequest { username, password })
        .send()
        .await
        .map_err(|e| Error::Http(format!("login request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = read_body(response).await;
        if status.as_u16() == 400 || status.as_u16() == 401 {
            return Err(Error::InvalidCredentials(format!(
                "login rejected ({status}): {body}"
            )));
        }
        return Err(Error::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    let tokens = response
        .json::<TokenPairResponse>()
        .await
        .map_err(|e| Error::InvalidResponse(format!("invalid login response: {e}")))?;
    debug!(username, "login succeeded");
    Ok(CredentialPair::new(tokens.access, tokens.refresh))
}

/// Create an account. Any error status whose body carries the
/// `{message, errors}` payload becomes `Error::Validation`; other bodies are
/// `Error::Rejected`.
pub async fn register(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    registration: &Registration,
) -> Result<Registered> {
    let response = client
        .post(endpoints.register().clone())
        .json(registration)
        .send()
        .await
        .map_err(|e| Error::Http(format!("registration request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        if let Ok(failure) = serde_json::from_str::<ValidationFailure>(&body) {
            debug!(
                status = status.as_u16(),
                fields = failure.errors.len(),
                "registration rejected with message"
            );
            return Err(Error::Validation(failure));
        }
        return Err(Error::Rejected {
            status: status.as_u16(),
            body: truncate_body(&body),
        });
    }

    let registered = response
        .json::<RegisterResponse>()
        .await
        .map_err(|e| Error::InvalidResponse(format!("invalid registration response: {e}")))?;
    Ok(Registered {
        message: registered.message,
        username: registered.username,
        email: registered.email,
        pair: CredentialPair::new(registered.access, registered.refresh),
    })
}

/// Mint a new access token from a refresh token.
///
/// 401/403 means the refresh token itself is expired or revoked.
pub async fn refresh_access(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    refresh: &str,
) -> Result<String> {
    let response = client
        .post(endpoints.refresh().clone())
        .json(&RefreshRequest { refresh })
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = read_body(response).await;
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }
        return Err(Error::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<RefreshResponse>()
        .await
        .map(|r| r.access)
        .map_err(|e| Error::InvalidResponse(format!("invalid refresh response: {e}")))
}

async fn read_body(response: reqwest::Response) -> String {
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<no body>"));
    truncate_body(&body)
}
