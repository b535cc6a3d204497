//! API endpoint table
//!
//! All endpoints hang off one base URL. The base defaults to the local
//! development server and is overridable through configuration. Paths are
//! relative (no leading slash) so `Url::join` keeps the base path prefix.

use reqwest::Url;

use crate::error::{Error, Result};

/// Base URL of the development API server
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/";

/// Exchanges `{username, password}` for a credential pair
pub const LOGIN_PATH: &str = "login/";

/// Creates an account and returns a credential pair
pub const REGISTER_PATH: &str = "register/";

/// Exchanges `{refresh}` for a new access token
pub const REFRESH_PATH: &str = "token/refresh/";

/// Profile of the authenticated user
pub const USER_PATH: &str = "user/";

/// Prefix shared by the token obtain, refresh and verify endpoints.
/// A 401 from anything under this prefix never triggers a refresh.
pub const TOKEN_FAMILY_PATH: &str = "token/";

/// Resolved endpoint URLs for one API base.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: Url,
    login: Url,
    register: Url,
    refresh: Url,
    user: Url,
    token_family: Url,
}

impl Endpoints {
    /// Parse `base_url` and resolve every endpoint against it.
    ///
    /// A missing trailing slash is added so relative joins append rather than
    /// replace the last path segment.
    pub fn new(base_url: &str) -> Result<Self> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base = Url::parse(&normalized)
            .map_err(|e| Error::InvalidUrl(format!("{base_url}: {e}")))?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(Error::InvalidUrl(format!(
                "base URL must use http or https, got: {base_url}"
            )));
        }

        Ok(Self {
            login: join(&base, LOGIN_PATH)?,
            register: join(&base, REGISTER_PATH)?,
            refresh: join(&base, REFRESH_PATH)?,
            user: join(&base, USER_PATH)?,
            token_family: join(&base, TOKEN_FAMILY_PATH)?,
            base,
        })
    }

    /// Resolve an API path (e.g. `"todos/"`) against the base URL.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        join(&self.base, path.trim_start_matches('/'))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn login(&self) -> &Url {
        &self.login
    }

    pub fn register(&self) -> &Url {
        &self.register
    }

    pub fn refresh(&self) -> &Url {
        &self.refresh
    }

    pub fn user(&self) -> &Url {
        &self.user
    }

    /// Whether `url` is one of the token endpoints (obtain, refresh, verify).
    pub fn is_token_endpoint(&self, url: &Url) -> bool {
        url.as_str().starts_with(self.token_family.as_str())
    }

    /// ASCII origin of the base URL (`scheme://host:port`), the scope key for
    /// stored credentials.
    pub fn origin(&self) -> String {
        self.base.origin().ascii_serialization()
    }
}

fn join(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .map_err(|e| Error::InvalidUrl(format!("{path}: {e}")))
}
