//! Error types surfaced to callers of the session manager

/// Errors from authenticated requests.
///
/// A 401 that survived the refresh policy surfaces as `Unauthorized`; every
/// other non-2xx status is passed through uninterpreted as `Status`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("network error: {0}")]
    Network(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Auth(#[from] todo_auth::Error),
}

impl Error {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Unauthorized(_) => Some(401),
            Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;
