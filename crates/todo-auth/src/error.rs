//! Error types for credential operations

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

/// Errors from the credential endpoints and the session store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("{0}")]
    Validation(ValidationFailure),

    #[error("endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured rejection from the registration endpoint.
///
/// Wire shape: `{"message": "...", "errors": {"email": ["This field is required."]}}`.
/// Both keys are optional on the wire; a missing message falls back to the
/// generic registration failure text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ValidationFailure {
    #[serde(default = "default_validation_message")]
    pub message: String,
    #[serde(default)]
    pub errors: BTreeMap<String, Vec<String>>,
}

fn default_validation_message() -> String {
    String::from("Registration failed.")
}

impl ValidationFailure {
    /// First message reported for `field`, as shown under a form input.
    pub fn first_error(&self, field: &str) -> Option<&str> {
        self.errors
            .get(field)
            .and_then(|messages| messages.first())
            .map(String::as_str)
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for (field, messages) in &self.errors {
            if let Some(first) = messages.first() {
                write!(f, " {field}: {first}")?;
            }
        }
        Ok(())
    }
}

/// Maximum length of a response body quoted in an error
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Truncate a response body so errors stay log-sized.
pub fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}
