//! Credential plumbing for the to-do API client
//!
//! Provides the endpoint table, the durable per-origin credential store, and
//! the unintercepted wire calls that mint credentials. Nothing here retries;
//! the retry-on-401 policy lives in `todo-session`.
//!
//! Credential flow:
//! 1. `token::login()` or `token::register()` returns a `CredentialPair`
//! 2. Pair stored via `store::SessionStore::store_pair()`
//! 3. On a 401 the session layer calls `token::refresh_access()`
//! 4. New access token saved via `store::SessionStore::replace_access()`
//! 5. Unrecoverable failure clears the pair and sets `sessionExpired`

pub mod endpoints;
pub mod error;
pub mod jwt;
pub mod store;
pub mod token;

pub use endpoints::{DEFAULT_BASE_URL, Endpoints};
pub use error::{Error, Result, ValidationFailure, truncate_body};
pub use store::{CredentialPair, SessionStore};
pub use token::{Registered, Registration, login, refresh_access, register};
