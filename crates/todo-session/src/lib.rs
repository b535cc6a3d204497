//! Authenticated HTTP session for the to-do API
//!
//! Wraps outgoing requests with the stored bearer token and recovers from an
//! expired access token with at most one refresh per request. When the
//! refresh itself fails the session is force-logged-out: credentials are
//! cleared, the session-expired flag is raised, and the navigator is told to
//! return to the login entry point.
//!
//! Request lifecycle:
//! 1. Caller builds a `PendingRequest` and hands it to `SessionManager::send`
//! 2. Stored access token attached as `Authorization: Bearer <access>`
//! 3. Response fed into the `attempt` state machine
//! 4. 401 → single-flight refresh → header rewritten → request re-sent once
//! 5. Refresh failure → forced logout, original 401 returned to the caller

pub mod attempt;
pub mod error;
pub mod manager;
pub mod navigator;

#[cfg(test)]
mod mock;

pub use attempt::{Attempt, AttemptAction, AttemptEvent, PendingRequest, RetryState, handle_event};
pub use error::{Error, Result};
pub use manager::{SessionManager, UserProfile};
pub use navigator::{Navigator, RecordingNavigator};
