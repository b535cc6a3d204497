//! Navigation seam to the UI layer
//!
//! The session manager does not know how the front end shows its login
//! screen. On forced logout it calls `Navigator::redirect_to_login` and the
//! embedding application decides what that means (a route change, a printed
//! prompt, a window swap).

use std::sync::atomic::{AtomicUsize, Ordering};

/// Receives the forced-navigation side effect of a logout.
pub trait Navigator: Send + Sync {
    /// Leave the current view and show the login entry point.
    fn redirect_to_login(&self);
}

/// Navigator that only counts redirects, for embedders that poll.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    redirects: AtomicUsize,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of redirects requested so far.
    pub fn redirects(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }
}

impl Navigator for RecordingNavigator {
    fn redirect_to_login(&self) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }
}
