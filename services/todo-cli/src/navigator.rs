//! Terminal reaction to a forced logout

use std::sync::atomic::{AtomicBool, Ordering};

use todo_session::Navigator;

pub const SESSION_EXPIRED_NOTICE: &str = "Session expired. Run `todo login` to sign in again.";

/// Prints the re-login hint to stderr, once per process even when several
/// in-flight requests are logged out together.
#[derive(Debug, Default)]
pub struct TerminalNavigator {
    notified: AtomicBool,
}

impl TerminalNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notified(&self) -> bool {
        self.notified.load(Ordering::SeqCst)
    }
}

impl Navigator for TerminalNavigator {
    fn redirect_to_login(&self) {
        if !self.notified.swap(true, Ordering::SeqCst) {
            eprintln!("{SESSION_EXPIRED_NOTICE}");
        }
    }
}
