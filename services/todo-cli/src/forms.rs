//! Login and registration form rules and user-facing messages

use todo_auth::ValidationFailure;

pub const LOGIN_INCOMPLETE: &str = "Fill in all fields to login";
pub const LOGIN_SUCCEEDED: &str = "Login successful!";
pub const LOGIN_FAILED: &str = "Login failed. Please check your credentials.";
pub const SESSION_EXPIRED: &str = "Your session has expired. Please log in again.";

pub const REGISTER_INCOMPLETE: &str = "Fill in all fields to register";
pub const REGISTER_SUCCEEDED: &str = "Registration successful!";
pub const REGISTER_FAILED: &str = "Registration failed.";
pub const UNEXPECTED_ERROR: &str = "An unexpected error occurred.";

pub const DASHBOARD_TITLE: &str = "Dashboard";

/// Login is submittable once both fields are non-blank.
pub fn login_complete(username: &str, password: &str) -> bool {
    !username.trim().is_empty() && !password.trim().is_empty()
}

/// Lines shown for a rejected registration: the server message, then the
/// first error of each field as `<field>: <message>`.
pub fn validation_lines(failure: &ValidationFailure) -> Vec<String> {
    let mut lines = vec![failure.message.clone()];
    for field in failure.errors.keys() {
        if let Some(message) = failure.first_error(field) {
            lines.push(format!("{field}: {message}"));
        }
    }
    lines
}

pub fn welcome(first_name: &str) -> String {
    format!("Welcome back, {first_name}!")
}
