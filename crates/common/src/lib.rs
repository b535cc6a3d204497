//! Types shared by the to-do client crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
