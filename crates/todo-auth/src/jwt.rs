//! Unverified JWT claim inspection
//!
//! Reads the `exp` claim from an access token for status display. The
//! signature is not checked: the server is the only authority on validity,
//! and an expired token is still sent and recovered through the 401 path.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

#[derive(Deserialize)]
struct Claims {
    exp: Option<u64>,
}

/// Expiry of `token` as unix seconds, or `None` when the token is not a JWT
/// or carries no `exp` claim.
pub fn expires_at(token: &str) -> Option<u64> {
    let mut segments = token.split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }
    // Some issuers pad the segment despite RFC 7515
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice::<Claims>(&bytes).ok()?.exp
}

/// Seconds until `token` expires relative to `now` (unix seconds). Negative
/// once expired; `None` when either time does not fit in an `i64`.
pub fn seconds_remaining(token: &str, now: u64) -> Option<i64> {
    let exp = i64::try_from(expires_at(token)?).ok()?;
    exp.checked_sub(i64::try_from(now).ok()?)
}
