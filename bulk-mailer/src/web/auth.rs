//! Control plane authentication.
//!
//! Mutating routes require the `X-Control-Auth` header to match the
//! configured token. When no token is configured every request is allowed.

use axum::http::HeaderMap;
use tracing::warn;

/// Header carrying the shared control token.
pub const AUTH_HEADER: &str = "x-control-auth";

/// Check the request headers against the configured token.
pub fn is_authorized(expected: Option<&str>, headers: &HeaderMap) -> bool {
    let expected = match expected.map(str::trim).filter(|t| !t.is_empty()) {
        Some(token) => token,
        None => {
            warn!("control_auth_not_configured");
            return true;
        }
    };

    match headers.get(AUTH_HEADER).and_then(|v| v.to_str().ok()) {
        Some(provided) if constant_time_compare(provided, expected) => true,
        Some(_) => {
            warn!("control_auth_invalid");
            false
        }
        None => {
            warn!("control_auth_missing");
            false
        }
    }
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
