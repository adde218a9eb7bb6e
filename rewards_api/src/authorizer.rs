//! Bearer-token authorization for operator endpoints

use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};

/// Extract the token from `Authorization`, with or without a `Bearer ` prefix
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let token = match raw.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => raw[7..].trim(),
        _ => raw,
    };
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Check the request against the configured secrets.
///
/// An empty secret list means the endpoint is open; callers only do that
/// when they gate on the feature being configured some other way.
pub fn authorize(headers: &HeaderMap, secrets: &[String]) -> bool {
    let configured: Vec<&str> = secrets
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if configured.is_empty() {
        return true;
    }

    let Some(token) = bearer_token(headers) else {
        return false;
    };

    // Compare fixed-size digests so timing does not depend on the shared prefix
    let presented = Sha256::digest(token.as_bytes());
    configured
        .iter()
        .fold(false, |matched, secret| {
            matched | (Sha256::digest(secret.as_bytes()) == presented)
        })
}
