//! Rate-limit header parsing.

use crate::executor::HttpResponse;

/// Rate-limit state reported by a server.
///
/// Every field is optional; missing or unparsable header values yield
/// `None` rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimit {
    /// Maximum requests in the current window.
    pub limit: Option<i64>,
    /// Requests remaining in the current window.
    pub remaining: Option<i64>,
    /// Unix timestamp (seconds) when the window resets.
    pub reset: Option<i64>,
    /// Opaque policy description.
    pub policy: Option<String>,
}

impl RateLimit {
    /// Extracts rate-limit headers from a response (case-insensitive).
    #[must_use]
    pub fn from_response(response: &HttpResponse) -> Self {
        Self {
            limit: response.header("ratelimit-limit").and_then(parse_int),
            remaining: response.header("ratelimit-remaining").and_then(parse_int),
            reset: response.header("ratelimit-reset").and_then(parse_int),
            policy: response.header("ratelimit-policy").map(str::to_string),
        }
    }
}

fn parse_int(value: &str) -> Option<i64> {
    value.trim().parse().ok()
}
