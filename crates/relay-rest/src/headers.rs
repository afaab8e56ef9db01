//! Rate-limit header parsing
//!
//! Every response may carry the server's view of the bucket it was counted
//! against. Parsed values are authoritative and overwrite whatever the
//! client assumed optimistically.

use reqwest::header::HeaderMap;
use std::time::Duration;

const LIMIT: &str = "x-ratelimit-limit";
const REMAINING: &str = "x-ratelimit-remaining";
const RESET_AFTER: &str = "x-ratelimit-reset-after";
const BUCKET: &str = "x-ratelimit-bucket";
const GLOBAL: &str = "x-ratelimit-global";
const RETRY_AFTER: &str = "retry-after";

/// Server-reported rate-limit state, parsed from response headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitInfo {
    /// Total requests the bucket allows per window
    pub limit: Option<u32>,
    /// Requests left in the current window
    pub remaining: Option<u32>,
    /// Time until the window resets
    pub reset_after: Option<Duration>,
    /// Server-assigned bucket name, informational only
    pub bucket: Option<String>,
    /// Whether a 429 counted against the account-wide limit
    pub global: bool,
    /// Server-mandated wait before retrying, on 429 responses
    pub retry_after: Option<Duration>,
}

impl RateLimitInfo {
    /// Parse whatever rate-limit headers the response carries.
    ///
    /// Missing or malformed headers parse to `None`; a response with no
    /// rate-limit headers at all yields the default value.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            limit: parse_num(headers, LIMIT),
            remaining: parse_num(headers, REMAINING),
            reset_after: parse_secs(headers, RESET_AFTER),
            bucket: headers
                .get(BUCKET)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            global: headers
                .get(GLOBAL)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            retry_after: parse_secs(headers, RETRY_AFTER),
        }
    }

    /// Whether the response described the bucket at all
    #[must_use]
    pub const fn has_bucket_state(&self) -> bool {
        self.limit.is_some() || self.remaining.is_some() || self.reset_after.is_some()
    }
}

fn parse_num(headers: &HeaderMap, name: &str) -> Option<u32> {
    headers.get(name)?.to_str().ok()?.parse().ok()
}

/// Reset and retry headers are fractional seconds
fn parse_secs(headers: &HeaderMap, name: &str) -> Option<Duration> {
    let secs: f64 = headers.get(name)?.to_str().ok()?.parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}
