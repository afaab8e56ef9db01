//! REST dispatcher errors

use reqwest::StatusCode;

/// Failure submitting a REST operation.
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    /// The server rejected the token
    #[error("authentication rejected for {route}")]
    AuthenticationFailed { route: String },

    /// Terminal API error status, not retried
    #[error("{route} failed with {status}: {message}")]
    Api {
        route: String,
        status: StatusCode,
        message: String,
    },

    /// Network-level failure after exhausting retries
    #[error("transport error for {route}")]
    Transport {
        route: String,
        #[source]
        source: reqwest::Error,
    },

    /// Too many rate-limit retries for one submission
    #[error("retry budget exhausted for {route}")]
    RetryBudgetExhausted { route: String },

    /// Request body could not be serialized
    #[error("invalid request body for {route}")]
    InvalidBody {
        route: String,
        #[source]
        source: serde_json::Error,
    },

    /// The dispatcher is shutting down and no longer accepts work
    #[error("dispatcher closed")]
    Closed,
}

impl RestError {
    /// HTTP status attached to the error, if any
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::AuthenticationFailed { .. } => Some(StatusCode::UNAUTHORIZED),
            _ => None,
        }
    }
}
