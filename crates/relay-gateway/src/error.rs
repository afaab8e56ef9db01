//! Gateway error types
//!
//! Only fatal conditions surface here. Transport drops, ack timeouts, and
//! protocol hiccups are resolved internally by the reconnect cycle and never
//! cross the boundary to application code.

/// Fatal gateway failures
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Credentials rejected; retrying cannot succeed
    #[error("gateway authentication rejected: {0}")]
    AuthenticationFailed(String),

    /// Server closed with a code that forbids reconnecting
    #[error("gateway closed with fatal code {code}: {reason}")]
    FatalClose { code: u16, reason: String },

    /// The connection task panicked or was cancelled externally
    #[error("gateway task ended abnormally")]
    TaskFailed,
}
