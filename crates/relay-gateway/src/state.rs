//! Connection state
//!
//! The state machine driven by the connection runner. Observers read it
//! through a `watch` channel; only the runner writes it.

use serde::{Deserialize, Serialize};

/// Gateway connection states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected; initial state, and terminal unless restarted
    Disconnected,
    /// Socket dial in progress
    Connecting,
    /// Socket established, waiting for the server Hello
    AwaitingHello,
    /// Fresh handshake: Identify sent, waiting for READY
    Identifying,
    /// Resume sent, waiting for RESUMED
    Resuming,
    /// Handshake complete; events flowing
    Connected,
    /// Explicit close requested by the caller
    Closing,
}

impl ConnectionState {
    /// States in which the heartbeat scheduler is (or is about to be) armed
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Identifying | Self::Resuming | Self::Connected)
    }

    /// Get the name of this state
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::AwaitingHello => "AwaitingHello",
            Self::Identifying => "Identifying",
            Self::Resuming => "Resuming",
            Self::Connected => "Connected",
            Self::Closing => "Closing",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
