//! Session tracking
//!
//! One `SessionTracker` lives for the lifetime of the gateway handle and
//! spans connection epochs. The read loop is its sole writer; the heartbeat
//! scheduler only reads the sequence cursor.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Resumable session state.
///
/// Invariants: the sequence cursor is monotonically non-decreasing and is
/// reset only by a fresh (non-resumed) handshake; the session id is present
/// iff a resume is possible.
#[derive(Debug, Default)]
pub struct SessionTracker {
    /// Server-issued session identifier (None until READY)
    session_id: RwLock<Option<String>>,

    /// Last-seen sequence number; None until a dispatch is observed this
    /// epoch. Servers may legitimately start at 0, so no sentinel value.
    sequence: RwLock<Option<u64>>,

    /// Heartbeat interval for the current epoch, in milliseconds
    heartbeat_interval_ms: AtomicU64,
}

impl SessionTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dispatched sequence number.
    ///
    /// Applies a monotonic max so an out-of-order observation can never move
    /// the cursor backwards.
    pub fn observe_sequence(&self, seq: u64) {
        let mut cursor = self.sequence.write();
        *cursor = Some(cursor.map_or(seq, |current| current.max(seq)));
    }

    /// Last-seen sequence number, if any event has been dispatched
    #[must_use]
    pub fn last_sequence(&self) -> Option<u64> {
        *self.sequence.read()
    }

    /// Store the server-issued session id (on READY)
    pub fn set_session_id(&self, id: impl Into<String>) {
        *self.session_id.write() = Some(id.into());
    }

    /// Current session id, if a resume is possible
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    /// Session id plus sequence cursor, when both exist.
    ///
    /// A `Some` return means the next connection attempt should Resume
    /// instead of Identify.
    #[must_use]
    pub fn resume_target(&self) -> Option<(String, u64)> {
        let id = self.session_id.read().clone()?;
        let seq = self.last_sequence()?;
        Some((id, seq))
    }

    /// Reset the sequence cursor for a fresh (non-resumed) handshake.
    ///
    /// The only path that may rewind the cursor.
    pub fn begin_fresh_epoch(&self) {
        *self.sequence.write() = None;
    }

    /// Discard all resumable state.
    ///
    /// Called on an explicit invalid-session signal or a clean shutdown; the
    /// next attempt will Identify from scratch.
    pub fn invalidate(&self) {
        *self.session_id.write() = None;
        *self.sequence.write() = None;
        tracing::debug!("Session state discarded");
    }

    /// Capture the heartbeat interval from the Hello payload
    pub fn set_heartbeat_interval(&self, interval_ms: u64) {
        self.heartbeat_interval_ms.store(interval_ms, Ordering::SeqCst);
    }

    /// Heartbeat interval for the current epoch
    #[must_use]
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        match self.heartbeat_interval_ms.load(Ordering::SeqCst) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}
