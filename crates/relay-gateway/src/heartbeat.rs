//! Heartbeat scheduler
//!
//! Sends a liveness pulse at the server-specified interval and detects a
//! missed acknowledgment. Pulses go through the shared outbound channel, so
//! they serialize with every other socket write.

use crate::session::SessionTracker;
use rand::Rng;
use relay_protocol::Envelope;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Handle to the heartbeat task for one connection epoch.
///
/// The task stops when the handle is dropped, when the outbound channel
/// closes, or after signalling a liveness failure.
pub(crate) struct Heartbeat {
    handle: JoinHandle<()>,
}

impl Heartbeat {
    /// Arm the scheduler with the Hello interval.
    ///
    /// The first pulse is jittered within the interval so many connections
    /// started simultaneously do not pulse in lockstep. Each pulse carries
    /// the last-seen sequence number; if `acked` is still false when the next
    /// pulse comes due, a liveness failure is sent on `liveness` and the task
    /// exits.
    pub(crate) fn spawn(
        interval_ms: u64,
        session: Arc<SessionTracker>,
        outbound: mpsc::Sender<Envelope>,
        acked: Arc<AtomicBool>,
        liveness: mpsc::Sender<()>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let interval = Duration::from_millis(interval_ms);
            let first = interval.mul_f64(rand::thread_rng().gen::<f64>());

            tokio::time::sleep(first).await;

            loop {
                let seq = session.last_sequence();
                if outbound.send(Envelope::heartbeat(seq)).await.is_err() {
                    // connection epoch is over
                    return;
                }
                acked.store(false, Ordering::SeqCst);
                tracing::trace!(seq = ?seq, "Heartbeat sent");

                tokio::time::sleep(interval).await;

                if !acked.load(Ordering::SeqCst) {
                    tracing::warn!(interval_ms, "Heartbeat ACK missed");
                    let _ = liveness.try_send(());
                    return;
                }
            }
        });

        Self { handle }
    }

    /// Stop the scheduler and release its timer.
    pub(crate) fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
