//! Rate-limit buckets
//!
//! A bucket tracks one window of request quota. Until the first response
//! arrives the bucket is optimistic and lets requests through; after that
//! the server's headers are the source of truth. Waiters queue FIFO on the
//! bucket's async mutex, so a rate-limited head request blocks the line
//! instead of letting later requests jump it.

use crate::headers::RateLimitInfo;
use std::time::{Duration, Instant};

/// Client-side view of one rate-limit window
#[derive(Debug)]
struct BucketState {
    limit: u32,
    remaining: u32,
    reset_at: Option<Instant>,
    /// False until the first response has described this bucket
    known: bool,
}

/// One rate-limit bucket, shared by all routes with the same bucket key.
#[derive(Debug)]
pub struct Bucket {
    state: parking_lot::Mutex<BucketState>,
    /// FIFO line for requests in this bucket; held across retries
    queue: tokio::sync::Mutex<()>,
}

impl Default for Bucket {
    fn default() -> Self {
        Self::new()
    }
}

impl Bucket {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: parking_lot::Mutex::new(BucketState {
                limit: 1,
                remaining: 1,
                reset_at: None,
                known: false,
            }),
            queue: tokio::sync::Mutex::new(()),
        }
    }

    /// Take this bucket's place in line.
    ///
    /// The guard must be held for the whole request, retries included, so a
    /// 429'd request re-runs at the head of the queue.
    pub async fn acquire_queue(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.queue.lock().await
    }

    /// Wait until the bucket has quota for one request, then consume it.
    ///
    /// An unknown bucket never waits. A known, exhausted bucket sleeps until
    /// its reset instant; if the window has already passed the quota is
    /// replenished locally and corrected by the next response.
    pub async fn reserve(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock();
                if !state.known {
                    return;
                }
                if let Some(reset_at) = state.reset_at {
                    if Instant::now() >= reset_at {
                        state.remaining = state.limit;
                        state.reset_at = None;
                    }
                }
                if state.remaining > 0 {
                    state.remaining -= 1;
                    return;
                }
                match state.reset_at {
                    Some(reset_at) => reset_at.saturating_duration_since(Instant::now()),
                    // exhausted with no known reset; proceed and let the
                    // server correct us
                    None => return,
                }
            };

            tracing::debug!(wait_ms = wait.as_millis() as u64, "Bucket exhausted, waiting for reset");
            tokio::time::sleep(wait).await;
        }
    }

    /// Apply the server's description of this bucket.
    ///
    /// Headers are authoritative; the optimistic local count is discarded.
    pub fn apply(&self, info: &RateLimitInfo) {
        if !info.has_bucket_state() {
            return;
        }
        let mut state = self.state.lock();
        if let Some(limit) = info.limit {
            state.limit = limit;
        }
        if let Some(remaining) = info.remaining {
            state.remaining = remaining;
        }
        if let Some(reset_after) = info.reset_after {
            state.reset_at = Some(Instant::now() + reset_after);
        }
        state.known = true;
    }

    /// Mark the bucket empty until `deadline`, after a 429.
    pub fn exhaust_until(&self, deadline: Instant) {
        let mut state = self.state.lock();
        state.remaining = 0;
        state.reset_at = Some(state.reset_at.map_or(deadline, |r| r.max(deadline)));
        state.known = true;
    }

    #[cfg(test)]
    fn remaining(&self) -> u32 {
        self.state.lock().remaining
    }
}

/// Account-wide pause shared by every bucket.
///
/// A globally-flagged 429 stops all traffic until the server's retry-after
/// deadline passes.
#[derive(Debug, Default)]
pub struct GlobalLimiter {
    paused_until: parking_lot::Mutex<Option<Instant>>,
}

impl GlobalLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause all requests until `deadline`; never shortens an existing pause
    pub fn pause_until(&self, deadline: Instant) {
        let mut paused = self.paused_until.lock();
        *paused = Some(paused.map_or(deadline, |p| p.max(deadline)));
    }

    /// Wait out any active global pause
    pub async fn wait_ready(&self) {
        loop {
            let wait = {
                let mut paused = self.paused_until.lock();
                match *paused {
                    Some(deadline) if Instant::now() < deadline => {
                        deadline.saturating_duration_since(Instant::now())
                    }
                    _ => {
                        *paused = None;
                        return;
                    }
                }
            };
            tracing::warn!(wait_ms = wait.as_millis() as u64, "Global rate limit active, pausing");
            tokio::time::sleep(wait).await;
        }
    }
}
