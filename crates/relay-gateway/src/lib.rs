//! # relay-gateway
//!
//! Persistent gateway connection: handshake state machine, heartbeat
//! liveness, session resumption, and reconnect-with-backoff. Dispatch events
//! update the shared entity cache and fan out to the registered handler;
//! control-plane op codes never surface to application code.

pub mod backoff;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod heartbeat;
pub mod session;
pub mod state;

pub use backoff::ReconnectPolicy;
pub use connection::GatewayConfig;
pub use dispatch::{CacheUpdater, EventHandler, NoopHandler};
pub use error::GatewayError;
pub use session::SessionTracker;
pub use state::ConnectionState;

use connection::ConnectionRunner;
use relay_cache::SharedEntityCache;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Handle to a running gateway connection.
///
/// Spawning the handle starts the connection task; it reconnects
/// autonomously until [`Gateway::shutdown`] is called or a fatal error
/// occurs.
pub struct Gateway {
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    session: Arc<SessionTracker>,
    task: Mutex<Option<JoinHandle<Result<(), GatewayError>>>>,
}

impl Gateway {
    /// Spawn the connection task.
    #[must_use]
    pub fn spawn(config: GatewayConfig, cache: SharedEntityCache, handler: Arc<dyn EventHandler>) -> Self {
        let session = Arc::new(SessionTracker::new());
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let runner = ConnectionRunner::new(
            config,
            session.clone(),
            CacheUpdater::new(cache),
            handler,
            state_tx,
        );
        let task = tokio::spawn(runner.run(shutdown_rx));

        Self {
            state_rx,
            shutdown_tx,
            session,
            task: Mutex::new(Some(task)),
        }
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch connection state transitions
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Session tracker shared with the connection task
    #[must_use]
    pub fn session(&self) -> &Arc<SessionTracker> {
        &self.session
    }

    /// Wait for the connection task to end.
    ///
    /// Returns `Ok(())` after a clean shutdown, or the fatal error that
    /// stopped the reconnect cycle.
    pub async fn wait(&self) -> Result<(), GatewayError> {
        let task = self.task.lock().await.take();
        match task {
            Some(task) => task.await.unwrap_or(Err(GatewayError::TaskFailed)),
            None => Ok(()),
        }
    }

    /// Request a clean close and wait for the task to finish.
    ///
    /// Discards session state; a later connection will identify fresh.
    pub async fn shutdown(&self) -> Result<(), GatewayError> {
        let _ = self.shutdown_tx.send(true);
        self.wait().await
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("state", &self.state())
            .field("session_id", &self.session.session_id())
            .finish()
    }
}
