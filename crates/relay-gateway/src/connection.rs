//! Gateway connection runner
//!
//! Owns the duplex socket for one gateway handle: handshake, heartbeat
//! arming, resume-or-identify, control-op handling, and the reconnect cycle.
//! One task drives the socket read loop and is the sole writer of session
//! state; all socket writes funnel through a single outbound channel consumed
//! by one writer task.

use crate::backoff::ReconnectPolicy;
use crate::dispatch::{CacheUpdater, EventHandler};
use crate::error::GatewayError;
use crate::heartbeat::Heartbeat;
use crate::session::SessionTracker;
use crate::state::ConnectionState;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use relay_common::{BackoffConfig, ClientConfig};
use relay_protocol::{
    CloseCode, DecodeError, Envelope, IdentifyPayload, IdentifyProperties, Intents, ResumePayload,
    ServerMessage,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Gateway connection configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Gateway WebSocket URL
    pub url: String,
    /// Authentication token
    pub token: String,
    /// Capability bitmask sent with Identify
    pub intents: Intents,
    /// Reconnect backoff policy
    pub backoff: BackoffConfig,
    /// How long to wait for the server Hello after the socket opens
    pub handshake_timeout: Duration,
    /// Outbound channel depth
    pub outbound_buffer: usize,
}

impl GatewayConfig {
    /// Create a configuration with defaults for everything but the endpoint
    #[must_use]
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            intents: Intents::default_set(),
            backoff: BackoffConfig::default(),
            handshake_timeout: Duration::from_secs(10),
            outbound_buffer: 64,
        }
    }
}

impl From<&ClientConfig> for GatewayConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            url: config.gateway_url.clone(),
            token: config.token.clone(),
            intents: config.intents,
            backoff: config.backoff.clone(),
            handshake_timeout: config.handshake_timeout,
            outbound_buffer: 64,
        }
    }
}

/// How one connection epoch ended
enum EpochEnd {
    /// Caller asked for a clean close; no reconnect
    Shutdown,
    /// Retrying cannot succeed; surfaces to the caller
    Fatal(GatewayError),
    /// Reconnect through Disconnected with backoff; `resumable` decides
    /// whether session state survives the transition
    Retry { resumable: bool },
    /// Server-initiated graceful close-and-resume; reconnect immediately,
    /// skipping Disconnected and the backoff delay
    Reconnect,
}

/// One frame's worth of progress on the read half
enum SocketEvent {
    Message(ServerMessage),
    Protocol(DecodeError),
    Closed(Option<CloseFrame<'static>>),
    Error(tokio_tungstenite::tungstenite::Error),
    Ended,
}

/// Drives the connection state machine until shutdown or a fatal error.
pub(crate) struct ConnectionRunner {
    config: GatewayConfig,
    session: Arc<SessionTracker>,
    cache: CacheUpdater,
    handler: Arc<dyn EventHandler>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionRunner {
    pub(crate) fn new(
        config: GatewayConfig,
        session: Arc<SessionTracker>,
        cache: CacheUpdater,
        handler: Arc<dyn EventHandler>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        Self {
            config,
            session,
            cache,
            handler,
            state_tx,
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let _ = self.state_tx.send_replace(state);
        tracing::debug!(state = %state, "Connection state");
    }

    /// Run connection epochs until shutdown or a fatal failure.
    pub(crate) async fn run(self, mut shutdown_rx: watch::Receiver<bool>) -> Result<(), GatewayError> {
        let mut policy = ReconnectPolicy::new(self.config.backoff.clone());

        let result = loop {
            if *shutdown_rx.borrow() {
                break Ok(());
            }

            self.set_state(ConnectionState::Connecting);
            tracing::info!(url = %self.config.url, attempt = policy.attempts(), "Connecting to gateway");

            let connected = tokio::select! {
                result = connect_async(&self.config.url) => result,
                _ = shutdown_rx.changed() => break Ok(()),
            };

            let outcome = match connected {
                Ok((socket, _response)) => self.drive(socket, &mut policy, &mut shutdown_rx).await,
                Err(e) => {
                    tracing::warn!(error = %e, "Gateway connect failed");
                    EpochEnd::Retry { resumable: true }
                }
            };

            match outcome {
                EpochEnd::Shutdown => break Ok(()),
                EpochEnd::Fatal(err) => {
                    tracing::error!(error = %err, "Fatal gateway failure; giving up");
                    break Err(err);
                }
                EpochEnd::Reconnect => {
                    tracing::info!("Server requested reconnect; resuming immediately");
                }
                EpochEnd::Retry { resumable } => {
                    if !resumable {
                        self.session.invalidate();
                    }
                    self.set_state(ConnectionState::Disconnected);

                    let delay = policy.next_delay();
                    tracing::info!(
                        attempt = policy.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        resumable,
                        "Reconnecting after backoff"
                    );

                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        _ = shutdown_rx.changed() => break Ok(()),
                    }
                }
            }
        };

        // session state never survives a permanent stop
        self.session.invalidate();
        self.set_state(ConnectionState::Disconnected);
        result
    }

    /// Drive a single connection epoch to its end.
    async fn drive(
        &self,
        socket: WsStream,
        policy: &mut ReconnectPolicy,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> EpochEnd {
        let (sink, mut stream) = socket.split();
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_buffer);
        let writer = tokio::spawn(write_loop(sink, outbound_rx));

        self.set_state(ConnectionState::AwaitingHello);

        let hello = tokio::select! {
            event = next_event(&mut stream) => event,
            () = tokio::time::sleep(self.config.handshake_timeout) => {
                tracing::warn!("Timed out waiting for Hello");
                return finish(writer, outbound_tx, EpochEnd::Retry { resumable: true }).await;
            }
            _ = shutdown_rx.changed() => {
                return finish(writer, outbound_tx, self.begin_close()).await;
            }
        };

        let interval_ms = match hello {
            SocketEvent::Message(ServerMessage::Hello { heartbeat_interval }) => heartbeat_interval,
            SocketEvent::Message(other) => {
                tracing::warn!(message = ?other, "Expected Hello as first frame");
                return finish(writer, outbound_tx, EpochEnd::Retry { resumable: true }).await;
            }
            SocketEvent::Protocol(e) => {
                tracing::warn!(error = %e, "Malformed frame during handshake");
                return finish(writer, outbound_tx, EpochEnd::Retry { resumable: false }).await;
            }
            SocketEvent::Closed(frame) => {
                return finish(writer, outbound_tx, classify_close(frame)).await;
            }
            SocketEvent::Error(e) => {
                tracing::warn!(error = %e, "Socket error during handshake");
                return finish(writer, outbound_tx, EpochEnd::Retry { resumable: true }).await;
            }
            SocketEvent::Ended => {
                return finish(writer, outbound_tx, EpochEnd::Retry { resumable: true }).await;
            }
        };

        self.session.set_heartbeat_interval(interval_ms);

        let acked = Arc::new(AtomicBool::new(true));
        let (liveness_tx, mut liveness_rx) = mpsc::channel(1);
        let heartbeat = Heartbeat::spawn(
            interval_ms,
            self.session.clone(),
            outbound_tx.clone(),
            acked.clone(),
            liveness_tx,
        );

        // resume if we hold a prior session, otherwise identify fresh
        let sent = if let Some((session_id, seq)) = self.session.resume_target() {
            self.set_state(ConnectionState::Resuming);
            tracing::info!(session_id = %session_id, seq, "Resuming session");
            outbound_tx
                .send(Envelope::resume(&ResumePayload {
                    token: self.config.token.clone(),
                    session_id,
                    seq,
                }))
                .await
        } else {
            self.set_state(ConnectionState::Identifying);
            self.session.begin_fresh_epoch();
            tracing::info!("Identifying with fresh session");
            let payload = IdentifyPayload::new(self.config.token.clone(), self.config.intents)
                .with_properties(identify_properties());
            outbound_tx.send(Envelope::identify(&payload)).await
        };

        if sent.is_err() {
            heartbeat.stop();
            return finish(writer, outbound_tx, EpochEnd::Retry { resumable: true }).await;
        }

        let outcome = loop {
            tokio::select! {
                event = next_event(&mut stream) => match event {
                    SocketEvent::Message(message) => {
                        if let Some(end) = self.handle_message(message, policy, &acked, &outbound_tx).await {
                            break end;
                        }
                    }
                    SocketEvent::Protocol(e) => {
                        tracing::warn!(error = %e, "Malformed frame; forcing fresh handshake");
                        break EpochEnd::Retry { resumable: false };
                    }
                    SocketEvent::Closed(frame) => break classify_close(frame),
                    SocketEvent::Error(e) => {
                        tracing::warn!(error = %e, "Socket error");
                        break EpochEnd::Retry { resumable: true };
                    }
                    SocketEvent::Ended => break EpochEnd::Retry { resumable: true },
                },
                _ = liveness_rx.recv() => {
                    tracing::warn!("Liveness failure; treating as socket error");
                    break EpochEnd::Retry { resumable: true };
                }
                _ = shutdown_rx.changed() => break self.begin_close(),
            }
        };

        heartbeat.stop();
        finish(writer, outbound_tx, outcome).await
    }

    /// Handle one decoded server message; `Some` ends the epoch.
    async fn handle_message(
        &self,
        message: ServerMessage,
        policy: &mut ReconnectPolicy,
        acked: &Arc<AtomicBool>,
        outbound_tx: &mpsc::Sender<Envelope>,
    ) -> Option<EpochEnd> {
        match message {
            ServerMessage::Dispatch { event, seq, data } => {
                self.session.observe_sequence(seq);

                match event.as_str() {
                    "READY" => {
                        if let Some(id) = data.get("session_id").and_then(Value::as_str) {
                            self.session.set_session_id(id);
                        }
                        policy.reset();
                        self.set_state(ConnectionState::Connected);
                        tracing::info!(seq, "Gateway handshake complete");
                    }
                    "RESUMED" => {
                        policy.reset();
                        self.set_state(ConnectionState::Connected);
                        tracing::info!(seq, "Session resumed");
                    }
                    _ => {}
                }

                self.cache.apply(&event, &data);
                self.handler.on_event(&event, &data).await;
                None
            }
            ServerMessage::HeartbeatRequest => {
                // answered immediately, out of the normal schedule
                let _ = outbound_tx.send(Envelope::heartbeat(self.session.last_sequence())).await;
                None
            }
            ServerMessage::HeartbeatAck => {
                acked.store(true, Ordering::SeqCst);
                None
            }
            ServerMessage::Reconnect => Some(EpochEnd::Reconnect),
            ServerMessage::InvalidSession { resumable } => {
                // local session state never survives an invalid-session
                // signal; the server's resumable hint is informational only
                tracing::warn!(resumable, "Session invalidated by server");
                Some(EpochEnd::Retry { resumable: false })
            }
            ServerMessage::Hello { .. } => {
                tracing::debug!("Unexpected Hello after handshake; ignoring");
                None
            }
        }
    }

    /// Clean close: discard session state and suppress reconnect.
    fn begin_close(&self) -> EpochEnd {
        self.set_state(ConnectionState::Closing);
        self.session.invalidate();
        EpochEnd::Shutdown
    }
}

/// Sole writer of the socket; serializes heartbeats with every other send.
async fn write_loop(mut sink: SplitSink<WsStream, Message>, mut outbound: mpsc::Receiver<Envelope>) {
    while let Some(envelope) = outbound.recv().await {
        match envelope.to_json() {
            Ok(json) => {
                if let Err(e) = sink.send(Message::Text(json)).await {
                    tracing::debug!(error = %e, "Socket write failed");
                    break;
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to encode outbound envelope"),
        }
    }
    // sends a close frame if the socket is still open
    let _ = sink.close().await;
}

/// Read the next meaningful frame off the socket.
async fn next_event(stream: &mut SplitStream<WsStream>) -> SocketEvent {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match ServerMessage::from_json(&text) {
                Ok(message) => return SocketEvent::Message(message),
                Err(e) => return SocketEvent::Protocol(e),
            },
            Some(Ok(Message::Close(frame))) => return SocketEvent::Closed(frame),
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
            Some(Ok(Message::Binary(_))) => {
                tracing::debug!("Binary frames not supported; ignoring");
            }
            Some(Err(e)) => return SocketEvent::Error(e),
            None => return SocketEvent::Ended,
        }
    }
}

/// Map a server close frame onto the reconnect policy.
fn classify_close(frame: Option<CloseFrame<'static>>) -> EpochEnd {
    let Some(frame) = frame else {
        tracing::warn!("Gateway closed without a close frame");
        return EpochEnd::Retry { resumable: true };
    };

    let raw = u16::from(frame.code);
    match CloseCode::from_u16(raw) {
        Some(CloseCode::AuthenticationFailed) => {
            EpochEnd::Fatal(GatewayError::AuthenticationFailed(frame.reason.to_string()))
        }
        Some(code) if code.is_fatal() => EpochEnd::Fatal(GatewayError::FatalClose {
            code: raw,
            reason: frame.reason.to_string(),
        }),
        Some(code) => {
            tracing::warn!(code = raw, reason = %frame.reason, "Gateway closed");
            EpochEnd::Retry {
                resumable: code.can_resume(),
            }
        }
        None => {
            tracing::warn!(code = raw, reason = %frame.reason, "Gateway closed with unknown code");
            EpochEnd::Retry { resumable: true }
        }
    }
}

/// Tear down the writer after the epoch outcome is decided.
async fn finish(writer: JoinHandle<()>, outbound_tx: mpsc::Sender<Envelope>, outcome: EpochEnd) -> EpochEnd {
    drop(outbound_tx);
    if tokio::time::timeout(Duration::from_secs(5), writer).await.is_err() {
        tracing::warn!("Writer task did not drain in time");
    }
    outcome
}

fn identify_properties() -> IdentifyProperties {
    IdentifyProperties::new()
        .with_os(std::env::consts::OS)
        .with_browser("relay")
        .with_device("relay")
}
