//! Test helpers for integration tests
//!
//! Provides a scriptable mock gateway server, an event-recording handler,
//! and state-watching utilities.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use relay_gateway::{ConnectionState, EventHandler};
use relay_protocol::{Envelope, OpCode};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

/// Upper bound on any single wait in a test
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// In-process gateway server the client under test connects to.
///
/// Tests script it frame by frame; nothing happens until the test says so.
pub struct MockGateway {
    listener: TcpListener,
    addr: SocketAddr,
}

impl MockGateway {
    /// Bind on an ephemeral port
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        Ok(Self { listener, addr })
    }

    /// URL the client should connect to
    pub fn url(&self) -> String {
        format!("ws://{}/gateway", self.addr)
    }

    /// Wait for the next client connection and complete the WebSocket upgrade
    pub async fn accept(&self) -> Result<GatewayConn> {
        let (stream, _) = timeout(RECV_TIMEOUT, self.listener.accept())
            .await
            .context("timed out waiting for a gateway connection")??;
        let ws = accept_async(stream).await?;
        Ok(GatewayConn { ws })
    }

    /// Assert that no new connection arrives within `wait`
    pub async fn expect_no_connection(&self, wait: Duration) -> Result<()> {
        if timeout(wait, self.listener.accept()).await.is_ok() {
            bail!("client reconnected when it should not have");
        }
        Ok(())
    }
}

/// One accepted gateway connection, driven frame by frame from the test.
pub struct GatewayConn {
    ws: WebSocketStream<TcpStream>,
}

impl GatewayConn {
    /// Send an envelope to the client
    pub async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        self.ws.send(Message::Text(envelope.to_json()?)).await?;
        Ok(())
    }

    /// Receive the next envelope from the client
    pub async fn recv(&mut self) -> Result<Envelope> {
        loop {
            let frame = timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .context("timed out waiting for a client frame")?;
            match frame {
                Some(Ok(Message::Text(text))) => return Ok(Envelope::from_json(&text)?),
                Some(Ok(Message::Close(frame))) => bail!("client closed the socket: {frame:?}"),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => bail!("socket ended"),
            }
        }
    }

    /// Receive the next envelope with the given op.
    ///
    /// Heartbeats that arrive in the meantime are acked and skipped; any
    /// other op is a test failure.
    pub async fn expect_op(&mut self, op: OpCode) -> Result<Envelope> {
        loop {
            let envelope = self.recv().await?;
            if envelope.op == op {
                return Ok(envelope);
            }
            if envelope.op == OpCode::Heartbeat {
                self.send(&Envelope::heartbeat_ack()).await?;
                continue;
            }
            bail!("expected {op}, got {envelope}");
        }
    }

    /// Run the server half of the opening handshake.
    ///
    /// Sends Hello with the given heartbeat interval and returns the
    /// client's answer, either Identify or Resume.
    pub async fn handshake(&mut self, heartbeat_interval_ms: u64) -> Result<Envelope> {
        self.send(&Envelope::hello(heartbeat_interval_ms)).await?;
        loop {
            let envelope = self.recv().await?;
            match envelope.op {
                OpCode::Identify | OpCode::Resume => return Ok(envelope),
                OpCode::Heartbeat => self.send(&Envelope::heartbeat_ack()).await?,
                other => bail!("unexpected {other} during handshake"),
            }
        }
    }

    /// Close the connection with a gateway close code
    pub async fn close_with(mut self, code: u16, reason: &str) -> Result<()> {
        self.ws
            .send(Message::Close(Some(CloseFrame {
                code: WsCloseCode::from(code),
                reason: reason.to_string().into(),
            })))
            .await?;
        Ok(())
    }

    /// Wait for the client to close the socket
    pub async fn expect_closed(&mut self) -> Result<()> {
        loop {
            let frame = timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .context("timed out waiting for the client to close")?;
            match frame {
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(_)) => return Ok(()),
            }
        }
    }
}

/// Handler that forwards every event to a channel the test can drain.
pub struct RecordingHandler {
    tx: mpsc::UnboundedSender<(String, Value)>,
}

impl RecordingHandler {
    /// Create a handler and the receiving end for assertions
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<(String, Value)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn on_event(&self, event: &str, data: &Value) {
        let _ = self.tx.send((event.to_string(), data.clone()));
    }
}

/// Wait until the connection reaches `want`
pub async fn wait_for_state(
    rx: &mut watch::Receiver<ConnectionState>,
    want: ConnectionState,
) -> Result<()> {
    timeout(RECV_TIMEOUT, async {
        loop {
            if *rx.borrow_and_update() == want {
                return Ok(());
            }
            rx.changed().await?;
        }
    })
    .await
    .with_context(|| format!("timed out waiting for state {want}"))?
}
