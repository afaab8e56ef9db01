//! Typed server messages
//!
//! Decodes a raw [`Envelope`] into one variant per control meaning plus a
//! dispatch variant, so downstream code matches exhaustively instead of
//! re-inspecting op codes.

use super::{Envelope, HelloPayload, OpCode};
use serde_json::Value;

/// A server-to-client message, decoded once from the wire envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// An application event (op 0)
    Dispatch {
        /// Event name
        event: String,
        /// Sequence number for this event
        seq: u64,
        /// Event payload
        data: Value,
    },
    /// Server asks for an immediate heartbeat, out of the normal schedule (op 1)
    HeartbeatRequest,
    /// Server requests a graceful close-and-resume (op 7)
    Reconnect,
    /// Session is invalid; local session state is discarded either way (op 9)
    InvalidSession {
        /// Server's hint on whether it would accept a resume
        resumable: bool,
    },
    /// Handshake greeting carrying the heartbeat interval (op 10)
    Hello {
        /// Heartbeat interval in milliseconds
        heartbeat_interval: u64,
    },
    /// Acknowledgment of a client heartbeat (op 11)
    HeartbeatAck,
}

/// Failure to interpret an envelope as a server message.
///
/// These are protocol-class errors: logged and answered with a clean
/// re-handshake, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("dispatch envelope missing event name")]
    MissingEventName,

    #[error("dispatch envelope missing sequence number")]
    MissingSequence,

    #[error("dispatch envelope missing payload")]
    MissingPayload,

    #[error("{op} envelope has malformed payload: {reason}")]
    MalformedPayload { op: OpCode, reason: String },

    #[error("unexpected client-only op code from server: {0}")]
    UnexpectedOpCode(OpCode),

    #[error("invalid envelope json: {0}")]
    Json(#[from] serde_json::Error),
}

impl TryFrom<Envelope> for ServerMessage {
    type Error = DecodeError;

    fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
        match envelope.op {
            OpCode::Dispatch => {
                let event = envelope.t.ok_or(DecodeError::MissingEventName)?;
                let seq = envelope.s.ok_or(DecodeError::MissingSequence)?;
                let data = envelope.d.ok_or(DecodeError::MissingPayload)?;
                Ok(Self::Dispatch { event, seq, data })
            }
            OpCode::Heartbeat => Ok(Self::HeartbeatRequest),
            OpCode::Reconnect => Ok(Self::Reconnect),
            OpCode::InvalidSession => {
                let resumable = envelope
                    .d
                    .as_ref()
                    .and_then(Value::as_bool)
                    .ok_or_else(|| DecodeError::MalformedPayload {
                        op: OpCode::InvalidSession,
                        reason: "expected boolean payload".to_string(),
                    })?;
                Ok(Self::InvalidSession { resumable })
            }
            OpCode::Hello => {
                let payload: HelloPayload = envelope
                    .d
                    .map(serde_json::from_value)
                    .transpose()?
                    .ok_or(DecodeError::MissingPayload)?;
                Ok(Self::Hello {
                    heartbeat_interval: payload.heartbeat_interval,
                })
            }
            OpCode::HeartbeatAck => Ok(Self::HeartbeatAck),
            op @ (OpCode::Identify | OpCode::Resume) => Err(DecodeError::UnexpectedOpCode(op)),
        }
    }
}

impl ServerMessage {
    /// Decode a raw JSON frame into a server message.
    pub fn from_json(json: &str) -> Result<Self, DecodeError> {
        let envelope = Envelope::from_json(json)?;
        Self::try_from(envelope)
    }
}
