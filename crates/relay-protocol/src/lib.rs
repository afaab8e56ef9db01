//! # relay-protocol
//!
//! Wire protocol for the gateway connection: the `{op, t, s, d}` envelope,
//! operation codes, control payloads, and close codes.
//!
//! Everything here is transport-agnostic. The gateway crate feeds decoded
//! envelopes through [`ServerMessage::try_from`] and matches exhaustively on
//! the result; unknown or malformed frames surface as [`DecodeError`].

pub mod close_codes;
pub mod envelope;
pub mod opcodes;
pub mod payloads;
pub mod server_message;

pub use close_codes::CloseCode;
pub use envelope::Envelope;
pub use opcodes::OpCode;
pub use payloads::{HelloPayload, IdentifyPayload, IdentifyProperties, Intents, ResumePayload};
pub use server_message::{DecodeError, ServerMessage};
