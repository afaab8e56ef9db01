//! Integration test utilities for the relay client
//!
//! Provides a scriptable in-process gateway server plus canned payloads for
//! driving the client through handshake, resume, and failure scenarios.

pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
