//! # relay-cache
//!
//! In-process entity cache shared by the gateway event path and the REST
//! response path. Both subsystems converge on the same view: last writer wins
//! by arrival order, and entries are only made visible after the incoming
//! payload has been validated.

pub mod entity;
pub mod store;

pub use entity::{Entity, EntityError, EntityKind, Scope};
pub use store::{EntityCache, EntityKey, SharedEntityCache};
