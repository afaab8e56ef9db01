//! Cached entity model
//!
//! Entities are tagged by kind once, at parse time. The cache never
//! re-interprets a stored value as a different shape on lookup.

use serde_json::Value;

/// Ownership boundary for cache entries, torn down as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Lives for the whole session; evicted on permanent close
    Session,
    /// Owned by one guild; evicted when the guild is deleted or leaves view
    Guild(String),
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Session => write!(f, "session"),
            Self::Guild(id) => write!(f, "guild:{id}"),
        }
    }
}

/// Entity kinds the cache distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Guild,
    Channel,
    Message,
}

impl EntityKind {
    /// Get the name of this kind
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Guild => "guild",
            Self::Channel => "channel",
            Self::Message => "message",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Validation failure for an incoming entity payload.
///
/// A payload that fails validation never becomes visible in the cache.
#[derive(Debug, thiserror::Error)]
pub enum EntityError {
    #[error("{kind} payload is not a JSON object")]
    NotAnObject { kind: EntityKind },

    #[error("{kind} payload missing string `id` field")]
    MissingId { kind: EntityKind },
}

/// A validated, kind-tagged entity record.
///
/// The payload stays opaque beyond the identity key; field-level parsing
/// belongs to the application layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    kind: EntityKind,
    id: String,
    data: Value,
}

impl Entity {
    /// Validate a raw payload into an entity of the given kind.
    ///
    /// Requires a JSON object with a string `id`; anything else is rejected
    /// so partially-constructed records never reach the cache.
    pub fn parse(kind: EntityKind, data: Value) -> Result<Self, EntityError> {
        if !data.is_object() {
            return Err(EntityError::NotAnObject { kind });
        }
        let id = data
            .get("id")
            .and_then(Value::as_str)
            .ok_or(EntityError::MissingId { kind })?
            .to_string();

        Ok(Self { kind, id, data })
    }

    /// Get the entity kind
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Get the identity key
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the opaque payload
    #[must_use]
    pub const fn data(&self) -> &Value {
        &self.data
    }

    /// Guild this entity belongs to, if the payload names one.
    ///
    /// Used to derive the owning scope for channels and messages.
    #[must_use]
    pub fn guild_id(&self) -> Option<&str> {
        self.data.get("guild_id").and_then(Value::as_str)
    }

    /// The scope that owns this entity.
    ///
    /// Users and guilds belong to the session as a whole; channels and
    /// messages belong to their guild when the payload names one.
    #[must_use]
    pub fn owning_scope(&self) -> Scope {
        match self.kind {
            EntityKind::User | EntityKind::Guild => Scope::Session,
            EntityKind::Channel | EntityKind::Message => self
                .guild_id()
                .map_or(Scope::Session, |id| Scope::Guild(id.to_string())),
        }
    }
}
