//! Event fan-out and cache side effects
//!
//! Dispatch envelopes flow: sequence update → cache update → handler
//! callback, strictly in arrival order. Control envelopes never reach the
//! handler.

use async_trait::async_trait;
use relay_cache::{Entity, EntityKind, Scope, SharedEntityCache};
use serde_json::Value;

/// Application-facing event sink.
///
/// Invoked once per dispatch envelope, after the cache has been updated.
/// The read loop awaits the callback, so a slow handler applies backpressure
/// to the socket rather than reordering events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_event(&self, event: &str, data: &Value);
}

/// Handler that drops every event; useful when only the cache matters.
pub struct NoopHandler;

#[async_trait]
impl EventHandler for NoopHandler {
    async fn on_event(&self, _event: &str, _data: &Value) {}
}

/// Applies dispatch events to the shared entity cache.
pub struct CacheUpdater {
    cache: SharedEntityCache,
}

impl CacheUpdater {
    /// Create an updater writing to `cache`
    #[must_use]
    pub fn new(cache: SharedEntityCache) -> Self {
        Self { cache }
    }

    /// Apply the cache side effect of one dispatch event.
    ///
    /// Unknown event names have no cache effect. A payload that fails
    /// validation is logged and skipped; it never becomes visible.
    pub fn apply(&self, event: &str, data: &Value) {
        match event {
            "READY" => {
                if let Some(user) = data.get("user") {
                    self.upsert(EntityKind::User, user.clone());
                }
                if let Some(guilds) = data.get("guilds").and_then(Value::as_array) {
                    for guild in guilds {
                        self.upsert(EntityKind::Guild, guild.clone());
                    }
                }
            }
            "USER_UPDATE" => self.upsert(EntityKind::User, data.clone()),
            "GUILD_CREATE" | "GUILD_UPDATE" => self.upsert(EntityKind::Guild, data.clone()),
            "GUILD_DELETE" => {
                if let Some(id) = data.get("id").and_then(Value::as_str) {
                    self.cache.remove(EntityKind::Guild, id);
                    // the guild scope owns its channels and messages
                    self.cache.evict_scope(&Scope::Guild(id.to_string()));
                }
            }
            "CHANNEL_CREATE" | "CHANNEL_UPDATE" => self.upsert(EntityKind::Channel, data.clone()),
            "CHANNEL_DELETE" => {
                if let Some(id) = data.get("id").and_then(Value::as_str) {
                    self.cache.remove(EntityKind::Channel, id);
                }
            }
            "MESSAGE_CREATE" | "MESSAGE_UPDATE" => self.upsert(EntityKind::Message, data.clone()),
            "MESSAGE_DELETE" => {
                if let Some(id) = data.get("id").and_then(Value::as_str) {
                    self.cache.remove(EntityKind::Message, id);
                }
            }
            _ => tracing::trace!(event, "No cache effect"),
        }
    }

    fn upsert(&self, kind: EntityKind, data: Value) {
        match Entity::parse(kind, data) {
            Ok(entity) => {
                let scope = entity.owning_scope();
                self.cache.upsert(scope, entity);
            }
            Err(e) => tracing::warn!(kind = %kind, error = %e, "Discarding invalid entity payload"),
        }
    }
}
