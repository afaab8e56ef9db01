//! Keyed entity store
//!
//! Uses `DashMap` so concurrent upserts from the event path and the REST path
//! serialize per key and never interleave partially.

use crate::entity::{Entity, EntityKind, Scope};
use dashmap::DashMap;
use std::sync::Arc;

/// Lookup key: kind plus identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityKey {
    /// Create a key
    #[must_use]
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    scope: Scope,
    entity: Entity,
}

/// Shared handle to an [`EntityCache`]
pub type SharedEntityCache = Arc<EntityCache>;

/// The single source of truth per entity.
///
/// Last writer wins by arrival order regardless of origin; the two write
/// paths have no shared clock, so ordering is the only arbiter.
#[derive(Debug, Default)]
pub struct EntityCache {
    entries: DashMap<EntityKey, CacheEntry>,
}

impl EntityCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache wrapped in Arc
    #[must_use]
    pub fn new_shared() -> SharedEntityCache {
        Arc::new(Self::new())
    }

    /// Insert or overwrite an entity under the given owning scope.
    pub fn upsert(&self, scope: Scope, entity: Entity) {
        let key = EntityKey::new(entity.kind(), entity.id());
        tracing::trace!(kind = %entity.kind(), id = %entity.id(), scope = %scope, "Cache upsert");
        self.entries.insert(key, CacheEntry { scope, entity });
    }

    /// Look up an entity by kind and id.
    #[must_use]
    pub fn get(&self, kind: EntityKind, id: &str) -> Option<Entity> {
        self.entries
            .get(&EntityKey::new(kind, id))
            .map(|entry| entry.entity.clone())
    }

    /// Remove a single entity, returning it if present.
    pub fn remove(&self, kind: EntityKind, id: &str) -> Option<Entity> {
        self.entries
            .remove(&EntityKey::new(kind, id))
            .map(|(_, entry)| entry.entity)
    }

    /// Remove every entry owned by `scope`, returning how many were evicted.
    ///
    /// Called when a session is discarded or a structural parent entity is
    /// deleted.
    pub fn evict_scope(&self, scope: &Scope) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.scope != *scope);
        let evicted = before - self.entries.len();

        if evicted > 0 {
            tracing::debug!(scope = %scope, evicted, "Evicted cache scope");
        }

        evicted
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of cached entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
