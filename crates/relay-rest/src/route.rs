//! Route descriptors
//!
//! A route carries both the concrete path to call and the template it was
//! built from. Rate-limit buckets key on the template plus the major
//! parameter, so `/channels/1/messages` and `/channels/2/messages` throttle
//! independently while every message in one channel shares a bucket.

use relay_cache::EntityKind;
use reqwest::Method;
use std::borrow::Cow;

/// One REST operation: method, concrete path, and bucket identity.
#[derive(Debug, Clone)]
pub struct Route {
    method: Method,
    /// Path template with placeholders, e.g. `/channels/{channel_id}/messages`
    template: Cow<'static, str>,
    /// Concrete path with parameters substituted
    path: String,
    /// Major parameter value, when the template has one
    major: Option<String>,
    /// Cache the response body under this kind, when the operation returns an entity
    cache_as: Option<EntityKind>,
}

impl Route {
    /// Build a route from raw parts.
    ///
    /// Prefer the named constructors; this exists for operations the
    /// convenience set does not cover.
    #[must_use]
    pub fn new(
        method: Method,
        template: impl Into<Cow<'static, str>>,
        path: impl Into<String>,
        major: Option<String>,
    ) -> Self {
        Self {
            method,
            template: template.into(),
            path: path.into(),
            major,
            cache_as: None,
        }
    }

    /// Tag the route so a successful response body is written to the cache
    #[must_use]
    pub fn caching_as(mut self, kind: EntityKind) -> Self {
        self.cache_as = Some(kind);
        self
    }

    /// `GET /users/@me`
    #[must_use]
    pub fn get_current_user() -> Self {
        Self::new(Method::GET, "/users/@me", "/users/@me", None).caching_as(EntityKind::User)
    }

    /// `GET /guilds/{guild_id}`
    #[must_use]
    pub fn get_guild(guild_id: &str) -> Self {
        Self::new(
            Method::GET,
            "/guilds/{guild_id}",
            format!("/guilds/{guild_id}"),
            Some(guild_id.to_string()),
        )
        .caching_as(EntityKind::Guild)
    }

    /// `GET /channels/{channel_id}`
    #[must_use]
    pub fn get_channel(channel_id: &str) -> Self {
        Self::new(
            Method::GET,
            "/channels/{channel_id}",
            format!("/channels/{channel_id}"),
            Some(channel_id.to_string()),
        )
        .caching_as(EntityKind::Channel)
    }

    /// `POST /channels/{channel_id}/messages`
    #[must_use]
    pub fn create_message(channel_id: &str) -> Self {
        Self::new(
            Method::POST,
            "/channels/{channel_id}/messages",
            format!("/channels/{channel_id}/messages"),
            Some(channel_id.to_string()),
        )
        .caching_as(EntityKind::Message)
    }

    /// `DELETE /channels/{channel_id}/messages/{message_id}`
    #[must_use]
    pub fn delete_message(channel_id: &str, message_id: &str) -> Self {
        Self::new(
            Method::DELETE,
            "/channels/{channel_id}/messages/{message_id}",
            format!("/channels/{channel_id}/messages/{message_id}"),
            Some(channel_id.to_string()),
        )
    }

    /// HTTP method
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Concrete request path, relative to the API base
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Entity kind a successful response should be cached under
    #[must_use]
    pub const fn cache_as(&self) -> Option<EntityKind> {
        self.cache_as
    }

    /// Bucket identity for this route.
    ///
    /// Two requests share a bucket exactly when method, template, and major
    /// parameter all match.
    #[must_use]
    pub fn bucket_key(&self) -> BucketKey {
        BucketKey(format!(
            "{}:{}:{}",
            self.method,
            self.template,
            self.major.as_deref().unwrap_or("-")
        ))
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Key grouping routes into a shared rate-limit bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey(String);

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
