//! Client facade
//!
//! Wires the gateway connection, REST dispatcher, and entity cache together
//! behind one handle. The gateway keeps the cache warm from dispatch events;
//! REST responses feed the same cache.

use crate::error::ClientError;
use relay_cache::{EntityCache, SharedEntityCache};
use relay_common::ClientConfig;
use relay_gateway::{ConnectionState, EventHandler, Gateway, GatewayConfig, NoopHandler};
use relay_rest::{RestDispatcher, Route, ShutdownMode};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

/// Builder for [`Client`].
pub struct ClientBuilder {
    config: ClientConfig,
    handler: Arc<dyn EventHandler>,
}

impl ClientBuilder {
    fn new(config: ClientConfig) -> Self {
        Self {
            config,
            handler: Arc::new(NoopHandler),
        }
    }

    /// Register the application event handler.
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Validate the configuration and start the client.
    ///
    /// Spawns the gateway connection task immediately; it connects and
    /// reconnects in the background.
    pub fn start(self) -> Result<Client, ClientError> {
        self.config.validate()?;

        let cache = EntityCache::new_shared();
        let rest = Arc::new(RestDispatcher::new(&self.config, cache.clone()));
        let gateway = Gateway::spawn(
            GatewayConfig::from(&self.config),
            cache.clone(),
            self.handler,
        );

        tracing::info!(
            gateway_url = %self.config.gateway_url,
            api_base_url = %self.config.api_base_url,
            "Client started"
        );

        Ok(Client {
            cache,
            gateway,
            rest,
        })
    }
}

/// Handle to a running client.
pub struct Client {
    cache: SharedEntityCache,
    gateway: Gateway,
    rest: Arc<RestDispatcher>,
}

impl Client {
    /// Start building a client from explicit configuration
    #[must_use]
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Build a client from `RELAY_*` environment variables
    pub fn from_env() -> Result<ClientBuilder, ClientError> {
        Ok(ClientBuilder::new(ClientConfig::from_env()?))
    }

    /// Shared entity cache
    #[must_use]
    pub fn cache(&self) -> &SharedEntityCache {
        &self.cache
    }

    /// Current gateway connection state
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.gateway.state()
    }

    /// Watch gateway state transitions
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.gateway.state_changes()
    }

    /// Submit a REST operation without a body.
    pub async fn submit(&self, route: Route) -> Result<Value, ClientError> {
        Ok(self.rest.submit(route, None).await?)
    }

    /// Submit a REST operation with a JSON body.
    pub async fn submit_with_body<T: Serialize>(
        &self,
        route: Route,
        body: &T,
    ) -> Result<Value, ClientError> {
        Ok(self.rest.submit_payload(route, body).await?)
    }

    /// Wait for the gateway task to end.
    pub async fn wait(&self) -> Result<(), ClientError> {
        Ok(self.gateway.wait().await?)
    }

    /// Stop the client.
    ///
    /// Winds down REST per `mode`, closes the gateway cleanly, and clears
    /// the cache. Session state is discarded; a new client identifies fresh.
    pub async fn shutdown(&self, mode: ShutdownMode) -> Result<(), ClientError> {
        self.rest.shutdown(mode).await;
        let result = self.gateway.shutdown().await;
        self.cache.clear();
        tracing::info!("Client stopped");
        Ok(result?)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.connection_state())
            .field("cached_entities", &self.cache.len())
            .finish()
    }
}
