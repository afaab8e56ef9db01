//! # relay-client
//!
//! High-level facade over the relay crates: one handle that owns the
//! gateway connection, the REST dispatcher, and the shared entity cache.
//!
//! ```no_run
//! use relay_client::{Client, ClientConfig, Route, ShutdownMode};
//!
//! # async fn run() -> Result<(), relay_client::ClientError> {
//! let client = Client::builder(ClientConfig::new("token")).start()?;
//!
//! let me = client.submit(Route::get_current_user()).await?;
//! println!("logged in as {}", me["username"]);
//!
//! client.shutdown(ShutdownMode::Drain).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;

pub use client::{Client, ClientBuilder};
pub use error::ClientError;

// re-export the surface users touch directly
pub use relay_cache::{Entity, EntityKind, Scope, SharedEntityCache};
pub use relay_common::{ClientConfig, ConfigError};
pub use relay_gateway::{ConnectionState, EventHandler, GatewayError, NoopHandler};
pub use relay_protocol::Intents;
pub use relay_rest::{RestError, Route, ShutdownMode};
