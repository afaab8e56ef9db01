//! # relay-common
//!
//! Shared utilities for the relay client: configuration and telemetry.

pub mod config;
pub mod telemetry;

pub use config::{BackoffConfig, ClientConfig, ConfigError, RestConfig};
pub use telemetry::{init_tracing, init_tracing_with_config, try_init_tracing, TracingConfig, TracingError};
