//! Top-level client errors

use relay_common::ConfigError;
use relay_gateway::GatewayError;
use relay_rest::RestError;

/// Any failure surfaced by the client facade.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("configuration error")]
    Config(#[from] ConfigError),

    #[error("gateway error")]
    Gateway(#[from] GatewayError),

    #[error("rest error")]
    Rest(#[from] RestError),
}
