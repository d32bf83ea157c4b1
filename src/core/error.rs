//! Error types for routing operations

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    /// Fatal for the request; the transport layer answers 503
    #[error("No enabled backends found in configuration")]
    NoEnabledBackend,

    #[error("Backend '{id}' not found in configuration")]
    UnknownBackend { id: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type RoutingResult<T> = Result<T, RoutingError>;

impl RoutingError {
    /// HTTP status the transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            RoutingError::NoEnabledBackend => 503,
            RoutingError::UnknownBackend { .. } => 404,
            RoutingError::Config(_) => 500,
        }
    }

    /// Label for the routing error counter.
    pub fn error_type(&self) -> &'static str {
        match self {
            RoutingError::NoEnabledBackend => "no_enabled_backend",
            RoutingError::UnknownBackend { .. } => "unknown_backend",
            RoutingError::Config(_) => "config",
        }
    }
}
