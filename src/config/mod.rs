pub mod snapshot;
pub mod types;

use std::path::Path;

pub use snapshot::*;
pub use types::*;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Invalid value for field '{field}': {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read configuration from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Parse a routing configuration document.
///
/// The result is validated but not yet compiled into a [`ConfigSnapshot`].
pub fn parse_config_str(contents: &str) -> ConfigResult<GatewayConfig> {
    let config: GatewayConfig = serde_yaml::from_str(contents)?;
    config.validate()?;
    Ok(config)
}

/// Read and parse the routing configuration file at `path`.
pub fn load_config_file(path: impl AsRef<Path>) -> ConfigResult<GatewayConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_config_str(&contents)
}
