pub mod config;
pub mod core;
pub mod observability;
pub mod policies;
pub mod routers;

pub use crate::config::{ConfigError, ConfigSnapshot, GatewayConfig};
pub use crate::core::{RoutingError, RoutingRequest};
pub use crate::observability::{DriftConfig, ExposureRecorder};
pub use crate::routers::{RouterEngine, RoutingDecision};
