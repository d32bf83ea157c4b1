//! Core types shared by the routing rules and the router engine
//!
//! - The validated request record handed over by the transport layer
//! - Routing error types

pub mod error;
pub mod request;

pub use error::{RoutingError, RoutingResult};
pub use request::{RoutingRequest, ANONYMOUS_UNIT};
