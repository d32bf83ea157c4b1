pub mod engine;

pub use engine::{RouterEngine, RoutingDecision};
