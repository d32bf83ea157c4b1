use crate::{
    config::ConfigSnapshot,
    core::{RoutingError, RoutingResult},
};

/// First enabled backend in declaration order
#[derive(Debug, Default, Clone, Copy)]
pub struct FallbackPolicy;

impl FallbackPolicy {
    pub fn select<'a>(&self, snapshot: &'a ConfigSnapshot) -> RoutingResult<&'a str> {
        snapshot
            .backends()
            .iter()
            .find(|(_, model)| model.enabled)
            .map(|(id, _)| id.as_str())
            .ok_or(RoutingError::NoEnabledBackend)
    }
}
