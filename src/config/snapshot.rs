//! Immutable, versioned view of the routing configuration.
//!
//! A snapshot is compiled once from a [`GatewayConfig`] and never mutated; reloads
//! publish a brand new snapshot instead.

use indexmap::IndexMap;
use tracing::warn;

use super::{ConfigResult, GatewayConfig, ModelConfig};
use crate::{observability::drift::ExpectedShares, policies::ActiveRule};

/// Compiled experiment definition
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    pub id: String,
    pub unit_field: String,
    pub enabled: bool,
    /// Backend targets and raw weights in declaration order
    pub targets: Vec<(String, f64)>,
    /// Set when the experiment block cannot be used for routing
    pub malformed: Option<String>,
}

impl Experiment {
    /// Targets with weights scaled to sum to 1.0.
    ///
    /// Returns `None` for a malformed experiment, an empty mapping or a
    /// non-positive total.
    pub fn normalized_weights(&self) -> Option<Vec<(String, f64)>> {
        if self.is_malformed() {
            return None;
        }
        let total: f64 = self.targets.iter().map(|(_, w)| w).sum();
        if self.targets.is_empty() || total <= 0.0 {
            return None;
        }
        Some(
            self.targets
                .iter()
                .map(|(backend, w)| (backend.clone(), w / total))
                .collect(),
        )
    }

    pub fn is_malformed(&self) -> bool {
        self.malformed.is_some()
    }

    /// Expected traffic share per backend, used by the SRM check.
    pub fn expected_shares(&self) -> Option<ExpectedShares> {
        if self.is_malformed() {
            return None;
        }
        ExpectedShares::from_weights(self.targets.iter().map(|(b, w)| (b.as_str(), *w)))
    }
}

#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    version: u64,
    config: GatewayConfig,
    active_rule: ActiveRule,
    experiment: Option<Experiment>,
}

impl ConfigSnapshot {
    pub fn compile(config: GatewayConfig, version: u64) -> ConfigResult<Self> {
        config.validate()?;

        let active_rule = ActiveRule::resolve(
            config.routing_rules.default.as_deref(),
            &config.routing_rules.available,
        );

        let experiment = config.ab_testing.as_ref().map(|ab| {
            let malformed = ab.malformed_reason();
            if let Some(reason) = &malformed {
                warn!(
                    experiment = %ab.experiment_id,
                    version,
                    "Malformed experiment, its traffic will use the fallback backend: {}",
                    reason
                );
            }
            Experiment {
                id: ab.experiment_id.clone(),
                unit_field: ab.unit_field.clone(),
                enabled: ab.enabled,
                targets: ab.weighted_targets(),
                malformed,
            }
        });

        Ok(Self {
            version,
            config,
            active_rule,
            experiment,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn active_rule(&self) -> &ActiveRule {
        &self.active_rule
    }

    pub fn experiment(&self) -> Option<&Experiment> {
        self.experiment.as_ref()
    }

    pub fn backends(&self) -> &IndexMap<String, ModelConfig> {
        &self.config.models
    }

    pub fn backend(&self, id: &str) -> Option<&ModelConfig> {
        self.config.models.get(id)
    }

    /// Unknown ids count as disabled.
    pub fn is_backend_enabled(&self, id: &str) -> bool {
        self.backend(id).is_some_and(|m| m.enabled)
    }

    /// Configuration as loaded, for inspection endpoints.
    pub fn view(&self) -> &GatewayConfig {
        &self.config
    }
}
