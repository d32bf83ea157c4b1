//! Routing rules for the pricing gateway
//!
//! Every rule maps a request and the active configuration snapshot to a backend
//! choice, or asks the engine to apply the fallback policy. Rules are pure and
//! never fail for a well-formed request; availability of the chosen backend is
//! checked by the engine.

use std::{fmt, str::FromStr};

use serde::Serialize;

use crate::{config::ConfigSnapshot, core::RoutingRequest};

mod fallback;
mod parity;
mod region;
pub mod sticky_hash;
mod weighted;

#[cfg(test)]
pub(crate) mod test_utils;

pub use fallback::FallbackPolicy;
pub use parity::BirthdateParityRule;
pub use region::{leading_digits, PostalRegionRule};
pub use sticky_hash::{bucket_value, pick_bucket};
pub use weighted::WeightedStickyRule;

/// Common interface of the routing rule evaluators
pub trait RoutingRule: Send + Sync + fmt::Debug {
    fn evaluate(&self, request: &RoutingRequest, snapshot: &ConfigSnapshot) -> RuleOutcome;
}

/// Rules known to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    BirthdateEvenOdd,
    PostalCodeRegion,
    AbTestingPercentage,
}

impl RuleKind {
    pub const ALL: [RuleKind; 3] = [
        RuleKind::BirthdateEvenOdd,
        RuleKind::PostalCodeRegion,
        RuleKind::AbTestingPercentage,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            RuleKind::BirthdateEvenOdd => "birthdate_even_odd",
            RuleKind::PostalCodeRegion => "postal_code_region",
            RuleKind::AbTestingPercentage => "ab_testing_percentage",
        }
    }

    pub fn evaluate(&self, request: &RoutingRequest, snapshot: &ConfigSnapshot) -> RuleOutcome {
        match self {
            RuleKind::BirthdateEvenOdd => BirthdateParityRule.evaluate(request, snapshot),
            RuleKind::PostalCodeRegion => PostalRegionRule.evaluate(request, snapshot),
            RuleKind::AbTestingPercentage => WeightedStickyRule.evaluate(request, snapshot),
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RuleKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown routing rule '{s}'"))
    }
}

/// Rule selection compiled from `routing_rules`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveRule {
    Rule(RuleKind),
    /// Named rule that is not known, or not in the configured `available` set
    Unknown(String),
    Unset,
}

impl ActiveRule {
    pub fn resolve(default: Option<&str>, available: &[String]) -> Self {
        let Some(name) = default.map(str::trim).filter(|n| !n.is_empty()) else {
            return ActiveRule::Unset;
        };
        if !available.is_empty() && !available.iter().any(|a| a == name) {
            return ActiveRule::Unknown(name.to_string());
        }
        match name.parse::<RuleKind>() {
            Ok(kind) => ActiveRule::Rule(kind),
            Err(_) => ActiveRule::Unknown(name.to_string()),
        }
    }

    pub fn kind(&self) -> Option<RuleKind> {
        match self {
            ActiveRule::Rule(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Name reported in routing metadata and metrics
    pub fn name(&self) -> &str {
        match self {
            ActiveRule::Rule(kind) => kind.as_str(),
            ActiveRule::Unknown(name) => name,
            ActiveRule::Unset => "fallback",
        }
    }
}

/// Sticky experiment assignment made by the weighted rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub experiment_id: String,
    pub unit_id: String,
    /// Deterministic bucket value in [0, 1)
    pub bucket: f64,
    /// Backend picked by the weights, before the availability check
    pub backend_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    Selected(String),
    Assigned(Assignment),
    Fallback(FallbackReason),
}

/// Why a request was redirected to the fallback backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FallbackReason {
    NoRuleConfigured,
    UnknownRule { name: String },
    NoPostalDigits,
    ExperimentMissing,
    ExperimentDisabled,
    MalformedExperiment,
    EmptyWeights,
    BackendUnavailable { backend: String },
}

impl FallbackReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::NoRuleConfigured => "no_rule_configured",
            FallbackReason::UnknownRule { .. } => "unknown_rule",
            FallbackReason::NoPostalDigits => "no_postal_digits",
            FallbackReason::ExperimentMissing => "experiment_missing",
            FallbackReason::ExperimentDisabled => "experiment_disabled",
            FallbackReason::MalformedExperiment => "malformed_experiment",
            FallbackReason::EmptyWeights => "empty_weights",
            FallbackReason::BackendUnavailable { .. } => "backend_unavailable",
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::UnknownRule { name } => write!(f, "unknown rule '{name}'"),
            FallbackReason::BackendUnavailable { backend } => {
                write!(f, "backend '{backend}' is missing or disabled")
            }
            other => f.write_str(other.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_kind_round_trip_names() {
        for kind in RuleKind::ALL {
            assert_eq!(kind.as_str().parse::<RuleKind>().unwrap(), kind);
        }
        assert!("round_robin".parse::<RuleKind>().is_err());
    }

    #[test]
    fn test_resolve_unset() {
        assert_eq!(ActiveRule::resolve(None, &[]), ActiveRule::Unset);
        assert_eq!(ActiveRule::resolve(Some("  "), &[]), ActiveRule::Unset);
        assert_eq!(ActiveRule::Unset.name(), "fallback");
    }

    #[test]
    fn test_resolve_known_rule() {
        let rule = ActiveRule::resolve(Some("birthdate_even_odd"), &[]);
        assert_eq!(rule, ActiveRule::Rule(RuleKind::BirthdateEvenOdd));
        assert_eq!(rule.kind(), Some(RuleKind::BirthdateEvenOdd));
        assert_eq!(rule.name(), "birthdate_even_odd");
    }

    #[test]
    fn test_resolve_unknown_rule() {
        let rule = ActiveRule::resolve(Some("random"), &[]);
        assert_eq!(rule, ActiveRule::Unknown("random".to_string()));
        assert_eq!(rule.kind(), None);
        assert_eq!(rule.name(), "random");
    }

    #[test]
    fn test_resolve_respects_available_set() {
        let available = vec!["birthdate_even_odd".to_string()];
        assert_eq!(
            ActiveRule::resolve(Some("postal_code_region"), &available),
            ActiveRule::Unknown("postal_code_region".to_string())
        );
        assert_eq!(
            ActiveRule::resolve(Some("birthdate_even_odd"), &available),
            ActiveRule::Rule(RuleKind::BirthdateEvenOdd)
        );
    }

    #[test]
    fn test_fallback_reason_display() {
        assert_eq!(
            FallbackReason::BackendUnavailable {
                backend: "model-c".to_string()
            }
            .to_string(),
            "backend 'model-c' is missing or disabled"
        );
        assert_eq!(FallbackReason::EmptyWeights.to_string(), "empty_weights");
        assert_eq!(
            serde_json::to_value(FallbackReason::MalformedExperiment).unwrap(),
            serde_json::json!({ "reason": "malformed_experiment" })
        );
    }
}
