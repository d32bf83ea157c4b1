use chrono::Datelike;

use super::{RoutingRule, RuleOutcome};
use crate::{config::ConfigSnapshot, core::RoutingRequest};

/// Even day of birth goes to model-a, odd day to model-b
#[derive(Debug, Default, Clone, Copy)]
pub struct BirthdateParityRule;

impl RoutingRule for BirthdateParityRule {
    fn evaluate(&self, request: &RoutingRequest, _snapshot: &ConfigSnapshot) -> RuleOutcome {
        let backend = if request.birthdate.day() % 2 == 0 {
            "model-a"
        } else {
            "model-b"
        };
        RuleOutcome::Selected(backend.to_string())
    }
}
