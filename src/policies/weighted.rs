use super::{
    sticky_hash::{bucket_value, pick_bucket},
    Assignment, FallbackReason, RoutingRule, RuleOutcome,
};
use crate::{config::ConfigSnapshot, core::RoutingRequest};

/// Weighted A/B split with sticky assignment per unit id
///
/// The unit id is read from the attribute named by the experiment's `unit_field`.
/// Requires an enabled, well-formed experiment with a positive total weight;
/// anything else is sent to the fallback backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedStickyRule;

impl RoutingRule for WeightedStickyRule {
    fn evaluate(&self, request: &RoutingRequest, snapshot: &ConfigSnapshot) -> RuleOutcome {
        let Some(experiment) = snapshot.experiment() else {
            return RuleOutcome::Fallback(FallbackReason::ExperimentMissing);
        };
        if !experiment.enabled {
            return RuleOutcome::Fallback(FallbackReason::ExperimentDisabled);
        }
        if experiment.is_malformed() {
            return RuleOutcome::Fallback(FallbackReason::MalformedExperiment);
        }
        let Some(weighted) = experiment.normalized_weights() else {
            return RuleOutcome::Fallback(FallbackReason::EmptyWeights);
        };

        let unit_id = request.unit_id(&experiment.unit_field);
        let bucket = bucket_value(&experiment.id, &unit_id);
        let weights: Vec<f64> = weighted.iter().map(|(_, w)| *w).collect();
        let Some(idx) = pick_bucket(&weights, bucket) else {
            return RuleOutcome::Fallback(FallbackReason::EmptyWeights);
        };

        RuleOutcome::Assigned(Assignment {
            experiment_id: experiment.id.clone(),
            unit_id,
            bucket,
            backend_id: weighted[idx].0.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::policies::test_utils::{request, snapshot};

    fn experiment_doc(ab_block: &str) -> String {
        format!(
            r#"
models:
  model-a: {{ url: http://a }}
  model-b: {{ url: http://b }}
  model-c: {{ url: http://c }}
routing_rules:
  default: ab_testing_percentage
ab_testing:
{ab_block}
"#
        )
    }

    fn assigned_backend(outcome: RuleOutcome) -> String {
        match outcome {
            RuleOutcome::Assigned(a) => a.backend_id,
            other => panic!("Expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_experiment_falls_back() {
        let snap = snapshot("models:\n  model-a: { url: http://a }\n");
        assert_eq!(
            WeightedStickyRule.evaluate(&request("1990-06-15", "1234AC"), &snap),
            RuleOutcome::Fallback(FallbackReason::ExperimentMissing)
        );
    }

    #[test]
    fn test_disabled_experiment_falls_back() {
        let snap = snapshot(&experiment_doc(
            "  enabled: false\n  distributions: { model-a: 1 }",
        ));
        assert_eq!(
            WeightedStickyRule.evaluate(&request("1990-06-15", "1234AC"), &snap),
            RuleOutcome::Fallback(FallbackReason::ExperimentDisabled)
        );
    }

    #[test]
    fn test_zero_total_weight_falls_back() {
        let snap = snapshot(&experiment_doc(
            "  enabled: true\n  distributions: { model-a: 0, model-b: 0 }",
        ));
        assert_eq!(
            WeightedStickyRule.evaluate(&request("1990-06-15", "1234AC"), &snap),
            RuleOutcome::Fallback(FallbackReason::EmptyWeights)
        );
    }

    #[test]
    fn test_malformed_experiment_falls_back() {
        for block in [
            "  enabled: true\n  distributions: { model-a: -1, model-b: 2 }",
            "  enabled: true\n  distributions: { model-a: .nan, model-b: 1 }",
            "  enabled: true\n  variants:\n    A: { weight: 1 }\n    B: { target: model-b, weight: 1 }",
        ] {
            let snap = snapshot(&experiment_doc(block));
            assert_eq!(
                WeightedStickyRule.evaluate(&request("1990-06-15", "1234AC"), &snap),
                RuleOutcome::Fallback(FallbackReason::MalformedExperiment),
                "{block}"
            );
        }
    }

    #[test]
    fn test_assignment_carries_experiment_and_unit() {
        let snap = snapshot(&experiment_doc(
            "  enabled: true\n  experiment_id: exp-42\n  distributions: { model-a: 1 }",
        ));
        match WeightedStickyRule.evaluate(&request("1990-06-15", "1234AC"), &snap) {
            RuleOutcome::Assigned(a) => {
                assert_eq!(a.experiment_id, "exp-42");
                assert_eq!(a.unit_id, "1234AC");
                assert_eq!(a.backend_id, "model-a");
                assert_eq!(a.bucket, bucket_value("exp-42", "1234AC"));
            }
            other => panic!("Expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_assignment_is_sticky() {
        let snap = snapshot(&experiment_doc(
            "  enabled: true\n  distributions: { model-a: 0.33, model-b: 0.33, model-c: 0.34 }",
        ));
        for unit in ["1234AC", "5678BD", "9999ZZ", "0000AA"] {
            let req = request("1990-06-15", unit);
            let first = assigned_backend(WeightedStickyRule.evaluate(&req, &snap));
            for _ in 0..20 {
                assert_eq!(assigned_backend(WeightedStickyRule.evaluate(&req, &snap)), first);
            }
        }
    }

    #[test]
    fn test_unit_field_selects_attribute() {
        let snap = snapshot(&experiment_doc(
            "  enabled: true\n  unit_field: customer_id\n  distributions: { model-a: 1, model-b: 1 }",
        ));
        let a = request("1990-06-15", "1111AA").with_attribute("customer_id", "cust-7");
        let b = request("1985-01-02", "9999ZZ").with_attribute("customer_id", "cust-7");

        let RuleOutcome::Assigned(first) = WeightedStickyRule.evaluate(&a, &snap) else {
            panic!("expected assignment");
        };
        let RuleOutcome::Assigned(second) = WeightedStickyRule.evaluate(&b, &snap) else {
            panic!("expected assignment");
        };
        assert_eq!(first.unit_id, "cust-7");
        assert_eq!(first.backend_id, second.backend_id);
    }

    #[test]
    fn test_missing_unit_field_uses_anonymous() {
        let snap = snapshot(&experiment_doc(
            "  enabled: true\n  unit_field: customer_id\n  distributions: { model-a: 1, model-b: 1 }",
        ));
        let RuleOutcome::Assigned(a) =
            WeightedStickyRule.evaluate(&request("1990-06-15", "1234AC"), &snap)
        else {
            panic!("expected assignment");
        };
        assert_eq!(a.unit_id, "anonymous");
    }

    #[test]
    fn test_weight_normalization_is_scale_free() {
        let raw = snapshot(&experiment_doc(
            "  enabled: true\n  distributions: { model-a: 1, model-b: 1, model-c: 2 }",
        ));
        let normalized = snapshot(&experiment_doc(
            "  enabled: true\n  distributions: { model-a: 0.25, model-b: 0.25, model-c: 0.5 }",
        ));
        for i in 0..2_000 {
            let req = request("1990-06-15", &format!("{i:05}"));
            assert_eq!(
                assigned_backend(WeightedStickyRule.evaluate(&req, &raw)),
                assigned_backend(WeightedStickyRule.evaluate(&req, &normalized)),
            );
        }
    }

    #[test]
    fn test_variants_route_to_targets() {
        let snap = snapshot(&experiment_doc(
            "  enabled: true\n  variants:\n    control: { target: model-b, weight: 1 }\n    treatment: { target: model-c, weight: 1 }",
        ));
        let mut seen: HashMap<String, usize> = HashMap::new();
        for i in 0..500 {
            let backend = assigned_backend(
                WeightedStickyRule.evaluate(&request("1990-06-15", &i.to_string()), &snap),
            );
            *seen.entry(backend).or_default() += 1;
        }
        assert_eq!(seen.len(), 2);
        assert!(seen.contains_key("model-b"));
        assert!(seen.contains_key("model-c"));
    }

    #[test]
    fn test_zero_weight_backend_never_selected() {
        let snap = snapshot(&experiment_doc(
            "  enabled: true\n  distributions: { model-a: 0, model-b: 1 }",
        ));
        for i in 0..500 {
            assert_eq!(
                assigned_backend(
                    WeightedStickyRule.evaluate(&request("1990-06-15", &i.to_string()), &snap)
                ),
                "model-b"
            );
        }
    }
}
