use super::{FallbackReason, RoutingRule, RuleOutcome};
use crate::{config::ConfigSnapshot, core::RoutingRequest};

/// Routes on the first digit of the postal code
///
/// 0-3 (north) to model-a, 4-6 (central) to model-b, 7-9 (south) to model-c.
/// A postal code without digits is sent to the fallback backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostalRegionRule;

/// First contiguous run of ASCII digits in `postal_code`.
pub fn leading_digits(postal_code: &str) -> Option<&str> {
    let start = postal_code.find(|c: char| c.is_ascii_digit())?;
    let rest = &postal_code[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

impl RoutingRule for PostalRegionRule {
    fn evaluate(&self, request: &RoutingRequest, _snapshot: &ConfigSnapshot) -> RuleOutcome {
        let Some(first) = leading_digits(&request.postal_code).and_then(|d| d.bytes().next())
        else {
            return RuleOutcome::Fallback(FallbackReason::NoPostalDigits);
        };

        let backend = match first {
            b'0'..=b'3' => "model-a",
            b'4'..=b'6' => "model-b",
            _ => "model-c",
        };
        RuleOutcome::Selected(backend.to_string())
    }
}
