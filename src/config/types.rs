use std::fmt;

use indexmap::IndexMap;
use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Deserializer, Serialize,
};

use super::{ConfigError, ConfigResult};

pub const DEFAULT_EXPERIMENT_ID: &str = "api_routing_default";
pub const DEFAULT_UNIT_FIELD: &str = "postal_code";

/// Routing configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Declaration order is the fallback priority.
    #[serde(deserialize_with = "deserialize_unique_models")]
    pub models: IndexMap<String, ModelConfig>,
    #[serde(default)]
    pub routing_rules: RoutingRulesConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ab_testing: Option<AbTestingConfig>,
}

/// Downstream pricing service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    pub url: String,
    #[serde(default)]
    pub version: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RoutingRulesConfig {
    /// Unset means every request goes to the fallback backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Empty means every known rule is allowed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available: Vec<String>,
}

/// A/B experiment block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AbTestingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_experiment_id")]
    pub experiment_id: String,
    #[serde(default = "default_unit_field")]
    pub unit_field: String,
    /// Direct backend weights
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distributions: Option<IndexMap<String, f64>>,
    /// Named variants pointing at backends; wins over `distributions`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variants: Option<IndexMap<String, VariantConfig>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariantConfig {
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub weight: f64,
}

fn default_enabled() -> bool {
    true
}

fn default_experiment_id() -> String {
    DEFAULT_EXPERIMENT_ID.to_string()
}

fn default_unit_field() -> String {
    DEFAULT_UNIT_FIELD.to_string()
}

impl Default for AbTestingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            experiment_id: default_experiment_id(),
            unit_field: default_unit_field(),
            distributions: None,
            variants: None,
        }
    }
}

impl AbTestingConfig {
    /// Weighted targets in declaration order, before normalization.
    pub fn weighted_targets(&self) -> Vec<(String, f64)> {
        if let Some(variants) = &self.variants {
            variants
                .values()
                .map(|v| (v.target.clone(), v.weight))
                .collect()
        } else {
            self.distributions
                .iter()
                .flatten()
                .map(|(model, weight)| (model.clone(), *weight))
                .collect()
        }
    }

    /// Description of the first problem that makes the experiment unusable.
    ///
    /// A malformed experiment does not fail the load; its traffic goes to the
    /// fallback backend and it gets no SRM expectation.
    pub fn malformed_reason(&self) -> Option<String> {
        if self.experiment_id.trim().is_empty() {
            return Some("experiment_id must not be empty".to_string());
        }

        if let Some(variants) = &self.variants {
            for (name, variant) in variants {
                if variant.target.trim().is_empty() {
                    return Some(format!("variant '{name}' does not name a target model"));
                }
                if let Some(reason) = weight_problem(&format!("variants.{name}"), variant.weight) {
                    return Some(reason);
                }
            }
        } else if let Some(distributions) = &self.distributions {
            for (model, weight) in distributions {
                if let Some(reason) = weight_problem(&format!("distributions.{model}"), *weight) {
                    return Some(reason);
                }
            }
        }
        None
    }
}

fn weight_problem(field: &str, weight: f64) -> Option<String> {
    (!weight.is_finite() || weight < 0.0)
        .then(|| format!("{field}: weight {weight} must be finite and non-negative"))
}

impl GatewayConfig {
    /// Structural checks on the model table.
    ///
    /// The experiment block is never fatal: problems there are reported by
    /// [`AbTestingConfig::malformed_reason`] and handled on the routing path.
    pub fn validate(&self) -> ConfigResult<()> {
        for (id, model) in &self.models {
            if id.trim().is_empty() {
                return Err(ConfigError::ValidationFailed {
                    reason: "model ids must not be empty".to_string(),
                });
            }
            if model.url.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("models.{id}.url"),
                    value: model.url.clone(),
                    reason: "url must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn deserialize_unique_models<'de, D>(
    deserializer: D,
) -> Result<IndexMap<String, ModelConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    struct UniqueModels;

    impl<'de> Visitor<'de> for UniqueModels {
        type Value = IndexMap<String, ModelConfig>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of model id to model configuration")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut models = IndexMap::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((id, model)) = access.next_entry::<String, ModelConfig>()? {
                if models.contains_key(&id) {
                    return Err(serde::de::Error::custom(format!("duplicate model id '{id}'")));
                }
                models.insert(id, model);
            }
            Ok(models)
        }
    }

    deserializer.deserialize_map(UniqueModels)
}
