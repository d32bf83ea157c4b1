use chrono::NaiveDate;

use crate::{
    config::{parse_config_str, ConfigSnapshot},
    core::RoutingRequest,
};

pub const THREE_MODELS: &str = r#"
models:
  model-a: { url: http://model-a:8001, version: v1.0 }
  model-b: { url: http://model-b:8002, version: v1.1 }
  model-c: { url: http://model-c:8003, version: v2.0 }
"#;

pub fn snapshot(doc: &str) -> ConfigSnapshot {
    ConfigSnapshot::compile(parse_config_str(doc).unwrap(), 1).unwrap()
}

pub fn request(birthdate: &str, postal_code: &str) -> RoutingRequest {
    let birthdate = NaiveDate::parse_from_str(birthdate, "%Y-%m-%d").unwrap();
    RoutingRequest::new(birthdate, postal_code)
}
