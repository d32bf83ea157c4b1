// Shared fixtures for the integration tests
#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use chrono::NaiveDate;
use pricing_gateway::{
    config::parse_config_str,
    core::RoutingRequest,
    observability::{DriftConfig, ExposureRecorder},
    routers::RouterEngine,
};

pub const PARITY_CONFIG: &str = r#"
models:
  model-a: { url: "http://model-a:8001", version: v1 }
  model-b: { url: "http://model-b:8002", version: v1 }
  model-c: { url: "http://model-c:8003", version: v1 }
routing_rules:
  default: birthdate_even_odd
"#;

pub const REGION_CONFIG: &str = r#"
models:
  model-a: { url: "http://model-a:8001", version: v1 }
  model-b: { url: "http://model-b:8002", version: v1 }
  model-c: { url: "http://model-c:8003", version: v1 }
routing_rules:
  default: postal_code_region
"#;

pub const AB_CONFIG: &str = r#"
models:
  model-a: { url: "http://model-a:8001", version: v1 }
  model-b: { url: "http://model-b:8002", version: v1 }
  model-c: { url: "http://model-c:8003", version: v1 }
routing_rules:
  default: ab_testing_percentage
ab_testing:
  enabled: true
  experiment_id: api_routing_2025_10
  unit_field: postal_code
  distributions:
    model-a: 0.33
    model-b: 0.33
    model-c: 0.34
"#;

pub fn request(birthdate: &str, postal_code: &str) -> RoutingRequest {
    let date = NaiveDate::parse_from_str(birthdate, "%Y-%m-%d").expect("valid test date");
    RoutingRequest::new(date, postal_code)
}

/// Recorder whose SRM check runs on every exposure.
pub fn eager_recorder(min_samples: u64) -> Arc<ExposureRecorder> {
    Arc::new(ExposureRecorder::new(DriftConfig {
        interval: Duration::ZERO,
        min_samples,
    }))
}

pub fn engine(doc: &str) -> RouterEngine {
    engine_with_recorder(doc, Arc::new(ExposureRecorder::default()))
}

pub fn engine_with_recorder(doc: &str, recorder: Arc<ExposureRecorder>) -> RouterEngine {
    RouterEngine::new(parse_config_str(doc).expect("valid test config"), recorder)
        .expect("engine builds")
}

pub fn write_config(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("models.yaml");
    fs::write(&path, contents).expect("write test config");
    path
}
