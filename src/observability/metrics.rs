use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};

#[derive(Debug, Clone)]
pub struct PrometheusConfig {
    pub port: u16,
    pub host: String,
    pub latency_buckets: Option<Vec<f64>>,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            port: 29000,
            host: "0.0.0.0".to_string(),
            latency_buckets: None,
        }
    }
}

pub fn init_metrics() {
    describe_counter!(
        "gateway_exposures_total",
        "Experiment exposures by experiment and served backend"
    );
    describe_counter!(
        "gateway_routing_decisions_total",
        "Routing decisions by rule and selected backend"
    );
    describe_counter!(
        "gateway_routing_fallbacks_total",
        "Requests sent to the fallback backend by reason"
    );
    describe_counter!(
        "gateway_routing_errors_total",
        "Requests that could not be routed by error type"
    );

    describe_counter!(
        "gateway_srm_checks_total",
        "Sample ratio mismatch checks by experiment and verdict"
    );
    describe_gauge!(
        "gateway_srm_chi_square",
        "Chi-square statistic of the latest SRM check per experiment"
    );

    describe_counter!(
        "gateway_config_reloads_total",
        "Configuration reload attempts by status"
    );
    describe_gauge!(
        "gateway_config_version",
        "Version of the active configuration snapshot"
    );

    describe_counter!(
        "gateway_model_requests_total",
        "Requests forwarded to each pricing model"
    );
    describe_counter!(
        "gateway_model_errors_total",
        "Failed requests to each pricing model"
    );
    describe_histogram!(
        "gateway_model_latency_seconds",
        "Pricing model response latency in seconds"
    );
}

/// Install the Prometheus exporter and register metric descriptions.
pub fn start_prometheus(config: PrometheusConfig) -> Result<(), BuildError> {
    init_metrics();

    let latency_matcher = Matcher::Suffix(String::from("latency_seconds"));
    let latency_buckets: Vec<f64> = config.latency_buckets.unwrap_or_else(|| {
        vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
        ]
    });

    let ip_addr: IpAddr = config
        .host
        .parse()
        .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
    let socket_addr = SocketAddr::new(ip_addr, config.port);

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .upkeep_timeout(Duration::from_secs(5 * 60))
        .set_buckets_for_metric(latency_matcher, &latency_buckets)?
        .install()
}

pub struct GatewayMetrics;

impl GatewayMetrics {
    pub fn record_exposure(experiment_id: &str, backend_id: &str) {
        counter!("gateway_exposures_total",
            "experiment" => experiment_id.to_string(),
            "model" => backend_id.to_string()
        )
        .increment(1);
    }

    pub fn record_routing_decision(rule: &str, backend_id: &str) {
        counter!("gateway_routing_decisions_total",
            "rule" => rule.to_string(),
            "model" => backend_id.to_string()
        )
        .increment(1);
    }

    pub fn record_fallback(reason: &'static str) {
        counter!("gateway_routing_fallbacks_total", "reason" => reason).increment(1);
    }

    pub fn record_routing_error(error_type: &'static str) {
        counter!("gateway_routing_errors_total", "error_type" => error_type).increment(1);
    }

    pub fn record_srm_check(experiment_id: &str, suspicious: bool, chi_square: f64) {
        counter!("gateway_srm_checks_total",
            "experiment" => experiment_id.to_string(),
            "suspicious" => if suspicious { "true" } else { "false" }
        )
        .increment(1);
        gauge!("gateway_srm_chi_square",
            "experiment" => experiment_id.to_string()
        )
        .set(chi_square);
    }

    pub fn record_config_reload(success: bool) {
        counter!("gateway_config_reloads_total",
            "status" => if success { "success" } else { "failure" }
        )
        .increment(1);
    }

    pub fn set_config_version(version: u64) {
        gauge!("gateway_config_version").set(version as f64);
    }

    /// Outcome of a call to a pricing model backend.
    pub fn record_model_call(backend_id: &str, latency: Duration, success: bool) {
        counter!("gateway_model_requests_total",
            "model" => backend_id.to_string()
        )
        .increment(1);
        histogram!("gateway_model_latency_seconds",
            "model" => backend_id.to_string()
        )
        .record(latency.as_secs_f64());
        if !success {
            counter!("gateway_model_errors_total",
                "model" => backend_id.to_string()
            )
            .increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prometheus_config_default() {
        let config = PrometheusConfig::default();
        assert_eq!(config.port, 29000);
        assert_eq!(config.host, "0.0.0.0");
        assert!(config.latency_buckets.is_none());
    }

    #[test]
    fn test_recording_without_exporter_is_noop() {
        init_metrics();
        GatewayMetrics::record_exposure("exp", "model-a");
        GatewayMetrics::record_routing_decision("birthdate_even_odd", "model-a");
        GatewayMetrics::record_fallback("empty_weights");
        GatewayMetrics::record_routing_error("no_enabled_backend");
        GatewayMetrics::record_srm_check("exp", true, 12.5);
        GatewayMetrics::record_config_reload(false);
        GatewayMetrics::set_config_version(3);
        GatewayMetrics::record_model_call("model-a", Duration::from_millis(12), false);
    }
}
