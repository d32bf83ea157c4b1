use std::{
    collections::BTreeSet,
    fs::File,
    io::{self, BufRead, BufReader, IsTerminal, Write},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use pricing_gateway::{
    core::RoutingRequest,
    observability::{
        logging::{init_logging, parse_level, LoggingConfig},
        metrics::{start_prometheus, PrometheusConfig},
        DriftConfig, ExposureRecorder,
    },
    routers::RouterEngine,
};
use serde_json::json;

#[derive(Parser, Debug)]
#[command(name = "pricing-gateway")]
#[command(about = "Routing core of the pricing gateway: rules, sticky A/B splits and SRM checks")]
struct Cli {
    /// Routing configuration file
    #[arg(
        long,
        env = "MODELS_CONFIG_PATH",
        default_value = "gateway/config/models.yaml",
        global = true
    )]
    config: PathBuf,

    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Directory for the daily rolling log file
    #[arg(long, env = "LOG_DIR", global = true)]
    log_dir: Option<String>,

    #[arg(long, env = "LOG_JSON", default_value_t = false, global = true)]
    log_json: bool,

    #[arg(long, env = "PROMETHEUS_HOST", default_value = "0.0.0.0", global = true)]
    prometheus_host: String,

    /// Expose Prometheus metrics on this port
    #[arg(long, env = "PROMETHEUS_PORT", global = true)]
    prometheus_port: Option<u16>,

    #[arg(long, env = "SRM_INTERVAL_SECS", default_value_t = 60, global = true)]
    srm_interval_secs: u64,

    #[arg(long, env = "SRM_MIN_SAMPLES", default_value_t = 50, global = true)]
    srm_min_samples: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Route a single request and print the decision
    Route {
        #[arg(long)]
        birthdate: NaiveDate,
        #[arg(long, default_value = "")]
        postal_code: String,
        #[arg(long)]
        request_id: Option<String>,
        /// Extra request attribute, repeatable
        #[arg(long = "attr", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        attributes: Vec<(String, String)>,
    },
    /// Load the configuration and print it
    Check,
    /// Route JSON-lines requests, then print exposure tallies and SRM verdicts
    Replay {
        /// Input file, stdin when omitted
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty attribute name in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = parse_level(&cli.log_level)
        .with_context(|| format!("invalid log level '{}'", cli.log_level))?;
    let _log_guard = init_logging(LoggingConfig {
        level,
        json_format: cli.log_json,
        log_dir: cli.log_dir.clone(),
        colorize: !cli.log_json && io::stderr().is_terminal(),
        ..Default::default()
    });

    if let Some(port) = cli.prometheus_port {
        start_prometheus(PrometheusConfig {
            port,
            host: cli.prometheus_host.clone(),
            latency_buckets: None,
        })
        .context("failed to start Prometheus exporter")?;
    }

    let recorder = Arc::new(ExposureRecorder::new(DriftConfig {
        interval: Duration::from_secs(cli.srm_interval_secs),
        min_samples: cli.srm_min_samples,
    }));
    let engine = RouterEngine::from_file(&cli.config, recorder)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    match cli.command {
        Command::Route {
            birthdate,
            postal_code,
            request_id,
            attributes,
        } => {
            let mut request = RoutingRequest::new(birthdate, postal_code);
            if let Some(id) = request_id {
                request = request.with_request_id(id);
            }
            for (key, value) in attributes {
                request = request.with_attribute(key, value);
            }
            let decision = engine.decide(&request)?;
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
        Command::Check => {
            let snapshot = engine.snapshot();
            let report = json!({
                "version": snapshot.version(),
                "routing_rule": snapshot.active_rule().name(),
                "config": snapshot.view(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Replay { input } => {
            let reader: Box<dyn BufRead> = match &input {
                Some(path) => Box::new(BufReader::new(
                    File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
                )),
                None => Box::new(io::stdin().lock()),
            };
            replay(&engine, reader)?;
        }
    }

    Ok(())
}

fn replay(engine: &RouterEngine, reader: Box<dyn BufRead>) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let line_no = idx + 1;

        let result = match serde_json::from_str::<RoutingRequest>(&line) {
            Ok(request) => match engine.decide(&request) {
                Ok(decision) => {
                    let mut value = serde_json::to_value(&decision)?;
                    value["used_fallback"] = json!(decision.used_fallback());
                    value
                }
                Err(e) => json!({
                    "line": line_no,
                    "error": e.to_string(),
                    "status": e.status_code(),
                }),
            },
            Err(e) => json!({ "line": line_no, "error": format!("invalid request: {e}") }),
        };
        writeln!(out, "{result}")?;
    }

    let recorder = engine.recorder();
    let exposures = recorder.snapshot();
    let experiments: BTreeSet<&str> = exposures
        .iter()
        .map(|c| c.experiment_id.as_str())
        .collect();
    let verdicts: Vec<_> = experiments
        .into_iter()
        .filter_map(|id| recorder.monitor().evaluate(id, &recorder.tallies(id)))
        .collect();

    writeln!(
        out,
        "{}",
        json!({ "exposures": exposures, "srm": verdicts })
    )?;
    Ok(())
}
