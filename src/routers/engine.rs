//! Router engine
//!
//! Owns the live [`ConfigSnapshot`] behind an [`ArcSwap`]. Each routing call loads
//! the snapshot once at entry and uses it for the whole decision, so a reload that
//! lands mid-call never produces a decision mixing two configurations. Reloads
//! compile the new snapshot completely before publishing it with a single store;
//! a failed reload leaves the previous snapshot in place.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use arc_swap::ArcSwap;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{error, info};

use crate::{
    config::{
        load_config_file, parse_config_str, ConfigError, ConfigResult, ConfigSnapshot,
        GatewayConfig, ModelConfig,
    },
    core::{RoutingError, RoutingRequest, RoutingResult},
    observability::{ExposureRecorder, GatewayMetrics},
    policies::{ActiveRule, Assignment, FallbackPolicy, FallbackReason, RuleOutcome},
};

/// Outcome of routing one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingDecision {
    /// Backend the request must be sent to; always known and enabled
    pub backend_id: String,
    /// Active rule name, `"fallback"` when none is configured
    pub rule: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment: Option<Assignment>,
    pub config_version: u64,
}

impl RoutingDecision {
    pub fn used_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

pub struct RouterEngine {
    current: ArcSwap<ConfigSnapshot>,
    source: Option<PathBuf>,
    versions: AtomicU64,
    /// Serializes reloads so versions are published in order
    reload_lock: Mutex<()>,
    fallback: FallbackPolicy,
    recorder: Arc<ExposureRecorder>,
}

impl std::fmt::Debug for RouterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterEngine")
            .field("source", &self.source)
            .field("version", &self.current.load().version())
            .finish()
    }
}

impl RouterEngine {
    pub fn new(config: GatewayConfig, recorder: Arc<ExposureRecorder>) -> ConfigResult<Self> {
        Self::build(config, None, recorder)
    }

    /// Load the engine from a configuration file that [`RouterEngine::reload`] re-reads.
    pub fn from_file(path: impl AsRef<Path>, recorder: Arc<ExposureRecorder>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let config = load_config_file(path)?;
        Self::build(config, Some(path.to_path_buf()), recorder)
    }

    fn build(
        config: GatewayConfig,
        source: Option<PathBuf>,
        recorder: Arc<ExposureRecorder>,
    ) -> ConfigResult<Self> {
        let snapshot = ConfigSnapshot::compile(config, 1)?;
        sync_expected_distribution(&recorder, None, &snapshot);
        GatewayMetrics::set_config_version(1);

        info!(
            rule = snapshot.active_rule().name(),
            models = snapshot.backends().len(),
            source = ?source,
            "Router engine initialized"
        );

        Ok(Self {
            current: ArcSwap::from_pointee(snapshot),
            source,
            versions: AtomicU64::new(1),
            reload_lock: Mutex::new(()),
            fallback: FallbackPolicy,
            recorder,
        })
    }

    pub fn recorder(&self) -> &Arc<ExposureRecorder> {
        &self.recorder
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// The live snapshot; stays valid after later reloads.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    pub fn route(&self, request: &RoutingRequest) -> RoutingResult<String> {
        self.decide(request).map(|d| d.backend_id)
    }

    pub fn decide(&self, request: &RoutingRequest) -> RoutingResult<RoutingDecision> {
        let snapshot = self.current.load_full();
        self.decide_with(&snapshot, request)
    }

    /// Route against an explicitly captured snapshot.
    pub fn decide_with(
        &self,
        snapshot: &ConfigSnapshot,
        request: &RoutingRequest,
    ) -> RoutingResult<RoutingDecision> {
        let rule = snapshot.active_rule();
        let outcome = match rule {
            ActiveRule::Rule(kind) => kind.evaluate(request, snapshot),
            ActiveRule::Unknown(name) => {
                RuleOutcome::Fallback(FallbackReason::UnknownRule { name: name.clone() })
            }
            ActiveRule::Unset => RuleOutcome::Fallback(FallbackReason::NoRuleConfigured),
        };

        let (candidate, assignment, mut reason) = match outcome {
            RuleOutcome::Selected(backend) => (Some(backend), None, None),
            RuleOutcome::Assigned(assignment) => {
                (Some(assignment.backend_id.clone()), Some(assignment), None)
            }
            RuleOutcome::Fallback(reason) => (None, None, Some(reason)),
        };

        let backend_id = match candidate {
            Some(backend) if snapshot.is_backend_enabled(&backend) => backend,
            Some(backend) => {
                reason = Some(FallbackReason::BackendUnavailable { backend });
                self.select_fallback(snapshot)?
            }
            None => self.select_fallback(snapshot)?,
        };

        if let Some(reason) = &reason {
            info!(
                rule = rule.name(),
                reason = %reason,
                model = %backend_id,
                request_id = request.request_id.as_deref(),
                "Routing fell back to default backend"
            );
            GatewayMetrics::record_fallback(reason.as_str());
        } else {
            info!(
                rule = rule.name(),
                model = %backend_id,
                postal_code = %request.postal_code,
                request_id = request.request_id.as_deref(),
                "Routed request"
            );
        }
        GatewayMetrics::record_routing_decision(rule.name(), &backend_id);

        if let Some(assignment) = &assignment {
            self.recorder
                .record(&assignment.experiment_id, &assignment.unit_id, &backend_id);
        }

        Ok(RoutingDecision {
            backend_id,
            rule: rule.name().to_string(),
            fallback: reason,
            assignment,
            config_version: snapshot.version(),
        })
    }

    fn select_fallback(&self, snapshot: &ConfigSnapshot) -> RoutingResult<String> {
        match self.fallback.select(snapshot) {
            Ok(id) => Ok(id.to_string()),
            Err(e) => {
                error!(
                    config_version = snapshot.version(),
                    error = %e,
                    "No backend available for request"
                );
                GatewayMetrics::record_routing_error(e.error_type());
                Err(e)
            }
        }
    }

    /// Re-read the source file and publish it; returns the new version.
    pub fn reload(&self) -> ConfigResult<u64> {
        let Some(path) = self.source.as_deref() else {
            return Err(self.reload_failed(ConfigError::ValidationFailed {
                reason: "engine has no configuration file to reload from".to_string(),
            }));
        };
        match load_config_file(path) {
            Ok(config) => self.apply_config(config),
            Err(e) => Err(self.reload_failed(e)),
        }
    }

    pub fn reload_from_str(&self, contents: &str) -> ConfigResult<u64> {
        match parse_config_str(contents) {
            Ok(config) => self.apply_config(config),
            Err(e) => Err(self.reload_failed(e)),
        }
    }

    /// Compile `config` and swap it in as the live snapshot.
    pub fn apply_config(&self, config: GatewayConfig) -> ConfigResult<u64> {
        let _guard = self
            .reload_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let version = self.versions.load(Ordering::Acquire) + 1;
        let snapshot = match ConfigSnapshot::compile(config, version) {
            Ok(snapshot) => snapshot,
            Err(e) => return Err(self.reload_failed(e)),
        };
        self.versions.store(version, Ordering::Release);

        let current = Arc::new(snapshot);
        let previous = self.current.swap(Arc::clone(&current));
        sync_expected_distribution(&self.recorder, Some(&*previous), &current);

        info!(
            version,
            previous_version = previous.version(),
            rule = current.active_rule().name(),
            "Configuration reloaded"
        );
        GatewayMetrics::record_config_reload(true);
        GatewayMetrics::set_config_version(version);
        Ok(version)
    }

    fn reload_failed(&self, e: ConfigError) -> ConfigError {
        error!(
            version = self.current.load().version(),
            error = %e,
            "Configuration reload failed, keeping current snapshot"
        );
        GatewayMetrics::record_config_reload(false);
        e
    }

    pub fn get_backend_config(&self, id: &str) -> RoutingResult<ModelConfig> {
        self.current
            .load()
            .backend(id)
            .cloned()
            .ok_or_else(|| RoutingError::UnknownBackend { id: id.to_string() })
    }

    pub fn get_all_backends(&self) -> IndexMap<String, ModelConfig> {
        self.current.load().backends().clone()
    }

    pub fn is_backend_enabled(&self, id: &str) -> bool {
        self.current.load().is_backend_enabled(id)
    }

    /// Name of the active routing rule.
    pub fn routing_rule(&self) -> String {
        self.current.load().active_rule().name().to_string()
    }
}

fn sync_expected_distribution(
    recorder: &ExposureRecorder,
    previous: Option<&ConfigSnapshot>,
    current: &ConfigSnapshot,
) {
    let monitor = recorder.monitor();
    let active = current.experiment().filter(|e| e.enabled);

    if let Some(old) = previous.and_then(ConfigSnapshot::experiment) {
        if active.is_none_or(|e| e.id != old.id) {
            monitor.set_expected_distribution(&old.id, None);
        }
    }
    if let Some(experiment) = active {
        monitor.set_expected_distribution(&experiment.id, experiment.expected_shares());
    }
}
