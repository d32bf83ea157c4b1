//! Experiment exposure accounting
//!
//! Every served experiment assignment is recorded exactly once: the in-process
//! tally and the Prometheus counter are bumped in the same call, followed by a
//! structured log line and a throttled SRM check.

use std::{collections::HashMap, sync::Arc};

use dashmap::DashMap;
use serde::Serialize;
use tracing::info;

use super::{
    drift::{DriftConfig, DriftMonitor},
    metrics::GatewayMetrics,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ExposureKey {
    experiment_id: String,
    backend_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExposureCount {
    pub experiment_id: String,
    pub backend_id: String,
    pub count: u64,
}

/// Process-wide exposure tallies, safe to share across request handlers
#[derive(Debug)]
pub struct ExposureRecorder {
    counts: DashMap<ExposureKey, u64>,
    monitor: Arc<DriftMonitor>,
}

impl ExposureRecorder {
    pub fn new(drift: DriftConfig) -> Self {
        Self::with_monitor(Arc::new(DriftMonitor::new(drift)))
    }

    pub fn with_monitor(monitor: Arc<DriftMonitor>) -> Self {
        Self {
            counts: DashMap::new(),
            monitor,
        }
    }

    pub fn monitor(&self) -> &Arc<DriftMonitor> {
        &self.monitor
    }

    /// Record one exposure and return the updated tally for the pair.
    pub fn record(&self, experiment_id: &str, unit_id: &str, backend_id: &str) -> u64 {
        let key = ExposureKey {
            experiment_id: experiment_id.to_string(),
            backend_id: backend_id.to_string(),
        };
        // shard lock is released before tallies() walks the map
        let count = {
            let mut entry = self.counts.entry(key).or_insert(0);
            *entry += 1;
            *entry
        };
        GatewayMetrics::record_exposure(experiment_id, backend_id);

        info!(
            target: "pricing_gateway::exposure",
            experiment = experiment_id,
            unit = unit_id,
            model = backend_id,
            "exposure"
        );

        self.monitor
            .maybe_check(experiment_id, || self.tallies(experiment_id));
        count
    }

    pub fn count(&self, experiment_id: &str, backend_id: &str) -> u64 {
        let key = ExposureKey {
            experiment_id: experiment_id.to_string(),
            backend_id: backend_id.to_string(),
        };
        self.counts.get(&key).map(|c| *c).unwrap_or(0)
    }

    /// Per-backend tallies of one experiment.
    pub fn tallies(&self, experiment_id: &str) -> HashMap<String, u64> {
        self.counts
            .iter()
            .filter(|e| e.key().experiment_id == experiment_id)
            .map(|e| (e.key().backend_id.clone(), *e.value()))
            .collect()
    }

    pub fn total(&self, experiment_id: &str) -> u64 {
        self.counts
            .iter()
            .filter(|e| e.key().experiment_id == experiment_id)
            .map(|e| *e.value())
            .sum()
    }

    /// All tallies, sorted by experiment then backend.
    pub fn snapshot(&self) -> Vec<ExposureCount> {
        let mut out: Vec<ExposureCount> = self
            .counts
            .iter()
            .map(|e| ExposureCount {
                experiment_id: e.key().experiment_id.clone(),
                backend_id: e.key().backend_id.clone(),
                count: *e.value(),
            })
            .collect();
        out.sort_by(|a, b| {
            (&a.experiment_id, &a.backend_id).cmp(&(&b.experiment_id, &b.backend_id))
        });
        out
    }
}

impl Default for ExposureRecorder {
    fn default() -> Self {
        Self::new(DriftConfig::default())
    }
}
