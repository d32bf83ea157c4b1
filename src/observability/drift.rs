//! Sample ratio mismatch (SRM) detection
//!
//! Compares the realized split of experiment exposures across backends with the
//! configured split using a chi-square goodness-of-fit statistic. The check is
//! purely diagnostic: it never fails, never blocks routing, and runs at most once
//! per interval per monitor regardless of traffic volume.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use dashmap::DashMap;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::metrics::GatewayMetrics;

pub const DEFAULT_SRM_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_SRM_MIN_SAMPLES: u64 = 50;

const NEVER: u64 = u64::MAX;

/// Expected traffic share per backend, normalized to sum to 1.0
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExpectedShares {
    shares: IndexMap<String, f64>,
}

impl ExpectedShares {
    /// Normalize raw weights, merging repeated backends.
    ///
    /// Returns `None` when there is nothing to compare against: no entries, or a
    /// total weight that is not positive.
    pub fn from_weights<'a>(weights: impl IntoIterator<Item = (&'a str, f64)>) -> Option<Self> {
        let mut shares: IndexMap<String, f64> = IndexMap::new();
        for (backend, weight) in weights {
            *shares.entry(backend.to_string()).or_insert(0.0) += weight;
        }

        let total: f64 = shares.values().sum();
        if shares.is_empty() || total.is_nan() || total <= 0.0 {
            return None;
        }
        for share in shares.values_mut() {
            *share /= total;
        }
        Some(Self { shares })
    }

    /// Zero for backends outside the experiment.
    pub fn share(&self, backend: &str) -> f64 {
        self.shares.get(backend).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.shares.iter().map(|(b, s)| (b.as_str(), *s))
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendObservation {
    pub backend: String,
    pub observed: u64,
    pub expected_share: f64,
    pub expected_count: f64,
}

/// Result of one SRM evaluation; only ever logged and exported, never stored
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftVerdict {
    pub experiment_id: String,
    pub total: u64,
    pub backends: Vec<BackendObservation>,
    pub chi_square: f64,
    pub degrees_of_freedom: usize,
    pub threshold: f64,
    pub suspicious: bool,
}

/// 95th percentile chi-square critical value for `arms` compared backends.
pub fn critical_value(arms: usize) -> f64 {
    let df = arms.saturating_sub(1).max(1);
    match arms {
        0..=2 => 3.84,
        3 => 5.99,
        4 => 7.81,
        5 => 9.49,
        _ => 3.84 + 2.0 * (df - 1) as f64,
    }
}

/// Chi-square goodness of fit of `tallies` against `expected`.
///
/// `tallies` holds every backend observed for the experiment; all of them count
/// towards the total, but only backends with a positive expected share are
/// compared, unobserved ones as zero. Returns `None` below `min_samples`, or when
/// fewer than two compared backends appear in `tallies`.
pub fn evaluate_split(
    experiment_id: &str,
    tallies: &HashMap<String, u64>,
    expected: &ExpectedShares,
    min_samples: u64,
) -> Option<DriftVerdict> {
    let total: u64 = tallies.values().sum();
    if total < min_samples {
        return None;
    }

    let backends: Vec<BackendObservation> = expected
        .iter()
        .filter(|(_, share)| *share > 0.0)
        .map(|(backend, share)| BackendObservation {
            backend: backend.to_string(),
            observed: tallies.get(backend).copied().unwrap_or(0),
            expected_share: share,
            expected_count: total as f64 * share,
        })
        .collect();

    let observed_arms = backends
        .iter()
        .filter(|b| tallies.contains_key(&b.backend))
        .count();
    if observed_arms < 2 {
        return None;
    }
    let arms = backends.len();

    let chi_square: f64 = backends
        .iter()
        .filter(|b| b.expected_count > 0.0)
        .map(|b| {
            let diff = b.observed as f64 - b.expected_count;
            diff * diff / b.expected_count
        })
        .sum();

    let threshold = critical_value(arms);
    Some(DriftVerdict {
        experiment_id: experiment_id.to_string(),
        total,
        backends,
        chi_square,
        degrees_of_freedom: arms - 1,
        threshold,
        suspicious: chi_square > threshold,
    })
}

#[derive(Debug, Clone)]
pub struct DriftConfig {
    /// Minimum time between two evaluations
    pub interval: Duration,
    /// Exposures required before an experiment is evaluated
    pub min_samples: u64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SRM_INTERVAL,
            min_samples: DEFAULT_SRM_MIN_SAMPLES,
        }
    }
}

/// Throttled SRM monitor
///
/// Holds the expected split per experiment and the timestamp of the last
/// evaluation attempt. The timestamp is claimed with a compare-and-swap so that
/// concurrent exposures do not both run the check.
#[derive(Debug)]
pub struct DriftMonitor {
    config: DriftConfig,
    expected: DashMap<String, ExpectedShares>,
    epoch: Instant,
    last_run_ms: AtomicU64,
}

impl DriftMonitor {
    pub fn new(config: DriftConfig) -> Self {
        Self {
            config,
            expected: DashMap::new(),
            epoch: Instant::now(),
            last_run_ms: AtomicU64::new(NEVER),
        }
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// Set or clear the expected split of an experiment.
    pub fn set_expected_distribution(&self, experiment_id: &str, expected: Option<ExpectedShares>) {
        match expected {
            Some(shares) => {
                info!(
                    experiment = experiment_id,
                    expected = ?shares,
                    "SRM expected distribution set"
                );
                self.expected.insert(experiment_id.to_string(), shares);
            }
            None => {
                if self.expected.remove(experiment_id).is_some() {
                    warn!(
                        experiment = experiment_id,
                        "SRM disabled: expected distribution cleared"
                    );
                }
            }
        }
    }

    pub fn expected_distribution(&self, experiment_id: &str) -> Option<ExpectedShares> {
        self.expected.get(experiment_id).map(|e| e.value().clone())
    }

    /// Evaluate an experiment now, ignoring the throttle.
    pub fn evaluate(
        &self,
        experiment_id: &str,
        tallies: &HashMap<String, u64>,
    ) -> Option<DriftVerdict> {
        let expected = self.expected.get(experiment_id)?;
        evaluate_split(experiment_id, tallies, &expected, self.config.min_samples)
    }

    /// Throttled check, emitting the verdict to logs and metrics.
    ///
    /// `tallies` is only invoked when the check actually runs.
    pub fn maybe_check<F>(&self, experiment_id: &str, tallies: F) -> Option<DriftVerdict>
    where
        F: FnOnce() -> HashMap<String, u64>,
    {
        if !self.expected.contains_key(experiment_id) {
            return None;
        }
        if !self.try_claim() {
            return None;
        }

        let verdict = self.evaluate(experiment_id, &tallies());
        match &verdict {
            Some(v) => emit_verdict(v),
            None => debug!(experiment = experiment_id, "SRM check skipped: not enough data"),
        }
        verdict
    }

    fn try_claim(&self) -> bool {
        let now = self.epoch.elapsed().as_millis() as u64;
        let last = self.last_run_ms.load(Ordering::Acquire);
        let interval = self.config.interval.as_millis() as u64;
        if last != NEVER && now.saturating_sub(last) < interval {
            return false;
        }
        self.last_run_ms
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for DriftMonitor {
    fn default() -> Self {
        Self::new(DriftConfig::default())
    }
}

fn emit_verdict(verdict: &DriftVerdict) {
    let counts: Vec<(&str, u64)> = verdict
        .backends
        .iter()
        .map(|b| (b.backend.as_str(), b.observed))
        .collect();

    info!(
        experiment = %verdict.experiment_id,
        total = verdict.total,
        counts = ?counts,
        chi_square = verdict.chi_square,
        df = verdict.degrees_of_freedom,
        suspicious = verdict.suspicious,
        "SRM check"
    );
    if verdict.suspicious {
        warn!(
            experiment = %verdict.experiment_id,
            chi_square = verdict.chi_square,
            threshold = verdict.threshold,
            "SRM suspected"
        );
    }

    GatewayMetrics::record_srm_check(
        &verdict.experiment_id,
        verdict.suspicious,
        verdict.chi_square,
    );
}
