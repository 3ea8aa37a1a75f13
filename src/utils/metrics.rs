//! Metrics Module
//!
//! Per-epoch metric records, the metric sink boundary, and accuracy
//! statistics over episodes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One epoch's named scalar metrics.
///
/// These records form the score history that is checkpointed after every
/// epoch; resuming a run continues the sequence with `epoch` numbering
/// intact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpochRecord {
    /// Epoch index (0-based)
    pub epoch: usize,
    /// Metric name -> value
    pub metrics: BTreeMap<String, f64>,
}

impl EpochRecord {
    pub fn new(epoch: usize) -> Self {
        Self {
            epoch,
            metrics: BTreeMap::new(),
        }
    }

    /// Insert a named scalar, returning self for chaining
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.metrics.insert(name.to_string(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

/// Destination for per-epoch scalar metrics.
///
/// The contract is deliberately minimal: the trainer pushes
/// `(name, value, step)` once per epoch and nothing else. Tensorboard-style
/// writers plug in behind this trait.
pub trait MetricSink {
    fn scalar(&mut self, name: &str, value: f64, step: usize);

    /// Push every metric of an epoch record
    fn record(&mut self, record: &EpochRecord) {
        for (name, value) in &record.metrics {
            self.scalar(name, *value, record.epoch);
        }
    }
}

/// Sink that logs every scalar through `tracing`
#[derive(Debug, Default)]
pub struct TracingSink;

impl MetricSink for TracingSink {
    fn scalar(&mut self, name: &str, value: f64, step: usize) {
        tracing::info!("{} = {:.4} (epoch {})", name, value, step);
    }
}

/// Sink that discards everything
#[derive(Debug, Default)]
pub struct NullSink;

impl MetricSink for NullSink {
    fn scalar(&mut self, _name: &str, _value: f64, _step: usize) {}
}

/// Mean and 95% confidence interval of per-episode accuracies.
///
/// Few-shot results are conventionally reported as `mean ± ci95` over a set
/// of sampled episodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccuracyStats {
    pub mean: f64,
    pub ci95: f64,
    pub episodes: usize,
}

impl AccuracyStats {
    /// Compute statistics from per-episode accuracies
    pub fn from_episode_accuracies(accuracies: &[f64]) -> Self {
        let n = accuracies.len();
        if n == 0 {
            return Self {
                mean: 0.0,
                ci95: 0.0,
                episodes: 0,
            };
        }

        let mean = accuracies.iter().sum::<f64>() / n as f64;
        let variance = accuracies
            .iter()
            .map(|a| (a - mean) * (a - mean))
            .sum::<f64>()
            / n as f64;
        let ci95 = if n > 1 {
            1.96 * (variance / n as f64).sqrt()
        } else {
            0.0
        };

        Self {
            mean,
            ci95,
            episodes: n,
        }
    }
}
