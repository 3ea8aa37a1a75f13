//! Reduce-on-plateau learning rate scheduler
//!
//! Epoch-level controller that lowers the learning rate when the monitored
//! validation metric stops improving. Its full state (best metric, wait
//! counter, current rate) is serializable because it is part of every
//! checkpoint: a resumed run must continue the same plateau countdown.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::TrainingConfig;

/// Direction of improvement for the monitored metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlateauMode {
    /// Metric should decrease (e.g. loss)
    Min,
    /// Metric should increase (e.g. accuracy)
    Max,
}

/// Reduce-on-plateau scheduler state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlateauScheduler {
    best_metric: f64,
    epochs_without_improvement: usize,
    current_lr: f64,
    factor: f64,
    patience: usize,
    min_lr: f64,
    mode: PlateauMode,
}

impl PlateauScheduler {
    pub fn new(initial_lr: f64, factor: f64, patience: usize, min_lr: f64, mode: PlateauMode) -> Self {
        let best_metric = match mode {
            PlateauMode::Min => f64::INFINITY,
            PlateauMode::Max => f64::NEG_INFINITY,
        };

        Self {
            best_metric,
            epochs_without_improvement: 0,
            current_lr: initial_lr,
            factor,
            patience,
            min_lr,
            mode,
        }
    }

    /// Scheduler monitoring validation loss, per the training configuration
    pub fn from_config(config: &TrainingConfig) -> Self {
        Self::new(
            config.learning_rate,
            config.plateau_factor,
            config.patience,
            config.min_lr,
            PlateauMode::Min,
        )
    }

    /// Record one epoch's monitored metric and return the learning rate to
    /// use from now on.
    pub fn step(&mut self, metric: f64) -> f64 {
        let improved = match self.mode {
            PlateauMode::Min => metric < self.best_metric,
            PlateauMode::Max => metric > self.best_metric,
        };

        if improved {
            self.best_metric = metric;
            self.epochs_without_improvement = 0;
        } else {
            self.epochs_without_improvement += 1;

            if self.epochs_without_improvement >= self.patience {
                let new_lr = (self.current_lr * self.factor).max(self.min_lr);
                if new_lr < self.current_lr {
                    info!(
                        "Plateau after {} epochs: learning rate {:.6} -> {:.6}",
                        self.epochs_without_improvement, self.current_lr, new_lr
                    );
                    self.current_lr = new_lr;
                    self.epochs_without_improvement = 0;
                }
            }
        }

        self.current_lr
    }

    /// Current learning rate
    pub fn lr(&self) -> f64 {
        self.current_lr
    }

    /// Best metric value observed so far
    pub fn best_metric(&self) -> f64 {
        self.best_metric
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_improvement_keeps_rate() {
        let mut scheduler = PlateauScheduler::new(0.1, 0.5, 3, 1e-6, PlateauMode::Min);

        assert_eq!(scheduler.step(1.0), 0.1);
        assert_eq!(scheduler.step(0.9), 0.1);
        assert_eq!(scheduler.step(0.8), 0.1);
    }

    #[test]
    fn test_plateau_reduces_rate_after_patience() {
        let mut scheduler = PlateauScheduler::new(0.1, 0.5, 3, 1e-6, PlateauMode::Min);

        scheduler.step(0.8);
        assert_eq!(scheduler.step(0.85), 0.1);
        assert_eq!(scheduler.step(0.86), 0.1);
        assert_eq!(scheduler.step(0.87), 0.05);
    }

    #[test]
    fn test_rate_never_drops_below_min() {
        let mut scheduler = PlateauScheduler::new(1e-5, 0.1, 1, 1e-6, PlateauMode::Min);

        scheduler.step(0.5);
        assert_eq!(scheduler.step(0.6), 1e-6);
        assert_eq!(scheduler.step(0.7), 1e-6);
    }

    #[test]
    fn test_max_mode_tracks_increases() {
        let mut scheduler = PlateauScheduler::new(0.1, 0.5, 2, 1e-6, PlateauMode::Max);

        scheduler.step(0.5);
        assert_eq!(scheduler.step(0.6), 0.1);
        scheduler.step(0.55);
        assert_eq!(scheduler.step(0.58), 0.05);
    }

    #[test]
    fn test_state_round_trips_through_serde() {
        let mut scheduler = PlateauScheduler::new(0.1, 0.5, 3, 1e-6, PlateauMode::Min);
        scheduler.step(0.8);
        scheduler.step(0.9);

        let json = serde_json::to_string(&scheduler).unwrap();
        let mut restored: PlateauScheduler = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, scheduler);

        // The restored scheduler continues the same countdown
        assert_eq!(restored.step(0.91), scheduler.step(0.91));
        assert_eq!(restored, scheduler);
    }
}
