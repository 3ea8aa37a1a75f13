//! Utility modules: error taxonomy, logging, and metrics.

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{FewShotError, Result};
pub use metrics::{AccuracyStats, EpochRecord, MetricSink, NullSink, TracingSink};
