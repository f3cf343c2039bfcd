//! In-process verification metrics, rendered in Prometheus text format by
//! the CLI (`--metrics-out`).

pub mod metrics;

pub use metrics::VerifyMetrics;
