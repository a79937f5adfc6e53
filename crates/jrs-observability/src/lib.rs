//! Logging and metrics sink for jrs-connector.
//!
//! Provides:
//! - [`logging::init`] — leveled, colorized console logging via `tracing-subscriber`,
//!   wired to increment the `log_warnings`/`log_errors` counters on the global
//!   metrics registry.
//! - [`metrics`] — a process-wide Prometheus registry, configurable once via
//!   [`init_global_registry`] (first construction wins, survives individual
//!   connector instances).
//! - [`exporter`] — an `axum` router serving `GET /metrics` and `GET /health`.
//! - [`system_metrics`] — an optional periodic CPU/RSS sampler.

pub mod exporter;
pub mod logging;
pub mod metrics;
pub mod system_metrics;

pub use metrics::{get_global_registry, init_global_registry, BucketUnit, MetricsConfig, MetricsRegistry};
