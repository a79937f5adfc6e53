//! Leveled, colorized logging, wired to the metrics sink.
//!
//! Every `warn!`/`error!` event processed by the subscriber increments the
//! corresponding counter on the global [`crate::metrics::MetricsRegistry`],
//! realizing spec.md §2's "Logger … increments `log_warnings`/`log_errors`
//! counters" line.

use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::{fmt, EnvFilter};

use crate::metrics::MetricsRegistry;

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level (`trace`, `debug`, `info`, `warn`, `error`), used when
    /// `RUST_LOG` is unset.
    pub level: String,
    /// Emit structured JSON instead of colorized plain text.
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json_format: false }
    }
}

/// A `tracing_subscriber` layer that counts warnings and errors into the
/// metrics sink without otherwise altering how events are rendered.
struct MetricsCountingLayer {
    registry: &'static MetricsRegistry,
}

impl<S: Subscriber> Layer<S> for MetricsCountingLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        match *event.metadata().level() {
            Level::WARN => self.registry.log_warnings.inc(),
            Level::ERROR => self.registry.log_errors.inc(),
            _ => {}
        }
    }
}

/// Initialize the global `tracing` subscriber. Safe to call exactly once
/// per process; subsequent calls are a no-op error the caller may ignore.
pub fn init(config: LoggingConfig, registry: &'static MetricsRegistry) -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::prelude::*;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let counting = MetricsCountingLayer { registry };

    if config.json_format {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(counting)
            .with(fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(counting)
            .with(fmt::layer().with_target(false).with_ansi(true))
            .try_init()?;
    }

    Ok(())
}
