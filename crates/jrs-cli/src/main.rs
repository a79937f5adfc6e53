//! The `jrs-connector` binary: loads configuration from flags/environment
//! (and a `.env` file, if present), wires up logging, metrics, the
//! connector, and runs until a shutdown signal arrives.

use clap::Parser;
use jrs_connector::config::{ConnectorConfig, MetricsServerConfig};
use jrs_connector::{Connector, RouteTableBuilder};
use jrs_core::config::HarnessConfig;
use jrs_core::lifecycle::MainHarness;
use jrs_observability::logging::LoggingConfig;
use jrs_observability::{exporter, init_global_registry, system_metrics};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Top-level CLI flags. `#[command(flatten)]` merges `ConnectorConfig`'s and
/// `MetricsServerConfig`'s own flags in alongside these.
#[derive(Parser)]
#[command(name = "jrs-connector", about = "A JSON-RPC 2.0 microservice mesh connector")]
struct Cli {
    #[command(flatten)]
    connector: ConnectorConfig,

    #[command(flatten)]
    metrics_server: MetricsServerConfig,

    #[command(flatten)]
    harness: HarnessConfig,

    /// Log level (`trace`, `debug`, `info`, `warn`, `error`, or an
    /// `EnvFilter` directive string).
    #[arg(long, env = "JRS_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit structured JSON logs instead of human-readable text.
    #[arg(long, env = "JRS_LOG_JSON", default_value_t = false)]
    log_json: bool,

    /// Sample and publish process memory/CPU usage on an interval.
    #[arg(long, env = "JRS_SYSTEM_METRICS", default_value_t = false)]
    system_metrics: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let metrics = init_global_registry(cli.connector.metrics_config());
    jrs_observability::logging::init(
        LoggingConfig { level: cli.log_level.clone(), json_format: cli.log_json },
        metrics,
    )?;

    if cli.system_metrics {
        system_metrics::start(metrics, std::time::Duration::from_secs(15));
    }

    let harness = MainHarness::new(cli.harness.name);
    harness.print_config(&cli.connector);

    let (routes, defaults) = RouteTableBuilder::new().build();
    let connector = Arc::new(Connector::new(cli.connector, routes, defaults, metrics));

    let metrics_listener =
        TcpListener::bind((cli.metrics_server.host.as_str(), cli.metrics_server.port)).await?;
    tracing::info!(host = %cli.metrics_server.host, port = cli.metrics_server.port, "metrics endpoint listening");
    tokio::spawn(async move {
        if let Err(err) = axum::serve(metrics_listener, exporter::router(metrics)).await {
            tracing::error!(error = %err, "metrics server exited");
        }
    });

    harness.add_child(connector).await;
    harness.run().await?;

    Ok(())
}
