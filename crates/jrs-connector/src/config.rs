//! Connector configuration (spec.md §6): how the connector is reached —
//! a standalone TCP or Unix-socket listener, or mounted as middleware in a
//! host `axum` app — and the handful of knobs spec.md §9 leaves open.

use clap::Args;
use jrs_foundation::{Error, Result};
use jrs_observability::{BucketUnit, MetricsConfig};
use std::path::PathBuf;

/// Where the connector listens.
#[derive(Debug, Clone)]
pub enum Transport {
    /// Bind its own TCP listener.
    Standalone { host: String, port: u16 },
    /// Bind its own Unix domain socket listener. Wins over TCP if set,
    /// per spec.md §6 ("mutually exclusive; socket wins if set").
    UnixSocket(PathBuf),
    /// Don't bind anything; the host application mounts
    /// [`crate::Connector::router`] into its own `axum` app.
    Middleware,
}

/// Parse a human-readable size like `20mb` or `512kb` into bytes. Bare
/// digits are interpreted as bytes.
fn parse_body_size(raw: &str) -> Result<usize> {
    let raw = raw.trim().to_lowercase();
    let (digits, multiplier) = if let Some(prefix) = raw.strip_suffix("gb") {
        (prefix, 1024 * 1024 * 1024)
    } else if let Some(prefix) = raw.strip_suffix("mb") {
        (prefix, 1024 * 1024)
    } else if let Some(prefix) = raw.strip_suffix("kb") {
        (prefix, 1024)
    } else if let Some(prefix) = raw.strip_suffix('b') {
        (prefix, 1)
    } else {
        (raw.as_str(), 1)
    };
    let value: usize = digits.trim().parse().map_err(|_| Error::config(format!("invalid body size limit: {raw}")))?;
    Ok(value * multiplier)
}

/// Connector configuration, sourced from CLI flags or environment
/// variables, matching spec.md §6's table exactly (`JRS_CONNECTOR_*` for
/// the listener, `JRS_SERVER_*` for the HTTP surface).
#[derive(Debug, Clone, Args)]
pub struct ConnectorConfig {
    /// This service's own alias, reported by the injected `_ping` route.
    #[arg(long, env = "JRS_CONNECTOR_ALIAS_NAME", default_value = "anonymous")]
    pub alias: String,

    /// Host to bind when running as a standalone server.
    #[arg(long, env = "JRS_CONNECTOR_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind when running as a standalone server.
    #[arg(long, env = "JRS_CONNECTOR_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Bind a Unix domain socket at this path instead of TCP. Wins over
    /// `host`/`port` when set.
    #[arg(long, env = "JRS_CONNECTOR_SOCKET")]
    pub socket: Option<PathBuf>,

    /// Run without binding any listener; the host app mounts the router.
    #[arg(long)]
    pub middleware_only: bool,

    /// A directory of static files to serve alongside the JSON-RPC
    /// endpoint, standing in for the source's combined static+API server.
    #[arg(long, env = "JRS_SERVER_STATIC_DIR")]
    pub static_dir: Option<PathBuf>,

    /// HTTP path the JSON-RPC endpoint is served at.
    #[arg(long, env = "JRS_SERVER_CONNECTOR_PATH", default_value = "/")]
    pub connector_path: String,

    /// Maximum accepted request body size, as a human-readable size
    /// (`20mb`, `512kb`, or a bare byte count).
    #[arg(long, env = "JRS_SERVER_BODY_SIZE_LIMIT", default_value = "20mb")]
    pub body_size_limit: String,

    /// Whether an empty handler response is replaced with a fixed default.
    #[arg(long, default_value_t = true)]
    pub empty_response_correction: bool,

    /// Unit the latency histogram buckets are interpreted in (spec.md §9
    /// leaves this ambiguous; see [`jrs_observability::BucketUnit`]).
    #[arg(long, value_enum, default_value_t = BucketUnit::Seconds)]
    pub metrics_bucket_unit: BucketUnit,

    /// Whether a `_ping` alias mismatch on client registration fails the
    /// registration outright, instead of only logging (spec.md §9).
    #[arg(long, default_value_t = false)]
    pub ping_strict: bool,

    /// Whether outbound calls through the client registry record
    /// `call_api_*` metrics.
    #[arg(long, env = "JRS_EXTERNAL_CALLS_METRICS", default_value_t = false)]
    pub external_calls_metrics: bool,

    /// Whether every recorded metric is also mirrored to the logger.
    #[arg(long, env = "JRS_METRICS_TO_LOG", default_value_t = false)]
    pub metrics_to_log: bool,
}

impl ConnectorConfig {
    /// Resolve the listener transport this config describes.
    pub fn transport(&self) -> Transport {
        if self.middleware_only {
            Transport::Middleware
        } else if let Some(path) = &self.socket {
            Transport::UnixSocket(path.clone())
        } else {
            Transport::Standalone { host: self.host.clone(), port: self.port }
        }
    }

    pub fn body_limit_bytes(&self) -> Result<usize> {
        parse_body_size(&self.body_size_limit)
    }

    pub fn ping_mismatch_policy(&self) -> crate::clients::PingMismatchPolicy {
        if self.ping_strict {
            crate::clients::PingMismatchPolicy::FailRegistration
        } else {
            crate::clients::PingMismatchPolicy::LogOnly
        }
    }

    /// The metrics registry configuration this connector's flags describe.
    pub fn metrics_config(&self) -> MetricsConfig {
        MetricsConfig { bucket_unit: self.metrics_bucket_unit, metrics_to_log: self.metrics_to_log }
    }
}

/// Metrics endpoint listener configuration (spec.md §6: `GET /metrics` on
/// `JRS_METRICS_HOST:JRS_METRICS_PORT`).
#[derive(Debug, Clone, Args)]
pub struct MetricsServerConfig {
    #[arg(long, env = "JRS_METRICS_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "JRS_METRICS_PORT", default_value_t = 9777)]
    pub port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        config: ConnectorConfig,
    }

    #[test]
    fn defaults_resolve_to_standalone_transport() {
        let harness = Harness::parse_from(["bin", "--alias", "billing"]);
        assert!(matches!(harness.config.transport(), Transport::Standalone { .. }));
        assert_eq!(harness.config.port, 3000);
    }

    #[test]
    fn socket_takes_priority_over_standalone() {
        let harness = Harness::parse_from(["bin", "--alias", "billing", "--socket", "/tmp/jrs.sock"]);
        assert!(matches!(harness.config.transport(), Transport::UnixSocket(_)));
    }

    #[test]
    fn middleware_only_wins_over_socket() {
        let harness =
            Harness::parse_from(["bin", "--alias", "billing", "--socket", "/tmp/jrs.sock", "--middleware-only"]);
        assert!(matches!(harness.config.transport(), Transport::Middleware));
    }

    #[test]
    fn body_size_parses_megabytes() {
        let harness = Harness::parse_from(["bin", "--alias", "billing"]);
        assert_eq!(harness.config.body_limit_bytes().expect("parses"), 20 * 1024 * 1024);
    }

    #[test]
    fn body_size_parses_bare_bytes() {
        assert_eq!(parse_body_size("1024").expect("parses"), 1024);
    }

    #[test]
    fn body_size_rejects_garbage() {
        assert!(parse_body_size("not-a-size").is_err());
    }

    #[test]
    fn alias_defaults_to_anonymous() {
        let harness = Harness::parse_from(["bin"]);
        assert_eq!(harness.config.alias, "anonymous");
    }

    #[test]
    fn external_calls_metrics_and_metrics_to_log_default_off() {
        let harness = Harness::parse_from(["bin"]);
        assert!(!harness.config.external_calls_metrics);
        assert!(!harness.config.metrics_to_log);
    }
}
