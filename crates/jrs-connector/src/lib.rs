//! The RPC connector: compiles a route table, serves it over JSON-RPC
//! (standalone or embedded), and maintains the outbound client registry
//! used to call peer services.

pub mod clients;
pub mod compile;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod ping;
pub mod schema;
pub mod transport;
pub mod types;

use async_trait::async_trait;
use clients::{ClientConfig, ClientRegistry, PingMismatchPolicy};
use compile::compile_routes;
use config::{ConnectorConfig, Transport};
use dispatch::{Dispatcher, EmptyResponseCorrection};
use jrs_core::lifecycle::{DoneFlag, Service};
use jrs_foundation::{Error, Result};
use jrs_observability::MetricsRegistry;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
#[cfg(unix)]
use tokio::net::UnixListener;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use types::{CompiledRoute, PayloadHookFn, RouteConfig, ServerDefaults};

/// The compiled, running connector. Implements [`Service`] so it can be
/// nested under a [`jrs_core::lifecycle::ServiceHarness`] alongside the
/// rest of an application's components.
pub struct Connector {
    config: ConnectorConfig,
    raw_routes: Mutex<Option<HashMap<String, RouteConfig>>>,
    defaults: ServerDefaults,
    state: RwLock<Option<Arc<transport::ConnectorState>>>,
    clients: ClientRegistry,
    metrics: &'static MetricsRegistry,
    server_task: Mutex<Option<JoinHandle<()>>>,
    done: DoneFlag,
    payload_hook: Option<PayloadHookFn>,
}

impl Connector {
    /// Build a connector. Routes are compiled and any listener bound when
    /// [`Service::start`] runs, not here.
    pub fn new(
        config: ConnectorConfig,
        routes: HashMap<String, RouteConfig>,
        defaults: ServerDefaults,
        metrics: &'static MetricsRegistry,
    ) -> Self {
        let clients = ClientRegistry::new(config.alias.clone(), config.external_calls_metrics, metrics);
        Self {
            config,
            raw_routes: Mutex::new(Some(routes)),
            defaults,
            state: RwLock::new(None),
            clients,
            metrics,
            server_task: Mutex::new(None),
            done: DoneFlag::new(),
            payload_hook: None,
        }
    }

    /// Register the user-supplied payload hook (spec.md §4.2 step 2), run
    /// before every dispatch across every route. Must be called before
    /// [`Service::start`].
    pub fn with_payload_hook(mut self, hook: PayloadHookFn) -> Self {
        self.payload_hook = Some(hook);
        self
    }

    /// Register an outbound service and, if it names an expected alias,
    /// verify it via `_ping`.
    pub async fn add_service(&self, alias: &str, config: ClientConfig) -> Result<()> {
        self.clients
            .add_service(alias, config, self.config.ping_mismatch_policy())
            .await
            .map_err(|e| Error::transport(e.to_string()))
    }

    /// Call a downstream service by alias and method.
    pub async fn call_service(&self, service: &str, method: &str, params: Value) -> std::result::Result<Value, clients::CallError> {
        self.clients.call_service(service, method, params).await
    }

    /// The `axum::Router` serving the JSON-RPC endpoint, for embedding in
    /// a host application. Only meaningful once [`Service::start`] has run.
    pub async fn router(&self) -> Result<axum::Router> {
        let state = self.state.read().await.clone().ok_or_else(|| Error::lifecycle("connector not started"))?;
        Ok(transport::router(
            state,
            &self.config.connector_path,
            self.config.body_limit_bytes()?,
            self.config.static_dir.as_deref(),
        ))
    }

    fn build_dispatchers(&self, compiled: HashMap<String, CompiledRoute>) -> HashMap<String, Dispatcher> {
        let correction = EmptyResponseCorrection {
            enabled: self.config.empty_response_correction,
            ..EmptyResponseCorrection::default()
        };
        compiled
            .into_iter()
            .map(|(name, route)| {
                let mut dispatcher = Dispatcher::new(name.clone(), route, correction.clone(), self.metrics);
                if let Some(hook) = &self.payload_hook {
                    dispatcher = dispatcher.with_payload_hook(hook.clone());
                }
                (name, dispatcher)
            })
            .collect()
    }
}

#[async_trait]
impl Service for Connector {
    async fn start(&self) -> Result<()> {
        let mut routes = self.raw_routes.lock().await.take().ok_or_else(|| Error::lifecycle("connector already started"))?;
        routes.insert("_ping".to_string(), RouteConfig::Bare(match ping::route(&self.config.alias) {
            CompiledRoute::Bare(handler) => handler,
            CompiledRoute::Full { .. } => unreachable!("ping::route always returns Bare"),
        }));

        let compiled = compile_routes(routes, &self.defaults)?;
        let dispatchers = self.build_dispatchers(compiled);
        let state = Arc::new(transport::ConnectorState { routes: dispatchers });
        *self.state.write().await = Some(state.clone());

        let router = transport::router(
            state,
            &self.config.connector_path,
            self.config.body_limit_bytes()?,
            self.config.static_dir.as_deref(),
        );

        let task = match self.config.transport() {
            Transport::Standalone { host, port } => {
                let listener = TcpListener::bind((host.as_str(), port)).await?;
                tracing::info!(%host, port, "connector listening");
                Some(tokio::spawn(async move {
                    if let Err(err) = axum::serve(listener, router).await {
                        tracing::error!(error = %err, "connector server exited");
                    }
                }))
            }
            #[cfg(unix)]
            Transport::UnixSocket(path) => {
                let _ = std::fs::remove_file(&path);
                let listener = UnixListener::bind(&path)?;
                tracing::info!(path = %path.display(), "connector listening on unix socket");
                Some(tokio::spawn(async move {
                    if let Err(err) = axum::serve(listener, router).await {
                        tracing::error!(error = %err, "connector server exited");
                    }
                }))
            }
            #[cfg(not(unix))]
            Transport::UnixSocket(_) => {
                return Err(Error::config("unix socket transport is only available on unix platforms"));
            }
            Transport::Middleware => None,
        };

        *self.server_task.lock().await = task;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if let Some(task) = self.server_task.lock().await.take() {
            task.abort();
        }
        self.done.mark();
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.done.is_done()
    }

    fn mark_done(&self) {
        self.done.mark();
    }
}

/// A builder-friendly way to assemble a connector's route table before
/// handing it to [`Connector::new`].
#[derive(Default)]
pub struct RouteTableBuilder {
    routes: HashMap<String, RouteConfig>,
    defaults: ServerDefaults,
}

impl RouteTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, name: impl Into<String>, route: RouteConfig) -> Self {
        self.routes.insert(name.into(), route);
        self
    }

    pub fn parent(mut self, alias: impl Into<String>, parent: types::ParentConfig) -> Self {
        self.defaults.parents.insert(alias.into(), parent);
        self
    }

    pub fn validation_type(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.defaults.validation_types.insert(name.into(), schema);
        self
    }

    pub fn build(self) -> (HashMap<String, RouteConfig>, ServerDefaults) {
        (self.routes, self.defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use jrs_observability::get_global_registry;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        config: ConnectorConfig,
    }

    fn test_config(port: u16) -> ConnectorConfig {
        Harness::parse_from(["bin", "--alias", "test-svc", "--port", &port.to_string()]).config
    }

    #[test]
    fn parses_with_all_defaults() {
        let config = Harness::parse_from(["bin", "--alias", "test-svc"]).config;
        assert_eq!(config.connector_path, "/");
    }

    #[tokio::test]
    async fn standalone_connector_serves_registered_routes() {
        let handler: types::HandlerFn = Arc::new(|data| Box::pin(async move { Ok(data) }));
        let (routes, defaults) = RouteTableBuilder::new().route("echo", RouteConfig::Bare(handler)).build();
        let connector = Connector::new(test_config(0), routes, defaults, get_global_registry());
        connector.start().await.expect("starts");
        assert!(connector.state.read().await.is_some());
        connector.stop().await.expect("stops");
        assert!(connector.is_done());
    }

    #[tokio::test]
    async fn middleware_mode_never_binds_a_listener() {
        let mut config = test_config(0);
        config.middleware_only = true;
        let (routes, defaults) = RouteTableBuilder::new().build();
        let connector = Connector::new(config, routes, defaults, get_global_registry());
        connector.start().await.expect("starts");
        assert!(connector.server_task.lock().await.is_none());
        let _router = connector.router().await.expect("router available after start");
    }

    #[tokio::test]
    async fn ping_route_is_auto_registered() {
        let (routes, defaults) = RouteTableBuilder::new().build();
        let mut config = test_config(0);
        config.middleware_only = true;
        let connector = Connector::new(config, routes, defaults, get_global_registry());
        connector.start().await.expect("starts");
        let state = connector.state.read().await.clone().expect("started");
        let dispatcher = state.routes.get("_ping").expect("ping registered");
        let response = dispatcher.dispatch(json!({})).await.expect("ok");
        assert_eq!(response["alias"], "test-svc");
    }
}
