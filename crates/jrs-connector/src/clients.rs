//! The outbound client registry (spec.md §4.3): lazily-built HTTP stubs for
//! downstream services, `_ping` identity verification on registration, and
//! the response classification `callService` applies to whatever a peer
//! sends back.

use crate::errors::DispatchError;
use jrs_core::rpc::{self, RpcOutcome};
use jrs_foundation::codes;
use jrs_observability::MetricsRegistry;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use url::Url;
use uuid::Uuid;

/// Configuration for one registered service.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ClientConfig {
    /// A bare base URL; no identity is expected back from `_ping`.
    Url(String),
    /// A base URL, optionally paired with the alias the peer must report
    /// back from `_ping`.
    #[serde(rename_all = "camelCase")]
    Detailed { connect: String, origin_remote_alias: Option<String> },
}

impl ClientConfig {
    fn url(&self) -> &str {
        match self {
            Self::Url(url) => url,
            Self::Detailed { connect, .. } => connect,
        }
    }

    fn expected_alias(&self) -> Option<&str> {
        match self {
            Self::Url(_) => None,
            Self::Detailed { origin_remote_alias, .. } => origin_remote_alias.as_deref(),
        }
    }
}

/// What to do when a registered service's `_ping` reply doesn't match the
/// alias it was registered under. spec.md §9 leaves this open; the source
/// only logs, so that's the default here too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PingMismatchPolicy {
    #[default]
    LogOnly,
    FailRegistration,
}

struct ClientStub {
    http: reqwest::Client,
    target: Url,
}

/// Errors a call through the registry can fail with.
#[derive(Debug, Clone)]
pub enum CallError {
    UnknownService(String),
    /// `call_service` was invoked with non-object params: the reserved
    /// `{code: 500, message: "Critical internal error"}` shape (spec.md §6).
    BadParams(DispatchError),
    Transport(String),
    /// A remote error, forwarded as whatever shape the peer sent.
    Remote(Value),
}

impl CallError {
    /// The JSON-RPC error body this failure should surface to a caller.
    pub fn body(&self) -> Value {
        match self {
            Self::UnknownService(alias) => json!({"message": format!("unknown service '{alias}'")}),
            Self::BadParams(e) => e.body().clone(),
            Self::Transport(msg) => json!({"message": msg}),
            Self::Remote(body) => body.clone(),
        }
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownService(alias) => write!(f, "unknown service '{alias}'"),
            Self::BadParams(e) => write!(f, "{e}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Remote(body) => write!(f, "remote error: {body}"),
        }
    }
}

impl std::error::Error for CallError {}

/// The registry of outbound service clients.
pub struct ClientRegistry {
    local_alias: String,
    clients: RwLock<HashMap<String, Arc<ClientStub>>>,
    metrics: &'static MetricsRegistry,
    /// Whether `sendTo` records `call_api_*` metrics, per
    /// `JRS_EXTERNAL_CALLS_METRICS` (spec.md §4.3, §6).
    external_calls_metrics: bool,
}

impl ClientRegistry {
    pub fn new(local_alias: impl Into<String>, external_calls_metrics: bool, metrics: &'static MetricsRegistry) -> Self {
        Self { local_alias: local_alias.into(), clients: RwLock::new(HashMap::new()), metrics, external_calls_metrics }
    }

    /// Register a service, building its HTTP stub and, if the config names
    /// an expected alias, issuing a non-fatal-by-default `_ping` to verify
    /// identity.
    pub async fn add_service(
        &self,
        alias: &str,
        config: ClientConfig,
        mismatch_policy: PingMismatchPolicy,
    ) -> Result<(), CallError> {
        let target = Url::parse(config.url()).map_err(|e| CallError::Transport(e.to_string()))?;
        let http = reqwest::Client::new();
        let stub = Arc::new(ClientStub { http, target });

        self.clients.write().await.insert(alias.to_string(), stub);

        if let Some(expected) = config.expected_alias() {
            self.verify_identity(alias, expected, mismatch_policy).await?;
        }

        Ok(())
    }

    async fn verify_identity(
        &self,
        alias: &str,
        expected_alias: &str,
        mismatch_policy: PingMismatchPolicy,
    ) -> Result<(), CallError> {
        match self.send_to(alias, "_ping", json!({})).await {
            Ok(response) => match rpc::decode_response(&response) {
                RpcOutcome::Result(result) => {
                    let reported = result.get("alias").and_then(Value::as_str);
                    if reported != Some(expected_alias) {
                        tracing::warn!(alias, expected_alias, reported, "_ping alias mismatch");
                        if mismatch_policy == PingMismatchPolicy::FailRegistration {
                            return Err(CallError::Remote(json!({"reported": reported})));
                        }
                    }
                    Ok(())
                }
                _ => {
                    tracing::warn!(alias, "_ping returned a non-result response");
                    Ok(())
                }
            },
            Err(e) => {
                tracing::warn!(alias, error = %e, "_ping failed");
                Ok(())
            }
        }
    }

    /// Send one JSON-RPC request to `service` and return its raw response
    /// body, optionally recording call metrics (spec.md §4.3).
    pub async fn send_to(&self, service: &str, method: &str, data: Value) -> Result<Value, CallError> {
        let stub = {
            let clients = self.clients.read().await;
            clients.get(service).cloned().ok_or_else(|| CallError::UnknownService(service.to_string()))?
        };

        let body = rpc::request(method, data, json!(Uuid::new_v4().to_string()));
        let start = Instant::now();

        let outcome = stub.http.post(stub.target.clone()).json(&body).send().await;
        let response = match outcome {
            Ok(resp) => resp.json::<Value>().await.map_err(|e| CallError::Transport(e.to_string())),
            Err(e) => Err(CallError::Transport(e.to_string())),
        };

        if self.external_calls_metrics {
            let is_error = match &response {
                Ok(value) => value.get("error").is_some(),
                Err(_) => true,
            };
            self.metrics.record_call(service, method, start.elapsed(), is_error);
        }

        response
    }

    /// Call a downstream service and classify its response per spec.md
    /// §4.3: a `result` is returned as-is; an `error` is logged (at a
    /// level depending on whether its code looks like a framework-internal
    /// code or an application one) and forwarded to the caller unchanged.
    pub async fn call_service(&self, service: &str, method: &str, params: Value) -> Result<Value, CallError> {
        if !params.is_object() {
            return Err(CallError::BadParams(DispatchError::new(
                codes::CRITICAL_INTERNAL_ERROR,
                "Critical internal error",
            )));
        }

        let response = self.send_to(service, method, params).await?;

        match rpc::decode_response(&response) {
            RpcOutcome::Result(result) => Ok(result),
            RpcOutcome::WellFormedError { code, message } => {
                if code < 0.0 {
                    tracing::error!(service, method, code, message, "RPC-error from downstream service");
                } else {
                    tracing::warn!(service, method, code, message, "application error from downstream service");
                }
                Err(CallError::Remote(json!({"code": code, "message": message})))
            }
            RpcOutcome::NonObjectError(body) => {
                tracing::error!(service, method, body = %body, "non-standard plain error from downstream service");
                Err(CallError::Remote(body))
            }
            RpcOutcome::NonFiniteCodeError(body) => {
                tracing::error!(service, method, body = %body, "non-standard hinted error from downstream service");
                Err(CallError::Remote(body))
            }
            RpcOutcome::Malformed => {
                tracing::error!(service, method, "malformed response: neither result nor error present");
                Err(CallError::Remote(json!({})))
            }
        }
    }

    pub fn local_alias(&self) -> &str {
        &self.local_alias
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jrs_observability::get_global_registry;

    #[test]
    fn config_deserializes_bare_url_or_connect_plus_optional_alias() {
        let bare: ClientConfig = serde_json::from_value(json!("http://localhost:8080")).expect("parses");
        assert_eq!(bare.url(), "http://localhost:8080");
        assert!(bare.expected_alias().is_none());

        let detailed_no_alias: ClientConfig =
            serde_json::from_value(json!({"connect": "http://localhost:8081"})).expect("parses");
        assert_eq!(detailed_no_alias.url(), "http://localhost:8081");
        assert!(detailed_no_alias.expected_alias().is_none());

        let detailed_with_alias: ClientConfig = serde_json::from_value(
            json!({"connect": "http://localhost:8082", "originRemoteAlias": "billing"}),
        )
        .expect("parses");
        assert_eq!(detailed_with_alias.expected_alias(), Some("billing"));
    }

    #[tokio::test]
    async fn unregistered_service_is_an_error() {
        let registry = ClientRegistry::new("self", false, get_global_registry());
        let err = registry.call_service("unknown", "m", json!({})).await.unwrap_err();
        assert!(matches!(err, CallError::UnknownService(_)));
    }

    #[tokio::test]
    async fn non_object_params_yield_the_reserved_critical_internal_error_shape() {
        let registry = ClientRegistry::new("self", false, get_global_registry());
        registry
            .add_service("svc", ClientConfig::Url("http://127.0.0.1:1".to_string()), PingMismatchPolicy::LogOnly)
            .await
            .expect("registers even though nothing is listening");
        let err = registry.call_service("svc", "m", json!([1, 2])).await.unwrap_err();
        assert!(matches!(err, CallError::BadParams(_)));
        assert_eq!(err.body(), json!({"code": 500, "message": "Critical internal error"}));
    }
}
