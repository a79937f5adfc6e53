//! Transport embedding (spec.md §6): the connector can bind its own TCP or
//! Unix-socket listener, or hand back an `axum::Router` for a host
//! application to mount alongside its own routes.

use crate::dispatch::Dispatcher;
use jrs_core::rpc;
use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::post;
use axum::Router;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;

/// Shared state behind the JSON-RPC HTTP handler.
pub struct ConnectorState {
    pub routes: HashMap<String, Dispatcher>,
}

async fn handle_rpc(State(state): State<Arc<ConnectorState>>, Json(body): Json<Value>) -> impl IntoResponse {
    let id = body.get("id").cloned().unwrap_or(Value::Null);

    let Some(method) = body.get("method").and_then(Value::as_str) else {
        return Json(rpc::error(id, 400, "missing or non-string 'method'"));
    };
    let params = body.get("params").cloned().unwrap_or_else(|| serde_json::json!({}));

    let Some(dispatcher) = state.routes.get(method) else {
        return Json(rpc::error(id, 400, format!("no route registered for method '{method}'")));
    };

    match dispatcher.dispatch(params).await {
        Ok(result) => Json(rpc::success(id, result)),
        Err(err) => Json(rpc::error(id, err.code().unwrap_or(500), err.message().unwrap_or("error").to_string())),
    }
}

/// Build the `axum::Router` serving the JSON-RPC endpoint at `path`,
/// bounding request bodies to `body_limit_bytes`, and optionally serving
/// `static_dir` for any request the JSON-RPC route doesn't claim.
pub fn router(state: Arc<ConnectorState>, path: &str, body_limit_bytes: usize, static_dir: Option<&Path>) -> Router {
    let mut router = Router::new().route(path, post(handle_rpc));
    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }
    router.layer(RequestBodyLimitLayer::new(body_limit_bytes)).with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::EmptyResponseCorrection;
    use crate::types::CompiledRoute;
    use axum::body::Body;
    use axum::http::Request;
    use jrs_observability::get_global_registry;
    use tower::ServiceExt;

    fn echo_state() -> Arc<ConnectorState> {
        let handler: crate::types::HandlerFn = Arc::new(|data| Box::pin(async move { Ok(data) }));
        let mut routes = HashMap::new();
        routes.insert(
            "echo".to_string(),
            Dispatcher::new("echo", CompiledRoute::Bare(handler), EmptyResponseCorrection::default(), get_global_registry()),
        );
        Arc::new(ConnectorState { routes })
    }

    #[tokio::test]
    async fn dispatches_known_method_to_success_envelope() {
        let app = router(echo_state(), "/rpc", 1_048_576, None);
        let body = serde_json::json!({"jsonrpc": "2.0", "method": "echo", "params": {"x": 1}, "id": 1});
        let response = app
            .oneshot(
                Request::post("/rpc")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).expect("serializes")))
                    .expect("request builds"),
            )
            .await
            .expect("request succeeds");
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn unknown_method_yields_rpc_error() {
        let app = router(echo_state(), "/rpc", 1_048_576, None);
        let body = serde_json::json!({"jsonrpc": "2.0", "method": "nope", "params": {}, "id": 1});
        let response = app
            .oneshot(
                Request::post("/rpc")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).expect("serializes")))
                    .expect("request builds"),
            )
            .await
            .expect("request succeeds");
        assert_eq!(response.status(), 200);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("reads body");
        let value: Value = serde_json::from_slice(&bytes).expect("valid json");
        assert_eq!(value["error"]["code"], 400);
    }
}
