//! The dispatch pipeline (spec.md §4.2): validate, run `before` stages, run
//! the handler, run `after` stages, then apply empty-response correction.

use crate::errors::{classify, DispatchError, HandlerError};
use crate::types::{CompiledRoute, PayloadHookFn};
use jrs_foundation::codes;
use jrs_observability::MetricsRegistry;
use serde_json::{json, Value};
use std::time::Instant;

/// Whether a value counts as "empty" for the purposes of empty-response
/// correction: JSON's closest equivalents to JavaScript falsiness, plus the
/// specific sentinel string the source uses for "nothing to report".
fn is_empty_response(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "Ok",
        _ => false,
    }
}

/// Replaces an empty handler result with a fixed default so callers never
/// have to special-case "no news" responses.
#[derive(Clone)]
pub struct EmptyResponseCorrection {
    pub enabled: bool,
    pub default: Value,
}

impl Default for EmptyResponseCorrection {
    fn default() -> Self {
        Self { enabled: true, default: json!({"status": "OK"}) }
    }
}

/// A route ready to be invoked, wrapping a [`CompiledRoute`] with the
/// metrics label it reports under and the empty-response policy to apply.
pub struct Dispatcher {
    name: String,
    route: CompiledRoute,
    empty_response_correction: EmptyResponseCorrection,
    metrics: &'static MetricsRegistry,
    payload_hook: Option<PayloadHookFn>,
}

impl Dispatcher {
    pub fn new(
        name: impl Into<String>,
        route: CompiledRoute,
        empty_response_correction: EmptyResponseCorrection,
        metrics: &'static MetricsRegistry,
    ) -> Self {
        Self { name: name.into(), route, empty_response_correction, metrics, payload_hook: None }
    }

    /// Attach the user-registered payload hook (spec.md §4.2 step 2), run
    /// before every dispatch through this route.
    pub fn with_payload_hook(mut self, hook: PayloadHookFn) -> Self {
        self.payload_hook = Some(hook);
        self
    }

    /// Run the route end to end, recording handler latency and
    /// success/failure regardless of outcome.
    pub async fn dispatch(&self, params: Value) -> Result<Value, DispatchError> {
        let start = Instant::now();
        let result = self.dispatch_inner(params).await;
        self.metrics.record_handle(&self.name, start.elapsed(), result.is_err());
        result
    }

    async fn dispatch_inner(&self, params: Value) -> Result<Value, DispatchError> {
        if let Some(hook) = &self.payload_hook {
            (hook)().await.map_err(classify)?;
        }

        match &self.route {
            CompiledRoute::Bare(handler) => (handler)(params).await.map_err(classify),
            CompiledRoute::Full { handler, before, after, validator, .. } => {
                if let Some(validator) = validator {
                    let messages: Vec<String> =
                        validator.iter_errors(&params).map(|e| e.to_string()).collect();
                    if !messages.is_empty() {
                        return Err(DispatchError::new(codes::VALIDATION_ERROR, messages.join("; ")));
                    }
                }

                let mut current = params;
                for stage in before {
                    current = self.run_stage(stage, current).await?;
                }

                current = (handler)(current).await.map_err(classify)?;

                for stage in after {
                    current = self.run_stage(stage, current).await?;
                }

                if self.empty_response_correction.enabled && is_empty_response(&current) {
                    current = self.empty_response_correction.default.clone();
                }

                Ok(current)
            }
        }
    }

    async fn run_stage(
        &self,
        stage: &crate::types::PipelineStage,
        current: Value,
    ) -> Result<Value, DispatchError> {
        let replacement = (stage.handler)(stage.scope.clone(), current.clone()).await.map_err(classify)?;
        Ok(replacement.unwrap_or(current))
    }
}
