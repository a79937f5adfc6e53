//! The route data model (spec.md §3, §4.1).

use crate::errors::HandlerError;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A route handler: takes the (already-validated) request data, returns the
/// response payload or a classifiable error.
pub type HandlerFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, HandlerError>> + Send + Sync>;

/// A user-registered payload hook (spec.md §4.2 step 2): runs before every
/// dispatch, bare or full, with no arguments. Errors propagate as handler
/// errors.
pub type PayloadHookFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

/// A before/after pipeline stage handler. `None` means "pass the data
/// through unchanged"; this is the sentinel that lets a stage distinguish
/// "I have nothing to add" from "the result actually is empty/null", which
/// the original handler's return value can never do (it always replaces).
pub type StageFn =
    Arc<dyn Fn(Option<Value>, Value) -> BoxFuture<'static, Result<Option<Value>, HandlerError>> + Send + Sync>;

/// One stage in a before/after pipeline: a handler plus an opaque scope
/// value threaded through as the stage's first argument.
#[derive(Clone)]
pub struct PipelineStage {
    pub handler: StageFn,
    pub scope: Option<Value>,
}

impl PipelineStage {
    pub fn new(handler: StageFn) -> Self {
        Self { handler, scope: None }
    }

    pub fn with_scope(handler: StageFn, scope: Value) -> Self {
        Self { handler, scope: Some(scope) }
    }
}

/// A route as supplied to the compiler, before inheritance and custom-type
/// resolution are applied.
pub enum RouteConfig {
    /// A bare callable: no validation, no before/after pipeline, no
    /// inheritance. Bypasses the compiler entirely.
    Bare(HandlerFn),
    /// A fully-specified route.
    Full(RouteSpec),
}

/// A fully-specified route definition.
pub struct RouteSpec {
    pub handler: HandlerFn,
    pub scope: Option<Value>,
    pub validation: Option<Value>,
    pub before: Vec<PipelineStage>,
    pub after: Vec<PipelineStage>,
    pub inherits: Vec<String>,
}

impl RouteSpec {
    pub fn new(handler: HandlerFn) -> Self {
        Self { handler, scope: None, validation: None, before: Vec::new(), after: Vec::new(), inherits: Vec::new() }
    }
}

/// A named parent configuration routes can `inherits` from.
#[derive(Clone, Default)]
pub struct ParentConfig {
    pub before: Vec<PipelineStage>,
    pub after: Vec<PipelineStage>,
    pub validation: Option<Value>,
}

/// Server-wide route defaults: named parents and custom validation types.
#[derive(Clone, Default)]
pub struct ServerDefaults {
    pub parents: HashMap<String, ParentConfig>,
    pub validation_types: HashMap<String, Value>,
}

/// A compiled, ready-to-dispatch route.
pub enum CompiledRoute {
    Bare(HandlerFn),
    Full {
        handler: HandlerFn,
        scope: Option<Value>,
        before: Vec<PipelineStage>,
        after: Vec<PipelineStage>,
        validator: Option<Arc<jsonschema::Validator>>,
    },
}

impl std::fmt::Debug for CompiledRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bare(_) => f.debug_tuple("Bare").field(&"<handler>").finish(),
            Self::Full { scope, before, after, validator, .. } => f
                .debug_struct("Full")
                .field("handler", &"<handler>")
                .field("scope", scope)
                .field("before", &before.len())
                .field("after", &after.len())
                .field("validator", validator)
                .finish(),
        }
    }
}
