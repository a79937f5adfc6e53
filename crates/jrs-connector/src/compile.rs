//! The route compiler (spec.md §4.1): resolves `inherits` chains, merges
//! validation schemas, applies custom-type resolution, and compiles the
//! final schema into a [`jsonschema::Validator`].

use crate::schema::{apply_custom_types, merge, resolve_custom_types};
use crate::types::{CompiledRoute, ParentConfig, PipelineStage, RouteConfig, RouteSpec, ServerDefaults};
use jrs_foundation::{Error, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

fn strict_object_default() -> Value {
    json!({"type": "object", "additionalProperties": false})
}

struct Accumulated {
    before: Vec<PipelineStage>,
    after: Vec<PipelineStage>,
    validation: Option<Value>,
}

fn accumulate_parents(inherits: &[String], defaults: &ServerDefaults) -> Result<Accumulated> {
    let mut before = Vec::new();
    let mut after = Vec::new();
    let mut validation: Option<Value> = None;

    for alias in inherits {
        let parent: &ParentConfig = defaults
            .parents
            .get(alias)
            .ok_or_else(|| Error::config(format!("route inherits unknown parent '{alias}'")))?;

        before.extend(parent.before.iter().cloned());
        after.extend(parent.after.iter().cloned());

        validation = match (&parent.validation, validation) {
            (Some(parent_validation), Some(acc)) => Some(merge(parent_validation, &acc)),
            (Some(parent_validation), None) => Some(parent_validation.clone()),
            (None, acc) => acc,
        };
    }

    Ok(Accumulated { before, after, validation })
}

/// Compile one route spec into a [`CompiledRoute::Full`].
fn compile_one(spec: RouteSpec, defaults: &ServerDefaults, resolved_types: &HashMap<String, Value>) -> Result<CompiledRoute> {
    let explicit_validation = spec.validation.as_ref().map(|v| merge(v, &strict_object_default()));

    let accumulated = accumulate_parents(&spec.inherits, defaults)?;

    let mut before = accumulated.before;
    before.extend(spec.before);
    let mut after = accumulated.after;
    after.extend(spec.after);

    let final_validation = match (explicit_validation, accumulated.validation) {
        (Some(explicit), Some(inherited)) => Some(merge(&explicit, &inherited)),
        (Some(explicit), None) => Some(explicit),
        (None, Some(inherited)) => Some(inherited),
        (None, None) => None,
    };

    let validator = match final_validation {
        Some(mut schema) => {
            apply_custom_types(&mut schema, resolved_types);
            let compiled = jsonschema::validator_for(&schema)
                .map_err(|e| Error::config(format!("invalid validation schema: {e}")))?;
            Some(Arc::new(compiled))
        }
        None => None,
    };

    Ok(CompiledRoute::Full { handler: spec.handler, scope: spec.scope, before, after, validator })
}

/// Compile every route in `routes` against `defaults`.
pub fn compile_routes(
    routes: HashMap<String, RouteConfig>,
    defaults: &ServerDefaults,
) -> Result<HashMap<String, CompiledRoute>> {
    let resolved_types = resolve_custom_types(&defaults.validation_types);

    routes
        .into_iter()
        .map(|(name, config)| {
            let compiled = match config {
                RouteConfig::Bare(handler) => CompiledRoute::Bare(handler),
                RouteConfig::Full(spec) => compile_one(spec, defaults, &resolved_types)?,
            };
            Ok((name, compiled))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::HandlerError;
    use futures::future::BoxFuture;

    fn echo_handler() -> crate::types::HandlerFn {
        Arc::new(|data: Value| -> BoxFuture<'static, std::result::Result<Value, HandlerError>> {
            Box::pin(async move { Ok(data) })
        })
    }

    #[test]
    fn bare_routes_bypass_compilation() {
        let mut routes = HashMap::new();
        routes.insert("ping".to_string(), RouteConfig::Bare(echo_handler()));
        let compiled = compile_routes(routes, &ServerDefaults::default()).expect("compiles");
        assert!(matches!(compiled["ping"], CompiledRoute::Bare(_)));
    }

    #[test]
    fn full_route_without_validation_compiles() {
        let mut routes = HashMap::new();
        routes.insert("noop".to_string(), RouteConfig::Full(RouteSpec::new(echo_handler())));
        let compiled = compile_routes(routes, &ServerDefaults::default()).expect("compiles");
        match &compiled["noop"] {
            CompiledRoute::Full { validator, .. } => assert!(validator.is_none()),
            _ => panic!("expected full route"),
        }
    }

    #[test]
    fn validation_defaults_to_strict_object() {
        let mut spec = RouteSpec::new(echo_handler());
        spec.validation = Some(json!({"properties": {"name": {"type": "string"}}}));
        let mut routes = HashMap::new();
        routes.insert("greet".to_string(), RouteConfig::Full(spec));
        let compiled = compile_routes(routes, &ServerDefaults::default()).expect("compiles");
        match &compiled["greet"] {
            CompiledRoute::Full { validator, .. } => {
                let validator = validator.as_ref().expect("validator present");
                assert!(validator.is_valid(&json!({"name": "alice"})));
                assert!(!validator.is_valid(&json!({"name": "alice", "extra": true})));
            }
            _ => panic!("expected full route"),
        }
    }

    #[test]
    fn unknown_parent_is_a_config_error() {
        let mut spec = RouteSpec::new(echo_handler());
        spec.inherits.push("nope".to_string());
        let mut routes = HashMap::new();
        routes.insert("r".to_string(), RouteConfig::Full(spec));
        let err = compile_routes(routes, &ServerDefaults::default()).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn inherited_before_stages_precede_the_route_s_own() {
        let stage = PipelineStage::new(Arc::new(|_scope, data| Box::pin(async move { Ok(Some(data)) })));
        let mut parents = HashMap::new();
        parents.insert(
            "base".to_string(),
            ParentConfig { before: vec![stage.clone()], after: Vec::new(), validation: None },
        );
        let defaults = ServerDefaults { parents, validation_types: HashMap::new() };

        let mut spec = RouteSpec::new(echo_handler());
        spec.inherits.push("base".to_string());
        spec.before.push(stage);

        let mut routes = HashMap::new();
        routes.insert("r".to_string(), RouteConfig::Full(spec));
        let compiled = compile_routes(routes, &defaults).expect("compiles");
        match &compiled["r"] {
            CompiledRoute::Full { before, .. } => assert_eq!(before.len(), 2),
            _ => panic!("expected full route"),
        }
    }

    #[test]
    fn route_validation_wins_over_inherited_validation() {
        let mut parents = HashMap::new();
        parents.insert(
            "base".to_string(),
            ParentConfig {
                before: Vec::new(),
                after: Vec::new(),
                validation: Some(json!({"properties": {"name": {"type": "number"}}})),
            },
        );
        let defaults = ServerDefaults { parents, validation_types: HashMap::new() };

        let mut spec = RouteSpec::new(echo_handler());
        spec.inherits.push("base".to_string());
        spec.validation = Some(json!({"properties": {"name": {"type": "string"}}}));

        let mut routes = HashMap::new();
        routes.insert("r".to_string(), RouteConfig::Full(spec));
        let compiled = compile_routes(routes, &defaults).expect("compiles");
        match &compiled["r"] {
            CompiledRoute::Full { validator, .. } => {
                let validator = validator.as_ref().expect("validator present");
                assert!(validator.is_valid(&json!({"name": "alice"})));
            }
            _ => panic!("expected full route"),
        }
    }

    #[test]
    fn custom_types_resolve_inside_route_validation() {
        let mut types = HashMap::new();
        types.insert("email".to_string(), json!({"type": "string", "format": "email"}));
        let defaults = ServerDefaults { parents: HashMap::new(), validation_types: types };

        let mut spec = RouteSpec::new(echo_handler());
        spec.validation = Some(json!({"properties": {"contact": {"type": "email"}}}));

        let mut routes = HashMap::new();
        routes.insert("r".to_string(), RouteConfig::Full(spec));
        let compiled = compile_routes(routes, &defaults).expect("compiles");
        match &compiled["r"] {
            CompiledRoute::Full { validator, .. } => assert!(validator.is_some()),
            _ => panic!("expected full route"),
        }
    }
}
