//! Deep-merge and custom-type resolution for route validation schemas
//! (spec.md §4.1, §4.1.1).
//!
//! This is the non-trivial half of the route compiler: routes can declare
//! validation in terms of server-wide "custom types", which are themselves
//! schema fragments that may reference other custom types. Resolving that
//! down to a schema made only of standard JSON Schema types requires
//! repeated substitution with a bound on how many times a single position
//! may be re-resolved, so that a custom type that references itself (or a
//! cycle between two custom types) terminates instead of looping forever.

use serde_json::{Map, Value};
use std::collections::HashMap;

const STANDARD_TYPES: &[&str] =
    &["object", "array", "string", "number", "integer", "boolean", "null"];

/// Deep-merge `top` over `bottom`: `top`'s values win on conflict, object
/// keys are merged recursively, everything else (arrays, scalars, and any
/// type mismatch) is a full replacement by `top`.
pub fn merge(top: &Value, bottom: &Value) -> Value {
    match (top, bottom) {
        (Value::Object(top_map), Value::Object(bottom_map)) => {
            let mut merged = bottom_map.clone();
            for (key, top_value) in top_map {
                let next = match merged.get(key) {
                    Some(bottom_value) => merge(top_value, bottom_value),
                    None => top_value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        _ => top.clone(),
    }
}

fn normalize_type_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
        _ => Vec::new(),
    }
}

fn type_list_to_value(mut names: Vec<String>) -> Value {
    let mut seen = std::collections::HashSet::new();
    names.retain(|n| seen.insert(n.clone()));
    match names.len() {
        0 => Value::Null,
        1 => Value::String(names.into_iter().next().expect("len checked")),
        _ => Value::Array(names.into_iter().map(Value::String).collect()),
    }
}

fn has_unresolved_custom_name(type_value: &Value, types: &HashMap<String, Value>) -> bool {
    normalize_type_list(type_value)
        .iter()
        .any(|name| !STANDARD_TYPES.contains(&name.as_str()) && types.contains_key(name))
}

/// Substitute any custom-type names found in `node["type"]` with the
/// underlying type(s) from their definitions, merging each definition's
/// sibling keywords into `node` wherever `node` doesn't already define
/// that keyword (node's own values always win; between multiple
/// custom-type contributions, earlier-listed types take priority).
fn substitute_once(node: &mut Map<String, Value>, types: &HashMap<String, Value>) {
    let Some(type_value) = node.get("type").cloned() else { return };
    let names = normalize_type_list(&type_value);

    let mut resolved_names = Vec::new();
    let mut extras: Vec<Map<String, Value>> = Vec::new();

    for name in names {
        match types.get(&name) {
            Some(def) => {
                if let Some(def_type) = def.get("type") {
                    resolved_names.extend(normalize_type_list(def_type));
                }
                if let Some(def_map) = def.as_object() {
                    let mut extra = def_map.clone();
                    extra.remove("type");
                    extras.push(extra);
                }
            }
            None => resolved_names.push(name),
        }
    }

    node.insert("type".to_string(), type_list_to_value(resolved_names));

    for extra in extras {
        for (key, value) in extra {
            match node.get(&key) {
                None => {
                    node.insert(key, value);
                }
                Some(existing) if existing.is_object() && value.is_object() => {
                    let merged = merge(existing, &value);
                    node.insert(key, merged);
                }
                Some(_) => {} // node already defines it with a non-mergeable value; node wins
            }
        }
    }
}

/// Resolve `node["type"]` against `types`, substituting repeatedly until no
/// custom-type name remains or `max_attempts` substitution passes have run.
/// On overflow (a cycle), whatever custom names are left in place are left
/// there — the downstream schema compiler will reject them, which is the
/// intended signal that a custom type is misconfigured.
fn resolve_type_in_node(node: &mut Map<String, Value>, types: &HashMap<String, Value>, max_attempts: usize) {
    if !node.contains_key("type") {
        return;
    }
    let mut attempts = 0;
    while has_unresolved_custom_name(node.get("type").expect("checked above"), types) {
        if attempts >= max_attempts {
            break;
        }
        substitute_once(node, types);
        attempts += 1;
    }
}

fn resolve_schema_node(node: &mut Value, types: &HashMap<String, Value>, max_attempts: usize) {
    let Value::Object(map) = node else { return };
    resolve_type_in_node(map, types, max_attempts);

    if let Some(Value::Object(props)) = map.get_mut("properties") {
        for (_, prop) in props.iter_mut() {
            resolve_schema_node(prop, types, max_attempts);
        }
    }
    if let Some(items) = map.get_mut("items") {
        match items {
            Value::Array(schemas) => {
                for schema in schemas.iter_mut() {
                    resolve_schema_node(schema, types, max_attempts);
                }
            }
            _ => resolve_schema_node(items, types, max_attempts),
        }
    }
    for key in ["oneOf", "anyOf", "allOf"] {
        if let Some(Value::Array(variants)) = map.get_mut(key) {
            for variant in variants.iter_mut() {
                resolve_schema_node(variant, types, max_attempts);
            }
        }
    }
}

/// Resolve every custom type's own `type` field against the rest of the
/// custom types, so the returned map contains only definitions whose
/// `type` field names standard JSON Schema types (barring unresolved
/// cycles, which are left as-is).
pub fn resolve_custom_types(types: &HashMap<String, Value>) -> HashMap<String, Value> {
    let max_attempts = types.len();
    types
        .iter()
        .map(|(name, def)| {
            let mut def = def.clone();
            resolve_schema_node(&mut def, types, max_attempts);
            (name.clone(), def)
        })
        .collect()
}

/// Walk `schema`, substituting any custom-type names found in `type`
/// fields (at any depth, including inside `properties`, `items`,
/// `oneOf`/`anyOf`/`allOf`) using the already-resolved `types` map.
pub fn apply_custom_types(schema: &mut Value, resolved_types: &HashMap<String, Value>) {
    let max_attempts = resolved_types.len().max(1);
    resolve_schema_node(schema, resolved_types, max_attempts);
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::collection::hash_map;
    use proptest::prelude::*;
    use serde_json::json;

    /// Flat object of scalar values, deep enough to exercise the merge
    /// recursion into nested objects without needing arbitrary depth.
    fn scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|n| json!(n)),
            "[a-z]{1,6}".prop_map(Value::String),
        ]
    }

    fn flat_object() -> impl Strategy<Value = Value> {
        hash_map("[a-z]{1,4}", scalar(), 0..5).prop_map(|map| Value::Object(map.into_iter().collect()))
    }

    fn nested_object() -> impl Strategy<Value = Value> {
        (flat_object(), flat_object()).prop_map(|(outer, nested)| {
            let mut outer = outer;
            outer.as_object_mut().expect("object").insert("nested".to_string(), nested);
            outer
        })
    }

    proptest! {
        /// Merging a value with itself is a no-op: every key top contributes
        /// is already present with the same value in bottom.
        #[test]
        fn merge_is_idempotent_against_itself(value in nested_object()) {
            prop_assert_eq!(merge(&value, &value), value);
        }

        /// Every key `top` defines ends up in the merged result with top's
        /// value (top always wins on conflict, regardless of bottom).
        #[test]
        fn merge_top_keys_always_win(top in flat_object(), bottom in flat_object()) {
            let merged = merge(&top, &bottom);
            for (key, value) in top.as_object().expect("object") {
                if !value.is_object() {
                    prop_assert_eq!(merged.get(key), Some(value));
                }
            }
        }

        /// Every key only `bottom` defines survives into the merged result
        /// untouched.
        #[test]
        fn merge_preserves_bottom_only_keys(top in flat_object(), bottom in flat_object()) {
            let merged = merge(&top, &bottom);
            for (key, value) in bottom.as_object().expect("object") {
                if !top.as_object().expect("object").contains_key(key) {
                    prop_assert_eq!(merged.get(key), Some(value));
                }
            }
        }

        /// A chain of custom types of arbitrary length, each pointing at the
        /// next, always resolves down to the standard type at the chain's
        /// end — resolution terminates and reaches a fixed point.
        #[test]
        fn chained_custom_types_resolve_to_the_root(len in 1usize..8) {
            let mut types = HashMap::new();
            for i in 0..len {
                let next = if i + 1 == len { "string".to_string() } else { format!("link{}", i + 1) };
                types.insert(format!("link{i}"), json!({"type": next}));
            }
            let resolved = resolve_custom_types(&types);
            prop_assert_eq!(&resolved["link0"]["type"], "string");
        }

        /// Resolution over any graph of custom types (including ones with
        /// cycles) always terminates and never leaves behind more attempts
        /// than the number of types — this is really a termination check,
        /// since an infinite loop would hang the test.
        #[test]
        fn custom_type_resolution_always_terminates(
            edges in hash_map("[a-z]{1,3}", "[a-z]{1,3}", 1..6)
        ) {
            let types: HashMap<String, Value> =
                edges.into_iter().map(|(name, target)| (name, json!({"type": target}))).collect();
            let resolved = resolve_custom_types(&types);
            prop_assert_eq!(resolved.len(), types.len());
        }
    }
}
