//! The injected `_ping` route (spec.md §4.5).
//!
//! Every connector auto-registers this route so peers that add it as a
//! service can verify identity. The handler ignores its input entirely —
//! it never interprets, evaluates, or reflects anything from the request
//! body, so there is no way for a caller to use `_ping` as a side channel.

use crate::errors::HandlerError;
use crate::types::{CompiledRoute, HandlerFn};
use serde_json::{json, Value};
use std::sync::Arc;

/// Build the compiled `_ping` route reporting `local_alias`.
pub fn route(local_alias: impl Into<String>) -> CompiledRoute {
    let local_alias = local_alias.into();
    let handler: HandlerFn = Arc::new(move |_ignored: Value| {
        let local_alias = local_alias.clone();
        Box::pin(async move { Ok::<Value, HandlerError>(json!({"status": "OK", "alias": local_alias})) })
    });
    CompiledRoute::Bare(handler)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_status_and_alias_regardless_of_input() {
        let CompiledRoute::Bare(handler) = route("billing") else { panic!("expected bare route") };
        let out = handler(json!({"whatever": "ignored"})).await.expect("ok");
        assert_eq!(out, json!({"status": "OK", "alias": "billing"}));
    }
}
