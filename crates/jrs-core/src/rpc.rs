//! JSON-RPC 2.0 envelope helpers.
//!
//! spec.md §2 lists "RPC object helpers" as a top-level component but never
//! designs them (SPEC_FULL.md §4.12). These are the success/error/request
//! envelope builders the dispatch pipeline and client registry build on,
//! plus the decoder the client registry uses to interpret a peer's reply.

use serde_json::{json, Value};

const JSONRPC_VERSION: &str = "2.0";

/// Build a JSON-RPC request envelope.
pub fn request(method: &str, params: Value, id: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "method": method,
        "params": params,
        "id": id,
    })
}

/// Build a JSON-RPC success envelope.
pub fn success(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "result": result,
    })
}

/// Build a JSON-RPC error envelope.
pub fn error(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": {
            "code": code,
            "message": message.into(),
        },
    })
}

/// The parsed outcome of a peer's JSON-RPC response, used by the client
/// registry to classify forwarded errors (spec.md §4.3).
#[derive(Debug, Clone)]
pub enum RpcOutcome {
    /// `{"result": ...}` was present.
    Result(Value),
    /// `{"error": ...}` was present and well-formed: a numeric `code` and a
    /// string `message`.
    WellFormedError {
        /// The error code.
        code: f64,
        /// The error message.
        message: String,
    },
    /// `{"error": ...}` was present but is not an object.
    NonObjectError(Value),
    /// `{"error": ...}` is an object but `code` is missing or not a finite number.
    NonFiniteCodeError(Value),
    /// Neither `result` nor `error` was present.
    Malformed,
}

/// Decode a raw JSON-RPC response body into an [`RpcOutcome`].
pub fn decode_response(response: &Value) -> RpcOutcome {
    if let Some(result) = response.get("result") {
        return RpcOutcome::Result(result.clone());
    }

    let Some(error_value) = response.get("error") else {
        return RpcOutcome::Malformed;
    };

    let Some(error_object) = error_value.as_object() else {
        return RpcOutcome::NonObjectError(error_value.clone());
    };

    let code = error_object.get("code").and_then(Value::as_f64);
    let message = error_object.get("message").and_then(Value::as_str);

    match (code, message) {
        (Some(code), Some(message)) if code.is_finite() => {
            RpcOutcome::WellFormedError { code, message: message.to_string() }
        }
        _ => RpcOutcome::NonFiniteCodeError(error_value.clone()),
    }
}
