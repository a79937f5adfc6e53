//! Error classification for the dispatch pipeline (spec.md §4.4).
//!
//! A handler or pipeline stage throws a [`HandlerError`], which is a small,
//! closed set of *kinds* of failure rather than an arbitrary error type —
//! the dispatcher needs to know which of four buckets a failure falls into
//! before it can decide what, if anything, is safe to put on the wire.

use jrs_foundation::codes;
use serde_json::{json, Value};
use std::fmt;

/// The body that ends up in the JSON-RPC `error` field.
///
/// This is a bag of JSON rather than a `{code, message}` struct because one
/// classification outcome (an unrecognized error) resolves to an empty
/// object, and another (a forwarded remote error) may carry whatever shape
/// the origin produced.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchError {
    pub(crate) body: Value,
}

impl DispatchError {
    /// A `{code, message}` error body.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { body: json!({ "code": code, "message": message.into() }) }
    }

    /// The empty-object body used when an error must not be described.
    pub fn empty() -> Self {
        Self { body: json!({}) }
    }

    /// Wrap an arbitrary value verbatim, e.g. a forwarded remote error.
    pub fn verbatim(body: Value) -> Self {
        Self { body }
    }

    /// The JSON body to place under the response's `error` key.
    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn code(&self) -> Option<i64> {
        self.body.get("code").and_then(Value::as_i64)
    }

    pub fn message(&self) -> Option<&str> {
        self.body.get("message").and_then(Value::as_str)
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.body)
    }
}

impl std::error::Error for DispatchError {}

/// A classification of what a handler or pipeline stage threw, matching
/// spec.md §4.4's four cases.
#[derive(Debug, Clone)]
pub enum HandlerError {
    /// A recognized internal-bug shape: log it, and deliver it to the
    /// caller unchanged (the source treats these as safe to expose because
    /// they're produced by the framework itself, not by user code).
    Internal(DispatchError),
    /// A downstream connection was refused.
    ConnectionRefused,
    /// A plain record carrying a numeric `code` and string `message`,
    /// forwarded to the caller verbatim.
    UserVisible(DispatchError),
    /// Anything else. Logged, never described to the caller.
    Unknown(String),
}

impl HandlerError {
    pub fn connection_refused() -> Self {
        Self::ConnectionRefused
    }

    pub fn user_visible(code: i64, message: impl Into<String>) -> Self {
        Self::UserVisible(DispatchError::new(code, message))
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "internal: {e}"),
            Self::ConnectionRefused => write!(f, "connection refused"),
            Self::UserVisible(e) => write!(f, "user-visible: {e}"),
            Self::Unknown(msg) => write!(f, "unknown: {msg}"),
        }
    }
}

impl std::error::Error for HandlerError {}

/// Turn a thrown [`HandlerError`] into the [`DispatchError`] that goes on
/// the wire, logging as a side effect per spec.md §4.4.
pub fn classify(err: HandlerError) -> DispatchError {
    match err {
        HandlerError::Internal(e) => {
            tracing::error!(code = ?e.code(), message = ?e.message(), "internal bug in dispatch pipeline");
            e
        }
        HandlerError::ConnectionRefused => {
            tracing::error!("downstream connection refused");
            DispatchError::new(codes::INTERNAL_SERVER_ERROR, "Internal server error")
        }
        HandlerError::UserVisible(e) => e,
        HandlerError::Unknown(message) => {
            tracing::error!(error = %message, "unrecognized error in dispatch pipeline");
            DispatchError::empty()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_pass_through_unchanged() {
        let e = DispatchError::new(400, "bad request");
        let classified = classify(HandlerError::Internal(e.clone()));
        assert_eq!(classified, e);
    }

    #[test]
    fn connection_refused_maps_to_fixed_code() {
        let classified = classify(HandlerError::connection_refused());
        assert_eq!(classified.code(), Some(1001));
        assert_eq!(classified.message(), Some("Internal server error"));
    }

    #[test]
    fn user_visible_forwards_verbatim() {
        let classified = classify(HandlerError::user_visible(-32001, "nope"));
        assert_eq!(classified.code(), Some(-32001));
        assert_eq!(classified.message(), Some("nope"));
    }

    #[test]
    fn unknown_errors_become_empty_objects() {
        let classified = classify(HandlerError::Unknown("boom".into()));
        assert_eq!(classified.body(), &json!({}));
    }
}
