//! Reserved JSON-RPC error codes produced by the connector layer itself
//! (as opposed to application error codes chosen by route handlers).
//!
//! See the connector's error-handling design for when each is emitted.

/// The compiled validator rejected `params`.
pub const VALIDATION_ERROR: i64 = 400;

/// `callService`/`call_service` was invoked with non-object params.
pub const CRITICAL_INTERNAL_ERROR: i64 = 500;

/// A handler raised the `ECONNREFUSED` sentinel for a downstream dependency.
pub const INTERNAL_SERVER_ERROR: i64 = 1001;
