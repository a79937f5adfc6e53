//! Error types shared across the jrs-connector workspace.

/// Result type alias for jrs-connector operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Library-internal error type. This never crosses the JSON-RPC wire
/// directly — the dispatch pipeline always classifies errors down to a
/// `{code, message}` pair before replying to a caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A route or client configuration is malformed.
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable description.
        message: String,
    },

    /// Schema compilation or resolution failed.
    #[error("validation error: {message}")]
    Validation {
        /// Human-readable description.
        message: String,
    },

    /// An outbound call failed before a response was received.
    #[error("transport error: {message}")]
    Transport {
        /// Human-readable description.
        message: String,
    },

    /// An alias was not found in the client registry.
    #[error("unknown service: {alias}")]
    UnknownService {
        /// The alias that was looked up.
        alias: String,
    },

    /// Lifecycle startup or shutdown failed.
    #[error("lifecycle error: {message}")]
    Lifecycle {
        /// Human-readable description.
        message: String,
    },

    /// JSON (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O failure (binding a listener, reading a socket path, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Construct a [`Error::Config`].
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    /// Construct a [`Error::Validation`].
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Construct a [`Error::Transport`].
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport { message: message.into() }
    }

    /// Construct a [`Error::Lifecycle`].
    pub fn lifecycle<S: Into<String>>(message: S) -> Self {
        Self::Lifecycle { message: message.into() }
    }
}
