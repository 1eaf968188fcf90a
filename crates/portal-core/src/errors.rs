//! Error types shared across the portal crates.

use thiserror::Error;

/// A frame or payload that does not follow the notification wire format.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The frame is JSON but not a JSON object.
    #[error("frame is not a JSON object")]
    NotAnObject,
    /// `jsonrpc` is present with a value other than `"2.0"`.
    #[error("unsupported jsonrpc version: {0}")]
    UnsupportedVersion(String),
    /// `method` is absent or not a string.
    #[error("missing method name")]
    MissingMethod,
    /// `params` is present but not an array.
    #[error("params of {method} must be an array")]
    ParamsNotArray { method: String },
    /// The params of a known method have the wrong shape.
    #[error("invalid params for {method}: {reason}")]
    InvalidParams { method: String, reason: String },
}

/// Failure of the tab-scoped key-value storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage content is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Failure reported by a notification handler. Logged by the dispatcher,
/// never propagated further.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("handler failed: {0}")]
    Failed(String),
}

impl HandlerError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Protocol(_) => "protocol",
            Self::Failed(_) => "failed",
        }
    }
}
