//! Bridge error taxonomy.
//!
//! Validation and authentication failures are raised before any network I/O.
//! Remote rejections and ACK timeouts of medium commands are NOT raised; the command
//! engine folds them into a [`CommandOutcome`](crate::domain::outcome::CommandOutcome).

use crate::ports::transport::TransportError;
use std::time::Duration;

/// HTTP status codes the collaborator layer reports for each error kind
pub mod status {
    pub const BAD_REQUEST: u16 = 400;
    pub const NOT_FOUND: u16 = 404;
    pub const BAD_GATEWAY: u16 = 502;
    pub const SERVICE_UNAVAILABLE: u16 = 503;
    pub const GATEWAY_TIMEOUT: u16 = 504;
}

/// Errors surfaced by the bridge core
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// No login confirmation has been received yet
    #[error("not logged in to the backend yet")]
    NotAuthenticated,

    /// Neither an explicit medium id nor a medium on the reader
    #[error("no medium id provided and no medium is present on the reader")]
    NoEntitySelected,

    /// Malformed timestamps, inverted or expired windows, bad identifiers
    #[error("validation failed: {0}")]
    Validation(String),

    /// Backend answered a query on the error topic
    #[error("backend query error: {message}")]
    RemoteQuery { message: String },

    /// Backend answered a command on the error topic
    #[error("backend rejected request: {reason}")]
    RemoteProtocol { code: Option<i64>, reason: String },

    /// Backend has no row for the requested entity
    #[error("{0}")]
    NotFound(String),

    /// No reply within the budget
    #[error("timed out waiting for {operation} after {}ms", .after.as_millis())]
    Timeout { operation: String, after: Duration },

    /// Publish or subscribe failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Reply arrived but could not be decoded
    #[error("malformed backend message: {0}")]
    Malformed(String),
}

impl BridgeError {
    pub fn validation(details: impl Into<String>) -> Self {
        Self::Validation(details.into())
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Status code used in the response envelope
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::NoEntitySelected => status::BAD_REQUEST,
            Self::NotFound(_) => status::NOT_FOUND,
            Self::NotAuthenticated | Self::Transport(_) => status::SERVICE_UNAVAILABLE,
            Self::RemoteQuery { .. } | Self::RemoteProtocol { .. } | Self::Malformed(_) => {
                status::BAD_GATEWAY
            }
            Self::Timeout { .. } => status::GATEWAY_TIMEOUT,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
