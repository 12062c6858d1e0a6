//! Correlation ID for request tracking.
//!
//! Queries embed it as `requestId`, commands as `commandId`. The backend
//! echoes it back in replies and acknowledgements.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Correlation ID for matching a backend reply to the request that caused it.
///
/// Uses UUID v4, the format the backend accepts for both request and
/// command ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a fresh correlation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from string
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// True when `value` is a string holding this id.
    ///
    /// Comparison goes through UUID parsing so letter case in the echoed id
    /// does not matter.
    pub fn matches(&self, value: Option<&Value>) -> bool {
        value
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .is_some_and(|uuid| uuid == self.0)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CorrelationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
