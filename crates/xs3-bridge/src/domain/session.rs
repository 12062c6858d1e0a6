//! Authenticated backend session.

use crate::domain::error::{BridgeError, BridgeResult};
use parking_lot::RwLock;
use std::fmt;

/// Token and identity handed out by a login confirmation.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Session token embedded in every query and command
    pub token: String,
    /// Owner id taken from the confirmation topic; scopes reply topics
    pub user_id: String,
}

impl Session {
    pub fn new(token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user_id: user_id.into(),
        }
    }
}

// The token is a bearer credential and must never reach the logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Holder of the current session, empty until the first login confirmation.
///
/// A later confirmation overwrites the session; nothing else mutates it.
#[derive(Debug, Default)]
pub struct SessionSlot {
    inner: RwLock<Option<Session>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Session> {
        self.inner.read().clone()
    }

    /// Current session or [`BridgeError::NotAuthenticated`]
    pub fn require(&self) -> BridgeResult<Session> {
        self.current().ok_or(BridgeError::NotAuthenticated)
    }

    pub fn establish(&self, session: Session) {
        *self.inner.write() = Some(session);
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.read().is_some()
    }
}
