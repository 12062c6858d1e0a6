//! Login state machine.
//!
//! ```text
//! Disconnected ──connect──► AwaitingPrimaryLogin ──fallback timer──► AwaitingFallbackLogin
//!                                   │                                        │
//!                                   └──────────── LoggedIn ──────────────────┴──► Authenticated
//! ```
//!
//! Exactly one fallback publish per connect; there is no further retry.

use crate::domain::config::Credentials;
use crate::domain::session::{Session, SessionSlot};
use crate::domain::topics;
use crate::ports::transport::{InboundMessage, Transport, TransportError};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Disconnected,
    AwaitingPrimaryLogin,
    AwaitingFallbackLogin,
    Authenticated,
}

pub struct LoginStateMachine {
    transport: Arc<dyn Transport>,
    session: Arc<SessionSlot>,
    credentials: Credentials,
    fallback_delay: Duration,
    state: Mutex<LoginState>,
    fallback: Mutex<Option<JoinHandle<()>>>,
}

impl LoginStateMachine {
    pub fn new(
        transport: Arc<dyn Transport>,
        session: Arc<SessionSlot>,
        credentials: Credentials,
        fallback_delay: Duration,
    ) -> Self {
        Self {
            transport,
            session,
            credentials,
            fallback_delay,
            state: Mutex::new(LoginState::Disconnected),
            fallback: Mutex::new(None),
        }
    }

    pub fn state(&self) -> LoginState {
        *self.state.lock()
    }

    /// Publish the primary login and arm the fallback timer.
    ///
    /// No-op once authenticated; a reconnect keeps the existing session.
    pub async fn on_connected(self: &Arc<Self>) -> Result<(), TransportError> {
        {
            let mut state = self.state.lock();
            if *state == LoginState::Authenticated {
                debug!("Already authenticated, skipping login");
                return Ok(());
            }
            *state = LoginState::AwaitingPrimaryLogin;
        }

        self.arm_fallback();

        info!(username = %self.credentials.username, "Publishing login with {{name,password}}");
        let body = json!({
            "name": self.credentials.username,
            "password": self.credentials.password,
        });
        self.transport.publish_json(topics::LOGIN_COMMAND, &body).await
    }

    fn arm_fallback(self: &Arc<Self>) {
        let machine = Arc::clone(self);
        let delay = self.fallback_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            machine.fire_fallback().await;
        });
        if let Some(previous) = self.fallback.lock().replace(handle) {
            previous.abort();
        }
    }

    async fn fire_fallback(&self) {
        {
            let mut state = self.state.lock();
            if *state != LoginState::AwaitingPrimaryLogin {
                return;
            }
            *state = LoginState::AwaitingFallbackLogin;
        }

        warn!("No LoggedIn yet, retrying login with {{username,password}}");
        let body = json!({
            "username": self.credentials.username,
            "password": self.credentials.password,
        });
        if let Err(e) = self.transport.publish_json(topics::LOGIN_COMMAND, &body).await {
            error!(error = %e, "Fallback login publish failed");
        }
    }

    /// Consume a login confirmation. Returns false for any other topic.
    pub fn handle_message(&self, message: &InboundMessage) -> bool {
        let Some(user_id) = topics::logged_in_owner(&message.topic) else {
            return false;
        };
        let Some(body) = message.json() else {
            warn!(user_id, "LoggedIn payload is not JSON");
            return true;
        };
        let Some(token) = extract_token(&body) else {
            warn!(user_id, "LoggedIn payload did not include a token");
            return true;
        };

        self.session.establish(Session::new(token, user_id));
        *self.state.lock() = LoginState::Authenticated;
        if let Some(timer) = self.fallback.lock().take() {
            timer.abort();
        }
        info!(user_id, token = "(received)", "Logged in to backend");
        true
    }

    /// Connection lost; an established session survives
    pub fn on_disconnected(&self) {
        let mut state = self.state.lock();
        if *state != LoginState::Authenticated {
            *state = LoginState::Disconnected;
            if let Some(timer) = self.fallback.lock().take() {
                timer.abort();
            }
        }
    }
}

/// Token from a login confirmation, by key priority
pub fn extract_token(body: &Value) -> Option<String> {
    [
        body.get("sessionToken"),
        body.get("token"),
        body.pointer("/event/token"),
        body.pointer("/payload/token"),
    ]
    .into_iter()
    .flatten()
    .find_map(|v| v.as_str().filter(|s| !s.is_empty()))
    .map(str::to_string)
}
