//! Command engine.
//!
//! Every command follows the same shape:
//! read current state, compute the target, skip if already there (noop),
//! publish with a fresh `commandId`, race the ACK against a short budget,
//! then poll the read model until the target shows up.
//!
//! An ACK timeout is NOT a failure: the publish was accepted by the broker,
//! so the outcome is `ok` with `ackPending` and `propagationPending` set.

use crate::domain::config::{ConfirmConfig, TimeoutConfig};
use crate::domain::correlation::CorrelationId;
use crate::domain::error::{BridgeError, BridgeResult};
use crate::domain::outcome::CommandOutcome;
use crate::domain::session::SessionSlot;
use crate::domain::state::ReaderState;
use crate::domain::topics;
use crate::domain::window::{ceil_5min, floor_5min, format_wire, parse_backend_timestamp, same_minute};
use crate::ipc::waiters::WaiterRegistry;
use crate::ports::transport::{InboundMessage, Transport};
use crate::service::query::QueryService;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// State-changing commands the engine issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    SetAccessBegin,
    SetAccessEnd,
    AssignProfile,
    WithdrawProfile,
}

impl CommandKind {
    /// Backend command name; also the last topic segment
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetAccessBegin => "SetAccessBeginAtMapi",
            Self::SetAccessEnd => "SetAccessEndAtMapi",
            Self::AssignProfile => "AssignAuthorizationProfileToMediumMapi",
            Self::WithdrawProfile => "WithdrawAuthorizationProfileFromMediumMapi",
        }
    }

    fn value_field(&self) -> &'static str {
        match self {
            Self::SetAccessBegin => "accessBeginAt",
            Self::SetAccessEnd => "accessEndAt",
            Self::AssignProfile | Self::WithdrawProfile => "authorizationProfileId",
        }
    }

    fn ack_timeout(&self, timeouts: &TimeoutConfig) -> Duration {
        match self {
            Self::SetAccessBegin => timeouts.ack_begin,
            Self::SetAccessEnd => timeouts.ack_end,
            Self::AssignProfile | Self::WithdrawProfile => timeouts.ack_default,
        }
    }

    fn noop_message(&self) -> &'static str {
        match self {
            Self::SetAccessBegin => "Access begin already set (noop)",
            Self::SetAccessEnd => "Access end already set (noop)",
            Self::AssignProfile => "Authorization profile already assigned (noop)",
            Self::WithdrawProfile => "No authorization profile assigned (noop)",
        }
    }
}

/// Desired read-model state after a command
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    BeginAt(DateTime<Utc>),
    EndAt(DateTime<Utc>),
    Assigned(String),
    Withdrawn(String),
}

impl Target {
    fn wire_value(&self) -> String {
        match self {
            Self::BeginAt(t) | Self::EndAt(t) => format_wire(*t),
            Self::Assigned(profile) | Self::Withdrawn(profile) => profile.clone(),
        }
    }

    /// Raw current value the target is compared against
    fn current<'a>(&self, medium: Option<&'a Value>) -> Option<&'a str> {
        let keys: &[&str] = match self {
            Self::BeginAt(_) => &["accessBeginAt", "checkIn", "validFrom"],
            Self::EndAt(_) => &["accessEndAt", "checkOut", "validUntil"],
            Self::Assigned(_) | Self::Withdrawn(_) => &["authorizationProfileId"],
        };
        let medium = medium?;
        keys.iter()
            .find_map(|key| medium.get(*key).filter(|v| !v.is_null()))
            .and_then(Value::as_str)
    }

    fn is_satisfied_by(&self, medium: Option<&Value>) -> bool {
        let current = self.current(medium);
        match self {
            Self::BeginAt(t) | Self::EndAt(t) => current
                .and_then(parse_backend_timestamp)
                .is_some_and(|have| same_minute(have, *t)),
            Self::Assigned(profile) => current == Some(profile.as_str()),
            // Satisfied once no profile at all is assigned
            Self::Withdrawn(_) => current.map_or(true, str::is_empty),
        }
    }

    /// Target as reported back by the ACK event, when it carries one
    fn normalized_by(self, ack: &Value) -> Self {
        let reported = |field: &str| {
            ack.pointer(&format!("/event/{field}"))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        match self {
            Self::BeginAt(t) => Self::BeginAt(
                reported("accessBeginAt")
                    .and_then(|s| parse_backend_timestamp(&s))
                    .unwrap_or(t),
            ),
            Self::EndAt(t) => Self::EndAt(
                reported("accessEndAt")
                    .and_then(|s| parse_backend_timestamp(&s))
                    .unwrap_or(t),
            ),
            Self::Assigned(profile) => {
                Self::Assigned(reported("authorizationProfileId").unwrap_or(profile))
            }
            withdrawn @ Self::Withdrawn(_) => withdrawn,
        }
    }
}

pub struct CommandEngine {
    transport: Arc<dyn Transport>,
    waiters: Arc<WaiterRegistry>,
    session: Arc<SessionSlot>,
    reader_state: Arc<ReaderState>,
    queries: Arc<QueryService>,
    timeouts: TimeoutConfig,
    confirm: ConfirmConfig,
}

impl CommandEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        waiters: Arc<WaiterRegistry>,
        session: Arc<SessionSlot>,
        reader_state: Arc<ReaderState>,
        queries: Arc<QueryService>,
        timeouts: TimeoutConfig,
        confirm: ConfirmConfig,
    ) -> Self {
        Self {
            transport,
            waiters,
            session,
            reader_state,
            queries,
            timeouts,
            confirm,
        }
    }

    /// Set the window begin, floored to the 5-minute grid
    pub async fn set_window_begin(
        &self,
        medium_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> BridgeResult<CommandOutcome> {
        self.execute(
            CommandKind::SetAccessBegin,
            medium_id,
            Target::BeginAt(floor_5min(at)),
        )
        .await
    }

    /// Set the window end, ceiled to the 5-minute grid
    pub async fn set_window_end(
        &self,
        medium_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> BridgeResult<CommandOutcome> {
        self.execute(
            CommandKind::SetAccessEnd,
            medium_id,
            Target::EndAt(ceil_5min(at)),
        )
        .await
    }

    pub async fn assign_profile(
        &self,
        medium_id: Option<&str>,
        profile_id: &str,
    ) -> BridgeResult<CommandOutcome> {
        let profile_id = require_profile_id(profile_id)?;
        self.execute(
            CommandKind::AssignProfile,
            medium_id,
            Target::Assigned(profile_id),
        )
        .await
    }

    /// Withdraw `profile_id`; a noop only when the medium has no profile at all
    pub async fn withdraw_profile(
        &self,
        medium_id: Option<&str>,
        profile_id: &str,
    ) -> BridgeResult<CommandOutcome> {
        let profile_id = require_profile_id(profile_id)?;
        self.execute(
            CommandKind::WithdrawProfile,
            medium_id,
            Target::Withdrawn(profile_id),
        )
        .await
    }

    /// Explicit medium id, else the medium currently on the reader
    pub fn resolve_medium(&self, explicit: Option<&str>) -> BridgeResult<String> {
        match explicit {
            Some(id) if id.trim().is_empty() => {
                Err(BridgeError::validation("mediumId must not be empty"))
            }
            Some(id) => Ok(id.to_string()),
            None => self
                .reader_state
                .current_medium_id()
                .ok_or(BridgeError::NoEntitySelected),
        }
    }

    async fn execute(
        &self,
        kind: CommandKind,
        medium_id: Option<&str>,
        target: Target,
    ) -> BridgeResult<CommandOutcome> {
        let session = self.session.require()?;
        let medium_id = self.resolve_medium(medium_id)?;
        let command = kind.name();

        let current = self.queries.get_medium(&medium_id).await?;
        if target.is_satisfied_by(current.as_ref()) {
            info!(command, medium_id = %medium_id, "Target already in place, skipping publish");
            return Ok(CommandOutcome::noop(
                command,
                &medium_id,
                target.current(current.as_ref()).map(str::to_string),
                kind.noop_message(),
            ));
        }

        let command_id = CorrelationId::new();
        let wanted = target.wire_value();
        let waiter = self.waiters.register(
            format!("ack {command}"),
            ack_predicate(command_id, medium_id.clone(), &session.user_id),
        );

        let mut body = json!({
            "commandId": command_id,
            "id": medium_id,
            "token": session.token,
        });
        body[kind.value_field()] = json!(wanted);

        if let Err(e) = self
            .transport
            .publish_json(&topics::command(command), &body)
            .await
        {
            error!(command, medium_id = %medium_id, error = %e, "Command publish failed");
            return Ok(CommandOutcome::publish_failed(
                command,
                &medium_id,
                command_id,
                Some(wanted),
                e.to_string(),
            ));
        }
        debug!(command, command_id = %command_id, medium_id = %medium_id, value = %wanted, "Published command");

        let ack_timeout = kind.ack_timeout(&self.timeouts);
        let ack = match waiter.wait(ack_timeout).await {
            Ok(message) => message.json().unwrap_or(Value::Null),
            Err(e) if e.is_timeout() => {
                warn!(command, medium_id = %medium_id, "ACK timed out (publish ok)");
                return Ok(CommandOutcome::ack_pending(
                    command,
                    &medium_id,
                    command_id,
                    Some(wanted),
                ));
            }
            Err(e) => return Err(e),
        };

        if let Some((code, reason)) = ack_error(&ack) {
            warn!(command, medium_id = %medium_id, code = ?code, reason = ?reason, "Command rejected");
            return Ok(CommandOutcome::rejected(
                command,
                &medium_id,
                command_id,
                Some(wanted),
                code,
                reason,
                ack,
            ));
        }

        let target = target.normalized_by(&ack);
        let confirmed = self.confirm(&medium_id, &target).await;
        if !confirmed {
            info!(command, medium_id = %medium_id, "Read model not converged yet");
        }
        Ok(CommandOutcome::applied(
            command,
            &medium_id,
            command_id,
            Some(target.wire_value()),
            ack,
            !confirmed,
        ))
    }

    /// Poll the read model until `target` is observed or tries run out.
    /// Query failures count as "not yet".
    async fn confirm(&self, medium_id: &str, target: &Target) -> bool {
        for attempt in 1..=self.confirm.tries {
            match self.queries.get_medium(medium_id).await {
                Ok(current) if target.is_satisfied_by(current.as_ref()) => return true,
                Ok(_) => {}
                Err(e) => debug!(medium_id, attempt, error = %e, "Confirmation read failed"),
            }
            if attempt < self.confirm.tries {
                tokio::time::sleep(self.confirm.interval).await;
            }
        }
        false
    }
}

fn require_profile_id(profile_id: &str) -> BridgeResult<String> {
    let trimmed = profile_id.trim();
    if trimmed.is_empty() {
        return Err(BridgeError::validation("profileId must not be empty"));
    }
    Ok(trimmed.to_string())
}

/// Matches the acknowledgement of one command: an error reply or a command
/// event echoing `command_id`, or a `MediumChanged` event for the medium.
fn ack_predicate(
    command_id: CorrelationId,
    medium_id: String,
    user_id: &str,
) -> impl Fn(&InboundMessage) -> bool + Send + Sync + 'static {
    let error_topic = topics::error_reply(user_id);
    move |msg: &InboundMessage| {
        let is_error = msg.topic == error_topic;
        let is_event = msg.topic.starts_with(topics::SYSTEM_EVENTS_PREFIX);
        if !is_error && !is_event {
            return false;
        }
        let Some(body) = msg.json() else {
            return false;
        };
        if command_id.matches(body.get("commandId")) {
            return true;
        }
        msg.topic == topics::MEDIUM_CHANGED && changed_entity(&body) == Some(medium_id.as_str())
    }
}

/// Entity id carried by a `MediumChanged` event
fn changed_entity(body: &Value) -> Option<&str> {
    ["/id", "/mediumId", "/event/id", "/event/mediumId", "/payload/id", "/payload/mediumId"]
        .iter()
        .find_map(|path| body.pointer(path).and_then(Value::as_str))
}

/// `(code, reason)` when the ACK reports a failure.
///
/// A numeric `error` field is a rejection. Anything that arrived on an error
/// topic without one is reported with the backend's message and no code.
fn ack_error(ack: &Value) -> Option<(Option<i64>, Option<String>)> {
    let reason = ack
        .get("reason")
        .or_else(|| ack.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string);
    match ack.get("error") {
        Some(code) if code.is_i64() || code.is_u64() => Some((code.as_i64(), reason)),
        Some(Value::String(message)) => Some((None, reason.or_else(|| Some(message.clone())))),
        _ => None,
    }
}
