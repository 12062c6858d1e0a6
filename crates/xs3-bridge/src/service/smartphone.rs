//! Smartphone commands: mobile-service mode, MSS confirmations and revoke.
//!
//! Unlike medium commands these have no read model to poll. The mode switch
//! is fire-and-forget; the others wait for their event and raise on an error
//! reply or when the event never comes.

use crate::domain::config::TimeoutConfig;
use crate::domain::correlation::CorrelationId;
use crate::domain::error::{BridgeError, BridgeResult};
use crate::domain::mobile::{MobileServiceMode, MssConfirmRequest};
use crate::domain::outcome::CommandStatus;
use crate::domain::session::SessionSlot;
use crate::domain::topics;
use crate::ipc::waiters::WaiterRegistry;
use crate::ports::transport::{InboundMessage, Transport};
use crate::service::command::CommandEngine;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const SET_MOBILE_SERVICE_MODE: &str = "SetMobileServiceModeMapi";
pub const CONFIRM_UPDATE: &str = "ConfirmSmartphoneUpdateMapi";
pub const CONFIRM_REVOKE: &str = "ConfirmSmartphoneRevokeMapi";
pub const REVOKE_SMARTPHONE: &str = "RevokeSmartphoneMapi";

/// Result of one smartphone command. `payload` never carries the token.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MobileCommandReport {
    pub status: CommandStatus,
    pub command: String,
    pub command_id: CorrelationId,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct SmartphoneService {
    transport: Arc<dyn Transport>,
    waiters: Arc<WaiterRegistry>,
    session: Arc<SessionSlot>,
    commands: Arc<CommandEngine>,
    timeouts: TimeoutConfig,
}

impl SmartphoneService {
    pub fn new(
        transport: Arc<dyn Transport>,
        waiters: Arc<WaiterRegistry>,
        session: Arc<SessionSlot>,
        commands: Arc<CommandEngine>,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            transport,
            waiters,
            session,
            commands,
            timeouts,
        }
    }

    /// Switch the installation's mobile-service mode without waiting.
    ///
    /// A failed publish is reported with status `error`, not raised.
    pub async fn set_mobile_service_mode(
        &self,
        mode: MobileServiceMode,
    ) -> BridgeResult<MobileCommandReport> {
        let session = self.session.require()?;
        let command_id = CorrelationId::new();
        let payload = json!({"commandId": command_id, "mobileServiceMode": mode});
        let body = with_token(&payload, &session.token);

        let mut report = MobileCommandReport {
            status: CommandStatus::Ok,
            command: SET_MOBILE_SERVICE_MODE.to_string(),
            command_id,
            payload,
            event: None,
            error: None,
        };
        match self
            .transport
            .publish_json(&topics::command(SET_MOBILE_SERVICE_MODE), &body)
            .await
        {
            Ok(()) => info!(mode = mode.as_str(), "Mobile service mode published"),
            Err(e) => {
                error!(mode = mode.as_str(), error = %e, "Mobile service mode publish failed");
                report.status = CommandStatus::Error;
                report.error = Some(e.to_string());
            }
        }
        Ok(report)
    }

    pub async fn confirm_update(&self, request: &MssConfirmRequest) -> BridgeResult<MobileCommandReport> {
        self.confirm(CONFIRM_UPDATE, topics::MSS_UPDATE_CONFIRMED, request)
            .await
    }

    pub async fn confirm_revoke(&self, request: &MssConfirmRequest) -> BridgeResult<MobileCommandReport> {
        self.confirm(CONFIRM_REVOKE, topics::MSS_REVOKE_CONFIRMED, request)
            .await
    }

    async fn confirm(
        &self,
        command: &str,
        confirmed_topic: &'static str,
        request: &MssConfirmRequest,
    ) -> BridgeResult<MobileCommandReport> {
        request.validate()?;
        let session = self.session.require()?;
        let command_id = CorrelationId::new();
        let error_topic = topics::error_reply(&session.user_id);

        let waiter = self.waiters.register(format!("confirm {command}"), move |msg: &InboundMessage| {
            let Some(body) = msg.json() else {
                return false;
            };
            if msg.topic == error_topic {
                return error_concerns(&body, command_id);
            }
            msg.topic == confirmed_topic && command_id.matches(body.get("commandId"))
        });

        let payload = json!({
            "commandId": command_id,
            "mediumId": request.medium_id,
            "transactionId": request.transaction_id,
        });
        self.transport
            .publish_json(&topics::mss_command(command), &with_token(&payload, &session.token))
            .await?;
        debug!(command, command_id = %command_id, medium_id = %request.medium_id, "Published MSS command");

        let event = self.settle(command, waiter.wait(self.timeouts.mss_confirm).await?)?;
        info!(command, medium_id = %request.medium_id, "MSS command confirmed");
        Ok(MobileCommandReport {
            status: CommandStatus::Ok,
            command: command.to_string(),
            command_id,
            payload,
            event: Some(event),
            error: None,
        })
    }

    /// Revoke the smartphone credential of `medium_id`, or of the medium on
    /// the reader, and wait for `MediumRevoked`.
    pub async fn revoke(&self, medium_id: Option<&str>) -> BridgeResult<MobileCommandReport> {
        let session = self.session.require()?;
        let medium_id = self.commands.resolve_medium(medium_id)?;
        let command_id = CorrelationId::new();
        let error_topic = topics::error_reply(&session.user_id);

        let revoked = medium_id.clone();
        let waiter = self.waiters.register(format!("revoke {revoked}"), move |msg: &InboundMessage| {
            let Some(body) = msg.json() else {
                return false;
            };
            if msg.topic == error_topic {
                return error_concerns(&body, command_id);
            }
            // An event without a medium id is taken as ours
            msg.topic == topics::MEDIUM_REVOKED
                && body
                    .get("mediumId")
                    .and_then(Value::as_str)
                    .map_or(true, |id| id == revoked)
        });

        let payload = json!({"commandId": command_id, "id": medium_id});
        self.transport
            .publish_json(&topics::command(REVOKE_SMARTPHONE), &with_token(&payload, &session.token))
            .await?;
        debug!(command_id = %command_id, medium_id = %medium_id, "Published smartphone revoke");

        let event = self.settle(REVOKE_SMARTPHONE, waiter.wait(self.timeouts.revoke).await?)?;
        info!(medium_id = %medium_id, "Smartphone revoked");
        Ok(MobileCommandReport {
            status: CommandStatus::Ok,
            command: REVOKE_SMARTPHONE.to_string(),
            command_id,
            payload,
            event: Some(event),
            error: None,
        })
    }

    /// Event body, or `RemoteProtocol` when the reply came on the error topic
    fn settle(&self, command: &str, reply: InboundMessage) -> BridgeResult<Value> {
        let body = reply
            .json()
            .ok_or_else(|| BridgeError::Malformed(format!("reply on {}", reply.topic)))?;
        if !topics::is_error_reply(&reply.topic) {
            return Ok(body);
        }
        let code = body.get("error").and_then(Value::as_i64);
        let reason = ["reason", "error"]
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str))
            .unwrap_or("EVVA returned an error")
            .to_string();
        warn!(command, code = ?code, reason = %reason, "Smartphone command rejected");
        Err(BridgeError::RemoteProtocol { code, reason })
    }
}

/// Error replies belong to us when they echo our `commandId` or carry no
/// correlation id at all.
fn error_concerns(body: &Value, command_id: CorrelationId) -> bool {
    match (body.get("commandId"), body.get("requestId")) {
        (Some(id), _) => command_id.matches(Some(id)),
        (None, None) => true,
        (None, Some(_)) => false,
    }
}

fn with_token(payload: &Value, token: &str) -> Value {
    let mut body = payload.clone();
    body["token"] = json!(token);
    body
}
