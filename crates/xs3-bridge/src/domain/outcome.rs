//! Structured result of a single command call.

use crate::domain::correlation::CorrelationId;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Ok,
    Error,
}

/// Outcome of one command, produced once and never mutated.
///
/// Remote rejections and ACK timeouts are reported here instead of being
/// raised, so a caller composing several commands can inspect partial success.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutcome {
    pub status: CommandStatus,
    /// Backend command name, e.g. `SetAccessBeginAtMapi`
    pub command: String,
    pub medium_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<CorrelationId>,
    /// Value the backend holds (noop) or was asked to hold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack_pending: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub propagation_pending: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Raw acknowledgement event, when one arrived
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack: Option<Value>,
}

impl CommandOutcome {
    fn ok(command: &str, medium_id: &str) -> Self {
        Self {
            status: CommandStatus::Ok,
            command: command.to_string(),
            medium_id: medium_id.to_string(),
            command_id: None,
            normalized_value: None,
            ack_pending: None,
            propagation_pending: None,
            error_code: None,
            reason: None,
            message: None,
            ack: None,
        }
    }

    /// Backend already holds the target value; nothing was published
    pub fn noop(
        command: &str,
        medium_id: &str,
        current: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            normalized_value: current,
            message: Some(message.into()),
            ..Self::ok(command, medium_id)
        }
    }

    /// Published, but no acknowledgement within the ACK budget
    pub fn ack_pending(
        command: &str,
        medium_id: &str,
        command_id: CorrelationId,
        wanted: Option<String>,
    ) -> Self {
        Self {
            command_id: Some(command_id),
            normalized_value: wanted,
            ack_pending: Some(true),
            propagation_pending: Some(true),
            ..Self::ok(command, medium_id)
        }
    }

    /// Acknowledged; `propagation_pending` is true when the read model never
    /// showed the target value within the confirmation budget
    pub fn applied(
        command: &str,
        medium_id: &str,
        command_id: CorrelationId,
        normalized: Option<String>,
        ack: Value,
        propagation_pending: bool,
    ) -> Self {
        Self {
            command_id: Some(command_id),
            normalized_value: normalized,
            propagation_pending: Some(propagation_pending),
            ack: Some(ack),
            ..Self::ok(command, medium_id)
        }
    }

    /// Acknowledgement reported a failure, usually with a numeric code
    pub fn rejected(
        command: &str,
        medium_id: &str,
        command_id: CorrelationId,
        wanted: Option<String>,
        code: Option<i64>,
        reason: Option<String>,
        ack: Value,
    ) -> Self {
        Self {
            status: CommandStatus::Error,
            command_id: Some(command_id),
            normalized_value: wanted,
            error_code: code,
            reason,
            ack: Some(ack),
            ..Self::ok(command, medium_id)
        }
    }

    /// The publish itself failed
    pub fn publish_failed(
        command: &str,
        medium_id: &str,
        command_id: CorrelationId,
        wanted: Option<String>,
        details: String,
    ) -> Self {
        Self {
            status: CommandStatus::Error,
            command_id: Some(command_id),
            normalized_value: wanted,
            message: Some(details),
            ..Self::ok(command, medium_id)
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == CommandStatus::Error
    }

    /// True when the effect has not been observed in the read model yet
    pub fn is_pending(&self) -> bool {
        self.ack_pending == Some(true) || self.propagation_pending == Some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_noop_serialization_skips_absent_fields() {
        let outcome = CommandOutcome::noop(
            "SetAccessBeginAtMapi",
            "M1",
            Some("2025-01-01T10:00:00Z".into()),
            "Access begin already set (noop)",
        );
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["mediumId"], "M1");
        assert!(json.get("ackPending").is_none());
        assert!(json.get("errorCode").is_none());
        assert!(!outcome.is_pending());
    }

    #[test]
    fn test_ack_pending_is_pending() {
        let outcome =
            CommandOutcome::ack_pending("SetAccessEndAtMapi", "M1", CorrelationId::new(), None);
        assert!(outcome.is_pending());
        assert!(!outcome.is_error());
        assert_eq!(outcome.propagation_pending, Some(true));
    }

    #[test]
    fn test_rejected() {
        let ack = json!({"error": 12, "reason": "conflict"});
        let outcome = CommandOutcome::rejected(
            "AssignAuthorizationProfileToMediumMapi",
            "M1",
            CorrelationId::new(),
            Some("P9".into()),
            Some(12),
            Some("conflict".into()),
            ack,
        );
        assert!(outcome.is_error());
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["errorCode"], 12);
        assert_eq!(json["reason"], "conflict");
    }
}
