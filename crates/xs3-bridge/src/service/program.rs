//! Program orchestrator: multi-step workflows over the command engine.
//!
//! Steps run one after another, never concurrently, so two commands on the
//! same medium cannot interleave within one workflow.

use crate::domain::error::{status, BridgeError, BridgeResult};
use crate::domain::outcome::{CommandOutcome, CommandStatus};
use crate::domain::session::SessionSlot;
use crate::domain::window::AccessWindow;
use crate::ports::outbound::Clock;
use crate::service::command::CommandEngine;
use crate::service::query::QueryService;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// How far in the past a begin may lie before it is clamped
pub const BEGIN_GRACE_SECS: i64 = 120;
/// Clamped begin, relative to now
pub const CLAMPED_BEGIN_OFFSET_SECS: i64 = 60;

const OK_STATUS: u16 = 200;

/// Move a begin lying more than [`BEGIN_GRACE_SECS`] in the past to just
/// before now. Returns the begin to use and whether it was moved.
pub fn clamp_begin(begin: DateTime<Utc>, now: DateTime<Utc>) -> (DateTime<Utc>, bool) {
    if begin < now - Duration::seconds(BEGIN_GRACE_SECS) {
        (now - Duration::seconds(CLAMPED_BEGIN_OFFSET_SECS), true)
    } else {
        (begin, false)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramRequest {
    #[serde(default)]
    pub medium_id: Option<String>,
    pub check_in: String,
    pub check_out: String,
    pub profile_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgramResults {
    pub begin: CommandOutcome,
    pub end: CommandOutcome,
    pub assign: CommandOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramRaw {
    pub overall_status: CommandStatus,
    pub medium_id: String,
    pub results: ProgramResults,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramReport {
    pub error: bool,
    pub message: String,
    pub status_code: u16,
    pub medium_id: String,
    pub adjusted: bool,
    pub raw: ProgramRaw,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendAccessRequest {
    #[serde(default)]
    pub medium_id: Option<String>,
    pub check_in: String,
    pub check_out: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtendAccessResults {
    pub begin: CommandOutcome,
    pub end: CommandOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendAccessRaw {
    pub overall_status: CommandStatus,
    pub results: ExtendAccessResults,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendAccessReport {
    pub error: bool,
    pub message: String,
    pub status_code: u16,
    pub medium_id: String,
    pub adjusted: bool,
    /// Access-data row of a smartphone medium; `null` for cards or on lookup failure
    pub smartphone_access: Option<Value>,
    pub raw: ExtendAccessRaw,
}

pub struct ProgramOrchestrator {
    commands: Arc<CommandEngine>,
    queries: Arc<QueryService>,
    session: Arc<SessionSlot>,
    clock: Arc<dyn Clock>,
}

impl ProgramOrchestrator {
    pub fn new(
        commands: Arc<CommandEngine>,
        queries: Arc<QueryService>,
        session: Arc<SessionSlot>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            commands,
            queries,
            session,
            clock,
        }
    }

    /// Validate, clamp, then set begin, end and profile in that order
    pub async fn program(&self, request: ProgramRequest) -> BridgeResult<ProgramReport> {
        let now = self.clock.now();
        let window = AccessWindow::parse(&request.check_in, &request.check_out, now)?;
        if request.profile_id.trim().is_empty() {
            return Err(BridgeError::validation("profileId must not be empty"));
        }
        self.session.require()?;
        let medium_id = self
            .commands
            .resolve_medium(request.medium_id.as_deref())?;

        let (begin_at, adjusted) = clamp_begin(window.begin, now);
        if adjusted {
            info!(medium_id = %medium_id, requested = %window.begin, clamped = %begin_at, "checkIn clamped near now");
        }

        let medium = Some(medium_id.as_str());
        let begin = self.commands.set_window_begin(medium, begin_at).await?;
        let end = self.commands.set_window_end(medium, window.end).await?;
        let assign = self
            .commands
            .assign_profile(medium, &request.profile_id)
            .await?;

        let outcomes = [&begin, &end, &assign];
        let (error, message) = summarize(&outcomes, adjusted, "Program completed");
        if error {
            warn!(medium_id = %medium_id, "Program failed");
        }

        Ok(ProgramReport {
            error,
            message,
            status_code: if error { status::BAD_REQUEST } else { OK_STATUS },
            medium_id: medium_id.clone(),
            adjusted,
            raw: ProgramRaw {
                overall_status: overall(error),
                medium_id,
                results: ProgramResults { begin, end, assign },
            },
        })
    }

    /// Set end then begin, then attach smartphone access data when the
    /// medium is a smartphone
    pub async fn extend_access(
        &self,
        request: ExtendAccessRequest,
    ) -> BridgeResult<ExtendAccessReport> {
        let now = self.clock.now();
        let window = AccessWindow::parse(&request.check_in, &request.check_out, now)?;
        self.session.require()?;
        let medium_id = self
            .commands
            .resolve_medium(request.medium_id.as_deref())?;
        let (begin_at, adjusted) = clamp_begin(window.begin, now);

        let medium = Some(medium_id.as_str());
        let end = self.commands.set_window_end(medium, window.end).await?;
        let begin = self.commands.set_window_begin(medium, begin_at).await?;
        let smartphone_access = self.smartphone_access(&medium_id).await;

        let (error, message) = summarize(&[&begin, &end], adjusted, "Access window extended");
        Ok(ExtendAccessReport {
            error,
            message,
            status_code: if error { status::BAD_REQUEST } else { OK_STATUS },
            medium_id,
            adjusted,
            smartphone_access,
            raw: ExtendAccessRaw {
                overall_status: overall(error),
                results: ExtendAccessResults { begin, end },
            },
        })
    }

    async fn smartphone_access(&self, medium_id: &str) -> Option<Value> {
        let medium = match self.queries.get_medium(medium_id).await {
            Ok(medium) => medium?,
            Err(e) => {
                warn!(medium_id, error = %e, "Smartphone enrichment skipped");
                return None;
            }
        };
        if medium.get("mediumType").and_then(Value::as_str) != Some("SMARTPHONE") {
            return None;
        }

        let xs_medium_id = ["/xsMediumId", "/xsId", "/identificationMedium/xsMediumId"]
            .iter()
            .find_map(|path| medium.pointer(path).and_then(Value::as_str))
            .unwrap_or(medium_id);
        match self.queries.smartphone_access(xs_medium_id).await {
            Ok(access) => access,
            Err(e) => {
                warn!(medium_id, error = %e, "Smartphone access lookup failed");
                None
            }
        }
    }
}

fn overall(error: bool) -> CommandStatus {
    if error {
        CommandStatus::Error
    } else {
        CommandStatus::Ok
    }
}

/// `(error, message)` for a set of step outcomes
fn summarize(outcomes: &[&CommandOutcome], adjusted: bool, done: &str) -> (bool, String) {
    if outcomes.iter().any(|o| o.is_error()) {
        return (true, "One or more operations failed".to_string());
    }
    let mut message = if outcomes.iter().any(|o| o.is_pending()) {
        format!("{done} (backend propagation pending)")
    } else {
        format!("{done} successfully")
    };
    if adjusted {
        message.push_str(" (checkIn adjusted near now to satisfy backend rules)");
    }
    (false, message)
}
