//! Reader-event processor.
//!
//! Consumes unsolicited coding-station events (`{t:"ky", e:"on", oid}`),
//! derives the hardware fingerprint and resolves it to a medium in the
//! background. The only writer of [`ReaderState`].

use crate::domain::fingerprint::{Fingerprint, MALFUNCTION_OBJECT_ID};
use crate::domain::state::ReaderState;
use crate::domain::topics;
use crate::ports::transport::InboundMessage;
use crate::service::query::QueryService;
use serde::Deserialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const KEY_EVENT: &str = "ky";
const KEY_ON: &str = "on";

/// Compact reader payload
#[derive(Debug, Deserialize)]
struct ReaderEvent {
    #[serde(rename = "t")]
    kind: Option<String>,
    #[serde(rename = "e")]
    action: Option<String>,
    oid: Option<String>,
}

/// What a reader message led to
#[derive(Debug)]
pub enum ReaderOutcome {
    /// Other station, other event type, or undecodable
    Ignored,
    /// Reader reported a malfunction; error flag set
    Malfunction,
    /// Fingerprint stored, medium lookup running in the background
    KeyOn {
        fingerprint: Fingerprint,
        lookup: JoinHandle<Option<String>>,
    },
}

pub struct ReaderEventProcessor {
    station_id: String,
    state: Arc<ReaderState>,
    queries: Arc<QueryService>,
}

impl ReaderEventProcessor {
    pub fn new(station_id: String, state: Arc<ReaderState>, queries: Arc<QueryService>) -> Self {
        info!(station_id = %station_id, "Listening on readers/1/{}", station_id);
        Self {
            station_id,
            state,
            queries,
        }
    }

    /// Handle one inbound message; anything not for this station is ignored
    pub fn handle(&self, message: &InboundMessage) -> ReaderOutcome {
        let Some(station) = topics::reader_station(&message.topic) else {
            return ReaderOutcome::Ignored;
        };
        if station != self.station_id {
            return ReaderOutcome::Ignored;
        }
        let Some(event) = message
            .json()
            .and_then(|body| serde_json::from_value::<ReaderEvent>(body).ok())
        else {
            debug!(topic = %message.topic, "Unreadable reader payload");
            return ReaderOutcome::Ignored;
        };

        if event.kind.as_deref() != Some(KEY_EVENT) || event.action.as_deref() != Some(KEY_ON) {
            return ReaderOutcome::Ignored;
        }
        let Some(oid) = event.oid.filter(|oid| !oid.is_empty()) else {
            return ReaderOutcome::Ignored;
        };

        if oid == MALFUNCTION_OBJECT_ID {
            warn!(station_id = %self.station_id, "Reader reported malfunction");
            self.state.set_affe_error();
            return ReaderOutcome::Malfunction;
        }

        let fingerprint = match Fingerprint::derive(&oid) {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                warn!(oid = %oid, error = %e, "Ignoring key event with bad object id");
                return ReaderOutcome::Ignored;
            }
        };
        self.state.set_fingerprint(fingerprint.clone());
        info!(hardware_id = %fingerprint.hex, "Key ON");

        let lookup = self.spawn_lookup(fingerprint.hex.clone());
        ReaderOutcome::KeyOn {
            fingerprint,
            lookup,
        }
    }

    fn spawn_lookup(&self, hardware_id: String) -> JoinHandle<Option<String>> {
        let queries = Arc::clone(&self.queries);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let medium_id = queries.find_entity_id_by_fingerprint(&hardware_id).await;
            if !state.set_medium_for(&hardware_id, medium_id.clone()) {
                debug!(hardware_id = %hardware_id, "Superseded by a newer key event");
                return medium_id;
            }
            match &medium_id {
                Some(id) => info!(medium_id = %id, hardware_id = %hardware_id, "Selected medium"),
                None => warn!(hardware_id = %hardware_id, "No identification medium matched"),
            }
            medium_id
        })
    }
}
