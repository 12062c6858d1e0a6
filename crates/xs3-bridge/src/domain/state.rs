//! Shared reader state.
//!
//! Written only by the reader-event processor, read by the command engine and
//! the program orchestrator as the implicit medium selector. Each field is
//! updated on its own; readers get best current knowledge, not a transaction.

use crate::domain::fingerprint::Fingerprint;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

/// Point-in-time copy of the reader state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderSnapshot {
    pub medium_id: Option<String>,
    pub hardware_id_hex: Option<String>,
    pub hardware_id_b64: Option<String>,
    pub affe_error: bool,
}

#[derive(Debug, Default)]
pub struct ReaderState {
    fingerprint: RwLock<Option<Fingerprint>>,
    current_medium_id: RwLock<Option<String>>,
    affe_error: AtomicBool,
}

impl ReaderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fingerprint(&self, fingerprint: Fingerprint) {
        *self.fingerprint.write() = Some(fingerprint);
    }

    pub fn set_current_medium(&self, medium_id: Option<String>) {
        *self.current_medium_id.write() = medium_id;
    }

    /// Store a lookup result only if `fingerprint_hex` is still the latest
    /// fingerprint. Returns false when a newer key event superseded it.
    pub fn set_medium_for(&self, fingerprint_hex: &str, medium_id: Option<String>) -> bool {
        let latest = self
            .fingerprint
            .read()
            .as_ref()
            .is_some_and(|fp| fp.hex == fingerprint_hex);
        if latest {
            self.set_current_medium(medium_id);
        }
        latest
    }

    pub fn set_affe_error(&self) {
        self.affe_error.store(true, Ordering::Release);
    }

    pub fn current_medium_id(&self) -> Option<String> {
        self.current_medium_id.read().clone()
    }

    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.fingerprint.read().clone()
    }

    pub fn affe_error(&self) -> bool {
        self.affe_error.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> ReaderSnapshot {
        let fingerprint = self.fingerprint();
        ReaderSnapshot {
            medium_id: self.current_medium_id(),
            hardware_id_hex: fingerprint.as_ref().map(|fp| fp.hex.clone()),
            hardware_id_b64: fingerprint.map(|fp| fp.base64),
            affe_error: self.affe_error(),
        }
    }
}
