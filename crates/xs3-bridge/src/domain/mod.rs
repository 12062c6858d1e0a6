//! Domain types for the bridge.
//!
//! Pure data and pure functions only; nothing in here touches the network.

pub mod config;
pub mod correlation;
pub mod error;
pub mod fingerprint;
pub mod mobile;
pub mod outcome;
pub mod session;
pub mod state;
pub mod topics;
pub mod window;

pub use config::{BridgeConfig, ConfigError, ConfirmConfig, Credentials, MqttConfig, TimeoutConfig};
pub use correlation::CorrelationId;
pub use error::{BridgeError, BridgeResult};
pub use fingerprint::{Fingerprint, FingerprintError};
pub use mobile::{DisengageParams, MobileServiceMode, MssConfirmRequest};
pub use outcome::{CommandOutcome, CommandStatus};
pub use session::{Session, SessionSlot};
pub use state::{ReaderSnapshot, ReaderState};
pub use window::AccessWindow;
