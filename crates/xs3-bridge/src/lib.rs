//! # XS3 Bridge - Request/response RPC over the Xesar 3 MQTT API
//!
//! The backend only speaks fire-and-forget MQTT: every operation is a publish
//! whose outcome arrives later on another topic, correlated by an embedded id.
//! This crate turns that substrate into awaitable calls.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         HTTP collaborators                           │
//! └──────────────┬───────────────────┬──────────────────────┬────────────┘
//!                │                   │                      │
//!        ┌───────┴──────┐   ┌────────┴───────┐   ┌──────────┴─────────┐
//!        │ QueryService │◄──│ CommandEngine  │◄──│ ProgramOrchestrator│
//!        └───────┬──────┘   └────────┬───────┘   └────────────────────┘
//!                │                   │
//!        ┌───────┴───────────────────┴───────┐      ┌──────────────────┐
//!        │   WaiterRegistry (correlation)    │      │ ReaderEvent      │
//!        └───────────────┬───────────────────┘      │ Processor        │
//!                        │ dispatch()               └────────┬─────────┘
//!        ┌───────────────┴───────────────────────────────────┴─────────┐
//!        │  Bridge (context)  ◄── TransportEvent ──  EventListener     │
//!        └───────────────┬─────────────────────────────────────────────┘
//!                        │ publish() / subscribe()
//!        ┌───────────────┴──────────────┐
//!        │ Transport: Mqtt | InMemory   │
//!        └──────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use xs3_bridge::{adapters::mqtt, Bridge, BridgeConfig, EventListener};
//!
//! let config = BridgeConfig::default();
//! let (transport, connection) = mqtt::connect(&config.mqtt)?;
//! let bridge = Arc::new(Bridge::new(config, Arc::new(transport))?);
//! let (tx, rx) = tokio::sync::mpsc::channel(1024);
//! tokio::spawn(connection.run(tx));
//! tokio::spawn(EventListener::new(Arc::clone(&bridge), rx).run());
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod bridge;
pub mod domain;
pub mod envelope;
pub mod ipc;
pub mod ports;
pub mod service;

pub use bridge::Bridge;
pub use domain::config::{BridgeConfig, ConfigError};
pub use domain::error::{BridgeError, BridgeResult};
pub use domain::outcome::{CommandOutcome, CommandStatus};
pub use envelope::ApiEnvelope;
pub use ipc::{EventListener, WaiterRegistry};
pub use ports::transport::{InboundMessage, Transport, TransportError, TransportEvent};
pub use service::{
    CommandEngine, LoginState, ProgramOrchestrator, QueryParams, QueryService, SmartphoneService,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
