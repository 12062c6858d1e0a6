//! Transport adapters.
//!
//! `mqtt` talks to a real broker over TLS; `memory` records traffic for tests
//! and scripted backends. Both sit behind [`Transport`](crate::ports::Transport).

pub mod memory;
pub mod mqtt;

pub use memory::{InMemoryTransport, Published};
pub use mqtt::{MqttConnection, MqttTransport};
