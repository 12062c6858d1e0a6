//! Ports the bridge core depends on.

pub mod outbound;
pub mod transport;

pub use outbound::{Clock, FixedClock, SystemClock};
pub use transport::{InboundMessage, Transport, TransportError, TransportEvent};
