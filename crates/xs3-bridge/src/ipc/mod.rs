//! Correlation of inbound traffic with outstanding requests.

pub mod listener;
pub mod waiters;

pub use listener::EventListener;
pub use waiters::{Waiter, WaiterRegistry, WaiterStats};
