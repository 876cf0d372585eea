//! Driver transport client
//!
//! Turns the one-way, event-driven driver socket into an awaitable,
//! timeout-bounded command/response protocol. The client owns the
//! pending-request map keyed by correlation id; the transport behind it
//! is injectable so tests can substitute a fake without global state.

mod client;
mod tcp;
mod transport;

pub use client::{ConnectionState, DriverClient};
pub use tcp::TcpDriverTransport;
pub use transport::DriverTransport;
