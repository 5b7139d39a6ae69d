//! Flow multiplexing for rtq.
//!
//! A [`Session`] wraps one datagram connection. Write flows prefix every
//! payload with their flow ID; the session's receive loop strips the prefix
//! and queues the payload on the matching read flow.

// Flow buffer module
pub mod buffer;
// Session config module
pub mod config;
// Flow module
pub mod flow;
// In-memory transport module
pub mod memory;
// Session module
pub mod session;

pub use rtq_core::FlowId;

pub use crate::{
    config::SessionConfig,
    flow::{FlowError, ReadFlow, WriteFlow},
    session::{Session, SessionError, SessionId, SessionState},
};
