//! QUIC transport for rtq.
//!
//! [`endpoint::Endpoint`] establishes QUIC connections with datagrams enabled
//! and hands them out as [`QuicConnection`]s, ready to be wrapped in an
//! [`rtq_mux::Session`].

// Transport config module
pub mod config;
// Endpoint module
pub mod endpoint;
// QUIC module
pub mod quic;
// TLS module
pub mod tls;

pub use crate::{config::TransportConfig, endpoint::Endpoint, quic::connection::QuicConnection};
