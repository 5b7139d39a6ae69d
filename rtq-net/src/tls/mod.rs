//! TLS 1.3 setup for QUIC connections.

pub mod cert;
pub mod config;
pub mod verifier;

pub use cert::{generate_self_signed, Identity};
pub use config::{make_client_config, make_server_config, ServerVerification};
