//! Core components for rtq.
//!
//! rtq multiplexes independent flows (typically RTP and RTCP streams) over the
//! unreliable datagrams of a single connection. Each datagram carries one
//! payload prefixed with the varint-encoded ID of its flow. RTP headers are
//! handled by the `rtp` crate in the layers above.

pub mod codec;
pub mod datagram;
pub mod default;
pub mod error;
pub mod flow;
pub mod transport;

pub use datagram::Datagram;
pub use error::{FramingError, TransportError};
pub use flow::FlowId;
pub use transport::{DatagramTransport, SendNotify};
