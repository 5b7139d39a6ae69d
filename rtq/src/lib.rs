//! rtq multiplexes RTP flows over QUIC datagrams.
//!
//! ```no_run
//! use rtq::{mux::Session, net::{Endpoint, TransportConfig}};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = TransportConfig::new()?;
//! let endpoint = Endpoint::server("0.0.0.0:4242".parse()?, &config)?;
//! if let Some(connection) = endpoint.accept().await? {
//!     let session = Session::new(connection)?;
//!     let flow = session.accept_flow(0u32)?;
//!     let mut buf = vec![0u8; 1500];
//!     while let Ok((len, header)) = flow.read_rtp(&mut buf).await {
//!         println!("seq {} ({} bytes)", header.sequence_number, len);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub use rtq_core as core;
pub use rtq_mux as mux;
pub use rtq_net as net;

pub use rtq_core::{Datagram, FlowId, TransportError};
pub use rtq_mux::{FlowError, ReadFlow, Session, SessionConfig, SessionError, WriteFlow};
