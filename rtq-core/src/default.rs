use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    time::Duration,
};

// Default values for the configuration

/// The default capacity of a read flow's buffer, in bytes. (1MB)
pub const DEFAULT_FLOW_BUFFER_SIZE: usize = 1024 * 1024;

/// The default size of the transport's datagram receive buffer, in bytes. (1MB)
pub const DEFAULT_DATAGRAM_RECEIVE_BUFFER_SIZE: usize = 1024 * 1024;
/// The default size of the transport's datagram send buffer, in bytes. (1MB)
pub const DEFAULT_DATAGRAM_SEND_BUFFER_SIZE: usize = 1024 * 1024;

/// The default connection timeout.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
/// The default keep-alive interval.
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(5);
/// The default idle timeout.
pub const DEFAULT_MAX_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Payload size the demo programs use for RTP packets.
pub const DEFAULT_MTU: usize = 1400;

pub const DEFAULT_BIND_PORT: u16 = 0;
pub const DEFAULT_BIND_V4_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_BIND_PORT);
pub const DEFAULT_BIND_V6_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), DEFAULT_BIND_PORT);
pub const DEFAULT_SERVER_PORT: u16 = 4242;
pub const LOCALHOST_SERVER_V4_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_SERVER_PORT);
pub const DEFAULT_SERVER_V4_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_SERVER_PORT);

/// The default server name presented in TLS.
pub const DEFAULT_SERVER_NAME: &str = "localhost";
/// ALPN protocol identifier.
pub const DEFAULT_ALPN: &[u8] = b"rtq";
