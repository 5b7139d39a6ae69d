use bytes::Bytes;
use quinn::{ConnectionError, SendDatagramError, VarInt};
use rtq_core::{transport::END_OF_SESSION_CODE, DatagramTransport, TransportError};
use std::net::SocketAddr;

/// A QUIC connection carrying rtq datagrams.
#[derive(Debug, Clone)]
pub struct QuicConnection {
    connection: quinn::Connection,
}

impl QuicConnection {
    pub fn new(connection: quinn::Connection) -> Self {
        Self { connection }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.connection.remote_address()
    }

    /// The underlying [`quinn::Connection`].
    pub fn inner(&self) -> &quinn::Connection {
        &self.connection
    }

    fn send_error(&self, error: SendDatagramError, size: usize) -> TransportError {
        match error {
            SendDatagramError::TooLarge => TransportError::TooLarge {
                size,
                max: self.connection.max_datagram_size().unwrap_or(0),
            },
            SendDatagramError::UnsupportedByPeer | SendDatagramError::Disabled => {
                TransportError::Unsupported
            }
            SendDatagramError::ConnectionLost(e) => connection_error(e),
        }
    }
}

/// Maps why a connection went away. Only an application close carrying the
/// end-of-session code counts as an orderly end.
fn connection_error(error: ConnectionError) -> TransportError {
    match error {
        ConnectionError::ApplicationClosed(close)
            if close.error_code.into_inner() == END_OF_SESSION_CODE =>
        {
            TransportError::SessionEnded
        }
        ConnectionError::LocallyClosed => TransportError::LocallyClosed,
        e => TransportError::ConnectionLost(e.to_string()),
    }
}

impl DatagramTransport for QuicConnection {
    async fn send_datagram(&self, datagram: Bytes) -> Result<(), TransportError> {
        let size = datagram.len();
        self.connection
            .send_datagram_wait(datagram)
            .await
            .map_err(|e| self.send_error(e, size))
    }

    async fn recv_datagram(&self) -> Result<Bytes, TransportError> {
        self.connection.read_datagram().await.map_err(connection_error)
    }

    fn close(&self, code: u64, reason: &[u8]) {
        let code = VarInt::from_u64(code).unwrap_or(VarInt::MAX);
        self.connection.close(code, reason);
    }

    fn max_datagram_size(&self) -> Option<usize> {
        self.connection.max_datagram_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quinn::ApplicationClose;

    #[test]
    fn test_connection_error_mapping() {
        let eos = ConnectionError::ApplicationClosed(ApplicationClose {
            error_code: VarInt::from_u32(0),
            reason: Bytes::from_static(b"eos"),
        });
        assert_eq!(connection_error(eos), TransportError::SessionEnded);

        // Same reason, different code: not an orderly end.
        let other = ConnectionError::ApplicationClosed(ApplicationClose {
            error_code: VarInt::from_u32(1),
            reason: Bytes::from_static(b"eos"),
        });
        assert!(matches!(connection_error(other), TransportError::ConnectionLost(_)));

        assert_eq!(
            connection_error(ConnectionError::LocallyClosed),
            TransportError::LocallyClosed
        );
        assert!(matches!(
            connection_error(ConnectionError::TimedOut),
            TransportError::ConnectionLost(_)
        ));
    }
}
