use thiserror::Error;

/// Errors raised while decoding the flow identifier prefix of a datagram.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("truncated flow identifier: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("non-canonical flow identifier: {value} encoded in {len} bytes")]
    NonCanonical { value: u64, len: usize },
    #[error("flow identifier {0} exceeds the varint range")]
    FlowIdOutOfRange(u64),
}

/// Errors surfaced by a [`DatagramTransport`](crate::transport::DatagramTransport).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The peer closed the connection with the end-of-session code.
    #[error("session ended by peer")]
    SessionEnded,
    /// The connection was closed by this side.
    #[error("connection closed locally")]
    LocallyClosed,
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("datagram of {size} bytes exceeds the maximum of {max} bytes")]
    TooLarge { size: usize, max: usize },
    #[error("datagrams are not supported on this connection")]
    Unsupported,
    #[error("send notification is not supported by this transport")]
    NotifyUnsupported,
}

impl TransportError {
    /// Whether this is the clean end-of-session condition.
    pub fn is_session_end(&self) -> bool {
        matches!(self, TransportError::SessionEnded)
    }
    /// Whether the connection went away in an orderly way: the peer ended the
    /// session or this side closed it.
    pub fn is_orderly_close(&self) -> bool {
        matches!(
            self,
            TransportError::SessionEnded | TransportError::LocallyClosed
        )
    }
}
