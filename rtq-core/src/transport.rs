use std::{fmt, future::Future};

use bytes::Bytes;

use crate::error::TransportError;

/// Application close code announcing a clean end of session.
pub const END_OF_SESSION_CODE: u64 = 0;
/// Close reason sent along with [`END_OF_SESSION_CODE`].
pub const END_OF_SESSION_REASON: &[u8] = b"eos";

type SentHandler = Box<dyn FnOnce() + Send + 'static>;
type AckHandler = Box<dyn FnOnce(bool) + Send + 'static>;

/// Handlers attached to a single send.
///
/// `on_sent` runs once the datagram has left the local send path, `on_ack`
/// once the transport learns whether it was delivered. Both run on a task
/// owned by the transport and must not block.
#[derive(Default)]
pub struct SendNotify {
    on_sent: Option<SentHandler>,
    on_ack: Option<AckHandler>,
}

impl SendNotify {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_on_sent<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_sent = Some(Box::new(f));
        self
    }
    pub fn with_on_ack<F>(mut self, f: F) -> Self
    where
        F: FnOnce(bool) + Send + 'static,
    {
        self.on_ack = Some(Box::new(f));
        self
    }
    /// Invokes the sent handler, if any. Later calls are no-ops.
    pub fn sent(&mut self) {
        if let Some(f) = self.on_sent.take() {
            f();
        }
    }
    /// Invokes the ack handler, if any. Later calls are no-ops.
    pub fn acked(&mut self, delivered: bool) {
        if let Some(f) = self.on_ack.take() {
            f(delivered);
        }
    }
}

impl fmt::Debug for SendNotify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendNotify")
            .field("on_sent", &self.on_sent.is_some())
            .field("on_ack", &self.on_ack.is_some())
            .finish()
    }
}

/// An established, message-oriented and unreliable connection.
///
/// Messages may be lost but are never split or merged. `recv_datagram` must
/// report a peer's close with [`END_OF_SESSION_CODE`] as
/// [`TransportError::SessionEnded`] so that it can be told apart from any
/// other failure.
pub trait DatagramTransport: Send + Sync + 'static {
    fn send_datagram(&self, datagram: Bytes) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Sends a datagram and reports its fate through `notify`.
    fn send_datagram_notify(
        &self,
        datagram: Bytes,
        notify: SendNotify,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        drop((datagram, notify));
        async { Err(TransportError::NotifyUnsupported) }
    }

    fn recv_datagram(&self) -> impl Future<Output = Result<Bytes, TransportError>> + Send;

    /// Closes the connection. Closing twice has no further effect.
    fn close(&self, code: u64, reason: &[u8]);

    /// Largest datagram the connection currently accepts, if known.
    fn max_datagram_size(&self) -> Option<usize> {
        None
    }
}
