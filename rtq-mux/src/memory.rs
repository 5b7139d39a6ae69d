//! In-process datagram connections.
//!
//! [`pair`] returns two connected ends that behave like a lossy datagram
//! link: a send never waits, and a datagram that finds the peer's queue full
//! is lost. Useful for tests and for wiring two sessions inside one process.

use bytes::Bytes;
use rtq_core::{
    transport::END_OF_SESSION_CODE, DatagramTransport, SendNotify, TransportError,
};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

/// Close code used when a connection is dropped without being closed.
pub const DROPPED_CODE: u64 = 1;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Side {
    A,
    B,
}

#[derive(Debug, Copy, Clone)]
struct CloseInfo {
    by: Side,
    code: u64,
}

/// Close state shared by both ends.
#[derive(Debug, Default)]
struct Link {
    close: Mutex<Option<CloseInfo>>,
    closed: CancellationToken,
}

/// One end of an in-memory datagram link.
#[derive(Debug)]
pub struct MemoryConnection {
    side: Side,
    sender: mpsc::Sender<Bytes>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<Bytes>>,
    link: Arc<Link>,
    max_datagram_size: Option<usize>,
}

/// Creates a connected pair whose receive queues hold up to `capacity`
/// datagrams each.
pub fn pair(capacity: usize) -> (MemoryConnection, MemoryConnection) {
    let capacity = capacity.max(1);
    let (a_sender, b_receiver) = mpsc::channel(capacity);
    let (b_sender, a_receiver) = mpsc::channel(capacity);
    let link = Arc::new(Link::default());
    let a = MemoryConnection {
        side: Side::A,
        sender: a_sender,
        receiver: tokio::sync::Mutex::new(a_receiver),
        link: Arc::clone(&link),
        max_datagram_size: None,
    };
    let b = MemoryConnection {
        side: Side::B,
        sender: b_sender,
        receiver: tokio::sync::Mutex::new(b_receiver),
        link,
        max_datagram_size: None,
    };
    (a, b)
}

impl MemoryConnection {
    /// Rejects datagrams larger than `size` bytes.
    pub fn with_max_datagram_size(mut self, size: usize) -> Self {
        self.max_datagram_size = Some(size);
        self
    }

    /// The error this end reports once the link is closed.
    fn close_error(&self) -> TransportError {
        let close = *self.link.close.lock().unwrap_or_else(PoisonError::into_inner);
        match close {
            Some(CloseInfo { by, .. }) if by == self.side => TransportError::LocallyClosed,
            Some(CloseInfo { code, .. }) if code == END_OF_SESSION_CODE => {
                TransportError::SessionEnded
            }
            Some(CloseInfo { code, .. }) => {
                TransportError::ConnectionLost(format!("closed by peer with code {}", code))
            }
            None => TransportError::ConnectionLost("peer went away".to_string()),
        }
    }

    /// Hands a datagram to the peer. `Ok(false)` means it was lost.
    fn deliver(&self, datagram: Bytes) -> Result<bool, TransportError> {
        if self.link.closed.is_cancelled() {
            return Err(self.close_error());
        }
        if let Some(max) = self.max_datagram_size {
            if datagram.len() > max {
                return Err(TransportError::TooLarge {
                    size: datagram.len(),
                    max,
                });
            }
        }
        match self.sender.try_send(datagram) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(datagram)) => {
                tracing::trace!("Peer queue full, lost datagram of {} bytes", datagram.len());
                Ok(false)
            }
            Err(TrySendError::Closed(_)) => Err(self.close_error()),
        }
    }
}

impl DatagramTransport for MemoryConnection {
    async fn send_datagram(&self, datagram: Bytes) -> Result<(), TransportError> {
        self.deliver(datagram).map(|_| ())
    }

    async fn send_datagram_notify(
        &self,
        datagram: Bytes,
        mut notify: SendNotify,
    ) -> Result<(), TransportError> {
        let delivered = self.deliver(datagram)?;
        notify.sent();
        tokio::spawn(async move {
            notify.acked(delivered);
        });
        Ok(())
    }

    /// Datagrams queued before the link closed are still delivered.
    async fn recv_datagram(&self) -> Result<Bytes, TransportError> {
        let mut receiver = self.receiver.lock().await;
        tokio::select! {
            biased;
            message = receiver.recv() => match message {
                Some(message) => Ok(message),
                None => Err(self.close_error()),
            },
            _ = self.link.closed.cancelled() => Err(self.close_error()),
        }
    }

    fn close(&self, code: u64, _reason: &[u8]) {
        {
            let mut close = self.link.close.lock().unwrap_or_else(PoisonError::into_inner);
            if close.is_none() {
                *close = Some(CloseInfo {
                    by: self.side,
                    code,
                });
            }
        }
        self.link.closed.cancel();
    }

    fn max_datagram_size(&self) -> Option<usize> {
        self.max_datagram_size
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.close(DROPPED_CODE, b"dropped");
    }
}
