use bytes::Bytes;
use rtp::header::Header as RtpHeader;
use rtq_core::{Datagram, DatagramTransport, FlowId, SendNotify, TransportError};
use std::{fmt, sync::Arc};
use thiserror::Error;
use webrtc_util::{Marshal, Unmarshal};

use crate::buffer::{FlowBuffer, PushOutcome};

#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The payload could not be parsed or built as an RTP packet.
    #[error("invalid RTP packet: {0}")]
    Rtp(#[from] webrtc_util::Error),
    /// The flow was closed and every buffered payload has been read.
    #[error("end of stream")]
    EndOfStream,
    #[error("datagram of {needed} bytes does not fit into a buffer of {capacity} bytes")]
    ShortBuffer { needed: usize, capacity: usize },
}

impl FlowError {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, FlowError::EndOfStream)
    }
}

/// Receiving end of a flow, fed by the session's receive loop.
///
/// Clones share the same buffer, so several tasks may read concurrently; each
/// payload is handed to exactly one of them.
#[derive(Debug, Clone)]
pub struct ReadFlow {
    flow_id: FlowId,
    buffer: Arc<FlowBuffer>,
}

impl ReadFlow {
    pub(crate) fn new(flow_id: FlowId, capacity: usize) -> Self {
        Self {
            flow_id,
            buffer: Arc::new(FlowBuffer::new(capacity)),
        }
    }
    /// Get the flow id
    pub fn flow_id(&self) -> FlowId {
        self.flow_id
    }

    /// Waits for data and copies up to `buf.len()` bytes of the oldest
    /// payload into `buf`.
    ///
    /// `Ok(0)` signals end-of-stream: the session ended and everything
    /// received before has been read. If the session failed instead, the
    /// transport error is returned after the buffered data.
    ///
    /// An empty `buf` also returns `Ok(0)` right away, without consuming
    /// anything; that does not mean end-of-stream.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, FlowError> {
        self.buffer.read(buf).await
    }

    /// Waits for the next payload and returns it whole. `None` signals end-of-stream.
    pub async fn recv(&self) -> Result<Option<Bytes>, FlowError> {
        self.buffer.recv().await
    }

    /// Reads the next payload into `buf` and parses its RTP header.
    ///
    /// Returns the packet length and the header; the RTP payload starts at
    /// `header.marshal_size()` (see [`webrtc_util::MarshalSize`]).
    pub async fn read_rtp(&self, buf: &mut [u8]) -> Result<(usize, RtpHeader), FlowError> {
        let packet = self.recv().await?.ok_or(FlowError::EndOfStream)?;
        if packet.len() > buf.len() {
            return Err(FlowError::ShortBuffer {
                needed: packet.len(),
                capacity: buf.len(),
            });
        }
        let n = packet.len();
        buf[..n].copy_from_slice(&packet);
        let header = RtpHeader::unmarshal(&mut &buf[..n])?;
        Ok((n, header))
    }

    /// Payloads this flow discarded because its buffer was full.
    pub fn dropped_datagrams(&self) -> u64 {
        self.buffer.dropped_datagrams()
    }
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.buffered_bytes()
    }
    pub fn is_closed(&self) -> bool {
        self.buffer.is_closed()
    }

    pub(crate) fn write(&self, payload: Bytes) -> PushOutcome {
        self.buffer.push(payload)
    }
    pub(crate) fn close(&self) {
        self.buffer.close();
    }
    pub(crate) fn close_with_error(&self, error: TransportError) {
        self.buffer.close_with_error(error);
    }
}

/// Sending end of a flow.
///
/// Every write becomes exactly one datagram. Once the session is closed,
/// writes fail with the transport's error.
pub struct WriteFlow<T> {
    flow_id: FlowId,
    connection: Arc<T>,
}

impl<T> Clone for WriteFlow<T> {
    fn clone(&self) -> Self {
        Self {
            flow_id: self.flow_id,
            connection: Arc::clone(&self.connection),
        }
    }
}

impl<T> fmt::Debug for WriteFlow<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteFlow")
            .field("flow_id", &self.flow_id)
            .finish()
    }
}

impl<T: DatagramTransport> WriteFlow<T> {
    pub(crate) fn new(flow_id: FlowId, connection: Arc<T>) -> Self {
        Self {
            flow_id,
            connection,
        }
    }
    /// Get the flow id
    pub fn flow_id(&self) -> FlowId {
        self.flow_id
    }

    /// Sends `buf` as one datagram and returns its length.
    pub async fn write(&self, buf: &[u8]) -> Result<usize, FlowError> {
        let datagram = Datagram::encode_parts(self.flow_id, &[buf]);
        self.connection.send_datagram(datagram).await?;
        Ok(buf.len())
    }

    /// Sends an RTP packet built from `header` and `payload`.
    ///
    /// Returns the packet length, header included.
    pub async fn write_rtp(&self, header: &RtpHeader, payload: &[u8]) -> Result<usize, FlowError> {
        let header = header.marshal()?;
        let datagram = Datagram::encode_parts(self.flow_id, &[&header[..], payload]);
        self.connection.send_datagram(datagram).await?;
        Ok(header.len() + payload.len())
    }

    /// Like [`write_rtp`](Self::write_rtp), but reports when the packet left
    /// the local send path (`on_sent`) and whether it was delivered
    /// (`on_ack`). Does not wait for the acknowledgment.
    ///
    /// Fails with [`TransportError::NotifyUnsupported`] if the transport can't
    /// report the packet's fate.
    pub async fn write_rtp_notify<S, A>(
        &self,
        header: &RtpHeader,
        payload: &[u8],
        on_sent: S,
        on_ack: A,
    ) -> Result<usize, FlowError>
    where
        S: FnOnce() + Send + 'static,
        A: FnOnce(bool) + Send + 'static,
    {
        let header = header.marshal()?;
        let datagram = Datagram::encode_parts(self.flow_id, &[&header[..], payload]);
        let notify = SendNotify::new().with_on_sent(on_sent).with_on_ack(on_ack);
        self.connection.send_datagram_notify(datagram, notify).await?;
        Ok(header.len() + payload.len())
    }
}
