use crate::{
    buffer::PushOutcome,
    config::SessionConfig,
    flow::{ReadFlow, WriteFlow},
};
use bytes::Bytes;
use nohash_hasher::IntMap;
use rtq_core::{
    transport::{END_OF_SESSION_CODE, END_OF_SESSION_REASON},
    Datagram, DatagramTransport, FlowId, TransportError,
};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};
use thiserror::Error;
use tokio_util::{sync::CancellationToken, task::AbortOnDropHandle};
use tracing::Instrument;

static NEXT_SESSION_ID: AtomicU32 = AtomicU32::new(1);

/// Process-local identifier of a session, used in logs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(u32);

impl SessionId {
    pub fn next() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst))
    }
    pub fn id(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session already closed")]
    AlreadyClosed,
    #[error("session receive loop has stopped")]
    Stopped,
    #[error("no tokio runtime to run the session receive loop")]
    NoRuntime,
    #[error("invalid session config: {0}")]
    InvalidConfig(String),
}

/// The receive loop state
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SessionState {
    /// Receiving and dispatching datagrams
    Running,
    /// Closing every read flow
    Draining,
    /// The loop has exited
    Stopped,
}

struct FlowTable {
    flows: IntMap<FlowId, ReadFlow>,
    state: SessionState,
    /// Set when the loop stopped on anything but an orderly close.
    failure: Option<TransportError>,
}

/// State shared between the session handle and its receive loop.
struct Shared {
    session_id: SessionId,
    table: RwLock<FlowTable>,
    stopped: CancellationToken,
}

impl Shared {
    fn table(&self) -> RwLockReadGuard<'_, FlowTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn table_mut(&self) -> RwLockWriteGuard<'_, FlowTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn flow(&self, flow_id: FlowId) -> Option<ReadFlow> {
        self.table().flows.get(&flow_id).cloned()
    }

    /// Closes every registered flow and stops the session. Only the first
    /// call has an effect.
    ///
    /// After a clean end of session (or a local close) readers get
    /// end-of-stream; after any other failure they get the transport error.
    fn teardown(&self, cause: TransportError) {
        let mut table = self.table_mut();
        if table.state != SessionState::Running {
            return;
        }
        table.state = SessionState::Draining;

        let orderly = cause.is_orderly_close();
        let flows = std::mem::take(&mut table.flows);
        tracing::debug!("Session {}: closing {} flows", self.session_id, flows.len());
        for flow in flows.into_values() {
            if orderly {
                flow.close();
            } else {
                flow.close_with_error(cause.clone());
            }
        }

        if !orderly {
            table.failure = Some(cause);
        }
        table.state = SessionState::Stopped;
        drop(table);
        self.stopped.cancel();
    }
}

/// Demultiplexes incoming datagrams into the registered read flows.
struct ReceiveLoop<T> {
    connection: Arc<T>,
    shared: Arc<Shared>,
}

impl<T: DatagramTransport> ReceiveLoop<T> {
    async fn run(self) {
        tracing::info!("Session {} receive loop started", self.shared.session_id);
        let cause = loop {
            match self.connection.recv_datagram().await {
                Ok(message) => self.dispatch(message),
                Err(e) => break e,
            }
        };

        if cause.is_session_end() {
            tracing::info!("Session {} ended by peer", self.shared.session_id);
        } else if cause.is_orderly_close() {
            tracing::info!("Session {} closed locally", self.shared.session_id);
        } else {
            tracing::error!(
                "Session {} failed to receive datagram: {}",
                self.shared.session_id,
                cause
            );
        }
        self.shared.teardown(cause);
        tracing::info!("Session {} receive loop stopped", self.shared.session_id);
    }

    /// Routes one message. Never waits on a flow: a full or closed flow loses
    /// the payload and the loop moves on.
    fn dispatch(&self, message: Bytes) {
        let len = message.len();
        let datagram = match Datagram::decode(message) {
            Ok(datagram) => datagram,
            Err(e) => {
                tracing::debug!("Dropping malformed datagram of {} bytes: {}", len, e);
                return;
            }
        };

        // TODO: create flows lazily for unknown IDs once there is a way to announce them.
        let Some(flow) = self.shared.flow(datagram.flow_id) else {
            tracing::debug!("Dropping datagram for unknown flow {}", datagram.flow_id);
            return;
        };

        let payload_len = datagram.payload.len();
        match flow.write(datagram.payload) {
            PushOutcome::Queued => {}
            PushOutcome::Dropped => {
                tracing::trace!(
                    "Flow {} buffer full, dropped {} bytes",
                    datagram.flow_id,
                    payload_len
                );
            }
            PushOutcome::Closed => {
                tracing::debug!(
                    "Flow {} is closed, dropped {} bytes",
                    datagram.flow_id,
                    payload_len
                );
            }
        }
    }
}

/// A flow-multiplexing session over one datagram connection.
///
/// Creating the session starts a receive loop that routes every incoming
/// datagram to the [`ReadFlow`] registered for its flow ID. The loop runs
/// until the peer ends the session, the session is closed or the connection
/// fails; on exit it closes every read flow.
pub struct Session<T> {
    session_id: SessionId,
    connection: Arc<T>,
    config: SessionConfig,
    shared: Arc<Shared>,
    closed: AtomicBool,
    /// Receive loop handle
    handle: AbortOnDropHandle<()>,
}

impl<T: DatagramTransport> Session<T> {
    /// Wraps an established connection with the default configuration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(connection: T) -> Result<Self, SessionError> {
        Self::with_config(connection, SessionConfig::default())
    }

    pub fn with_config(connection: T, config: SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| SessionError::NoRuntime)?;

        let session_id = SessionId::next();
        let connection = Arc::new(connection);
        let shared = Arc::new(Shared {
            session_id,
            table: RwLock::new(FlowTable {
                flows: IntMap::default(),
                state: SessionState::Running,
                failure: None,
            }),
            stopped: CancellationToken::new(),
        });

        let receive_loop = ReceiveLoop {
            connection: Arc::clone(&connection),
            shared: Arc::clone(&shared),
        };
        let handle = runtime.spawn(
            receive_loop
                .run()
                .instrument(tracing::debug_span!("session", id = %session_id)),
        );

        Ok(Session {
            session_id,
            connection,
            config,
            shared,
            closed: AtomicBool::new(false),
            handle: AbortOnDropHandle::new(handle),
        })
    }

    /// Returns a sending end for `flow_id`. Nothing is registered; any number
    /// of write flows may share an ID.
    pub fn open_write_flow(&self, flow_id: impl Into<FlowId>) -> WriteFlow<T> {
        WriteFlow::new(flow_id.into(), Arc::clone(&self.connection))
    }

    /// Registers a receiving end for `flow_id`.
    ///
    /// Only datagrams that arrive after this call are delivered. A flow
    /// previously accepted under the same ID is replaced and closed.
    pub fn accept_flow(&self, flow_id: impl Into<FlowId>) -> Result<ReadFlow, SessionError> {
        let flow_id = flow_id.into();
        let flow = ReadFlow::new(flow_id, self.config.flow_buffer_size);

        let mut table = self.shared.table_mut();
        if table.state != SessionState::Running {
            return Err(SessionError::Stopped);
        }
        if let Some(previous) = table.flows.insert(flow_id, flow.clone()) {
            previous.close();
            tracing::debug!("Session {}: flow {} replaced", self.session_id, flow_id);
        } else {
            tracing::debug!("Session {}: flow {} accepted", self.session_id, flow_id);
        }
        Ok(flow)
    }

    /// Closes the connection with the end-of-session code, which makes the
    /// peer close all of its read flows.
    pub fn close(&self) -> Result<(), SessionError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(SessionError::AlreadyClosed);
        }
        tracing::info!("Session {} closing", self.session_id);
        self.connection.close(END_OF_SESSION_CODE, END_OF_SESSION_REASON);
        Ok(())
    }

    /// Waits until the receive loop has stopped and every read flow is closed.
    ///
    /// Returns the transport error if the loop stopped on anything but an end
    /// of session or a local close.
    pub async fn stopped(&self) -> Result<(), TransportError> {
        self.shared.stopped.cancelled().await;
        match &self.shared.table().failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.table().state
    }

    pub fn is_active(&self) -> bool {
        !self.shared.stopped.is_cancelled()
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The underlying connection.
    pub fn connection(&self) -> &T {
        &self.connection
    }
}

impl<T> Drop for Session<T> {
    fn drop(&mut self) {
        // The loop is aborted along with the handle; release its readers.
        self.shared.teardown(TransportError::LocallyClosed);
    }
}

impl<T> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{flow::FlowError, memory};
    use rtp::header::Header as RtpHeader;
    use webrtc_util::MarshalSize;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn session_pair(
        config: SessionConfig,
    ) -> (Session<memory::MemoryConnection>, Session<memory::MemoryConnection>) {
        let (a, b) = memory::pair(64);
        let writer = Session::with_config(a, config.clone()).unwrap();
        let reader = Session::with_config(b, config).unwrap();
        (writer, reader)
    }

    async fn read_string(flow: &ReadFlow) -> String {
        let mut buf = [0u8; 64];
        let n = timeout(WAIT, flow.read(&mut buf))
            .await
            .expect("read timed out")
            .expect("read failed");
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[tokio::test]
    async fn test_flows_are_isolated() {
        let (s1, s2) = session_pair(SessionConfig::default());
        let a = s2.accept_flow(1u32).unwrap();
        let b = s2.accept_flow(2u32).unwrap();
        let wa = s1.open_write_flow(1u32);
        let wb = s1.open_write_flow(2u32);

        wa.write(b"a1").await.unwrap();
        wb.write(b"b1").await.unwrap();
        wb.write(b"b2").await.unwrap();
        wa.write(b"a2").await.unwrap();

        assert_eq!(read_string(&b).await, "b1");
        assert_eq!(read_string(&b).await, "b2");
        assert_eq!(read_string(&a).await, "a1");
        assert_eq!(read_string(&a).await, "a2");
    }

    #[tokio::test]
    async fn test_full_flow_does_not_stall_other_flows() {
        let (s1, s2) = session_pair(SessionConfig::new().with_flow_buffer_size(8));
        let a = s2.accept_flow(1u32).unwrap();
        let b = s2.accept_flow(2u32).unwrap();
        let wa = s1.open_write_flow(1u32);
        let wb = s1.open_write_flow(2u32);

        wa.write(b"aaaaaa").await.unwrap();
        // Does not fit the remaining two bytes of A's buffer.
        wa.write(b"bbbbbb").await.unwrap();
        wb.write(b"cc").await.unwrap();

        assert_eq!(read_string(&b).await, "cc");
        assert_eq!(a.dropped_datagrams(), 1);
        assert_eq!(read_string(&a).await, "aaaaaa");

        wa.write(b"dd").await.unwrap();
        assert_eq!(read_string(&a).await, "dd");
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_datagrams_are_dropped() {
        let (s1, s2) = session_pair(SessionConfig::default());
        let flow = s2.accept_flow(7u32).unwrap();

        s1.open_write_flow(8u32).write(b"lost").await.unwrap();
        // Truncated 4-byte varint.
        s1.connection()
            .send_datagram(Bytes::from_static(&[0x80, 0x01]))
            .await
            .unwrap();
        s1.open_write_flow(7u32).write(b"kept").await.unwrap();

        assert_eq!(read_string(&flow).await, "kept");
        assert_eq!(s2.state(), SessionState::Running);
    }

    #[tokio::test]
    async fn test_data_before_accept_is_dropped() {
        let (s1, s2) = session_pair(SessionConfig::default());
        let writer = s1.open_write_flow(3u32);
        writer.write(b"early").await.unwrap();
        // Let the receive loop see the early datagram.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let flow = s2.accept_flow(3u32).unwrap();
        writer.write(b"late").await.unwrap();
        assert_eq!(read_string(&flow).await, "late");
    }

    #[tokio::test]
    async fn test_accept_replaces_previous_flow() {
        let (s1, s2) = session_pair(SessionConfig::default());
        let first = s2.accept_flow(5u32).unwrap();
        let second = s2.accept_flow(5u32).unwrap();
        assert!(first.is_closed());

        s1.open_write_flow(5u32).write(b"new").await.unwrap();
        assert_eq!(read_string(&second).await, "new");
        assert_eq!(read_string(&first).await, "");
    }

    #[tokio::test]
    async fn test_peer_close_ends_every_flow() {
        let (s1, s2) = session_pair(SessionConfig::default());
        let flows = vec![s2.accept_flow(1u32).unwrap(), s2.accept_flow(2u32).unwrap()];
        let pending: Vec<_> = flows
            .iter()
            .cloned()
            .map(|flow| {
                tokio::spawn(async move {
                    let mut buf = [0u8; 16];
                    flow.read(&mut buf).await
                })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(20)).await;

        s1.close().unwrap();
        for reader in futures::future::join_all(pending).await {
            assert_eq!(reader.unwrap().unwrap(), 0);
        }

        timeout(WAIT, s2.stopped()).await.unwrap().unwrap();
        assert_eq!(s2.state(), SessionState::Stopped);
        for flow in &flows {
            assert_eq!(read_string(flow).await, "");
        }
        assert_eq!(s2.accept_flow(3u32).unwrap_err(), SessionError::Stopped);
    }

    #[tokio::test]
    async fn test_local_close() {
        let (s1, _s2) = session_pair(SessionConfig::default());
        let flow = s1.accept_flow(1u32).unwrap();
        let writer = s1.open_write_flow(1u32);

        s1.close().unwrap();
        assert_eq!(s1.close(), Err(SessionError::AlreadyClosed));

        timeout(WAIT, s1.stopped()).await.unwrap().unwrap();
        assert_eq!(read_string(&flow).await, "");
        assert_eq!(s1.state(), SessionState::Stopped);
        match writer.write(b"too late").await {
            Err(FlowError::Transport(TransportError::LocallyClosed)) => {}
            other => panic!("unexpected write result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_write_after_peer_ended_session() {
        let (s1, s2) = session_pair(SessionConfig::default());
        let writer = s2.open_write_flow(1u32);
        writer.write(b"before").await.unwrap();

        s1.close().unwrap();
        timeout(WAIT, s2.stopped()).await.unwrap().unwrap();

        match writer.write(b"after").await {
            Err(FlowError::Transport(TransportError::SessionEnded)) => {}
            other => panic!("unexpected write result: {:?}", other),
        }
        let header = RtpHeader {
            version: 2,
            ..Default::default()
        };
        assert!(matches!(
            writer.write_rtp(&header, b"late").await,
            Err(FlowError::Transport(TransportError::SessionEnded))
        ));
    }

    #[tokio::test]
    async fn test_connection_failure_reaches_readers() {
        let (s1, s2) = session_pair(SessionConfig::default());
        let flow = s2.accept_flow(1u32).unwrap();
        s1.open_write_flow(1u32).write(b"before").await.unwrap();
        assert_eq!(read_string(&flow).await, "before");

        s1.connection().close(0x10, b"internal error");

        let result = timeout(WAIT, s2.stopped()).await.unwrap();
        assert!(matches!(result, Err(TransportError::ConnectionLost(_))));
        let mut buf = [0u8; 16];
        assert!(matches!(
            flow.read(&mut buf).await,
            Err(FlowError::Transport(TransportError::ConnectionLost(_)))
        ));
    }

    #[tokio::test]
    async fn test_dropping_session_releases_readers() {
        let (_s1, s2) = session_pair(SessionConfig::default());
        let flow = s2.accept_flow(1u32).unwrap();
        drop(s2);
        assert_eq!(read_string(&flow).await, "");
    }

    #[tokio::test]
    async fn test_rtp_round_trip_with_notify() {
        let (s1, s2) = session_pair(SessionConfig::default());
        let flow = s2.accept_flow(0u32).unwrap();
        let writer = s1.open_write_flow(0u32);

        let header = RtpHeader {
            version: 2,
            marker: true,
            payload_type: 96,
            sequence_number: 1,
            timestamp: 90_000,
            ssrc: 0xdead_beef,
            ..Default::default()
        };
        let (sent_tx, sent_rx) = tokio::sync::oneshot::channel();
        let (ack_tx, ack_rx) = tokio::sync::oneshot::channel();
        let n = writer
            .write_rtp_notify(
                &header,
                b"frame",
                move || {
                    let _ = sent_tx.send(());
                },
                move |delivered| {
                    let _ = ack_tx.send(delivered);
                },
            )
            .await
            .unwrap();
        assert_eq!(n, header.marshal_size() + 5);
        timeout(WAIT, sent_rx).await.unwrap().unwrap();
        assert!(timeout(WAIT, ack_rx).await.unwrap().unwrap());

        let mut buf = [0u8; 64];
        let (len, parsed) = timeout(WAIT, flow.read_rtp(&mut buf)).await.unwrap().unwrap();
        assert_eq!(len, n);
        assert_eq!(parsed, header);
        assert_eq!(&buf[parsed.marshal_size()..len], b"frame");
    }

    #[tokio::test]
    async fn test_read_rtp_errors() {
        let (s1, s2) = session_pair(SessionConfig::default());
        let flow = s2.accept_flow(0u32).unwrap();
        let writer = s1.open_write_flow(0u32);

        writer.write(b"not rtp").await.unwrap();
        let mut buf = [0u8; 64];
        assert!(matches!(
            timeout(WAIT, flow.read_rtp(&mut buf)).await.unwrap(),
            Err(FlowError::Rtp(_))
        ));

        writer
            .write_rtp(
                &RtpHeader {
                    version: 2,
                    ..Default::default()
                },
                &[0u8; 100],
            )
            .await
            .unwrap();
        assert!(matches!(
            timeout(WAIT, flow.read_rtp(&mut buf)).await.unwrap(),
            Err(FlowError::ShortBuffer { needed: 112, capacity: 64 })
        ));

        s1.close().unwrap();
        let result = timeout(WAIT, flow.read_rtp(&mut buf)).await.unwrap();
        assert!(result.unwrap_err().is_end_of_stream());
    }

    #[test]
    fn test_new_session_requires_runtime() {
        let (a, _b) = memory::pair(1);
        assert_eq!(Session::new(a).unwrap_err(), SessionError::NoRuntime);
    }

    #[tokio::test]
    async fn test_invalid_config() {
        let (a, _b) = memory::pair(1);
        let config = SessionConfig::new().with_flow_buffer_size(0);
        assert!(matches!(
            Session::with_config(a, config),
            Err(SessionError::InvalidConfig(_))
        ));
    }
}
