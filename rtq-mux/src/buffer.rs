use bytes::{Buf, Bytes};
use rtq_core::TransportError;
use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tokio::sync::Notify;

use crate::flow::FlowError;

/// Result of appending a datagram to a [`FlowBuffer`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PushOutcome {
    /// The payload was queued.
    Queued,
    /// The payload did not fit and was discarded as a whole.
    Dropped,
    /// The buffer is closed.
    Closed,
}

#[derive(Debug, Default)]
struct BufferState {
    queue: VecDeque<Bytes>,
    buffered: usize,
    dropped: u64,
    closed: bool,
    /// Reported to readers once the queue is drained.
    error: Option<TransportError>,
}

/// Bounded queue of received payloads for one flow.
///
/// Writers never wait: a payload that would push the buffered byte count past
/// the capacity is dropped whole, so a slow reader can't stall the receive
/// loop and never observes a fragment of a dropped payload. Readers wait until
/// data arrives or the buffer is closed.
#[derive(Debug)]
pub struct FlowBuffer {
    capacity: usize,
    state: Mutex<BufferState>,
    notify: Notify,
}

impl FlowBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(BufferState::default()),
            notify: Notify::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a payload without waiting.
    pub fn push(&self, payload: Bytes) -> PushOutcome {
        {
            let mut state = self.state();
            if state.closed {
                return PushOutcome::Closed;
            }
            if payload.is_empty() {
                return PushOutcome::Queued;
            }
            if state.buffered + payload.len() > self.capacity {
                state.dropped += 1;
                return PushOutcome::Dropped;
            }
            state.buffered += payload.len();
            state.queue.push_back(payload);
        }
        self.notify.notify_waiters();
        PushOutcome::Queued
    }

    /// Copies up to `buf.len()` bytes of the oldest payload into `buf`.
    ///
    /// The rest of a partially read payload stays at the front of the queue.
    /// Returns `Ok(0)` once the buffer is closed and drained, and right away
    /// for an empty `buf`.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, FlowError> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.wait(|state| {
            let front = state.queue.front_mut()?;
            let n = front.len().min(buf.len());
            buf[..n].copy_from_slice(&front[..n]);
            if n == front.len() {
                state.queue.pop_front();
            } else {
                front.advance(n);
            }
            state.buffered -= n;
            Some(Ok(n))
        })
        .await
    }

    /// Takes the oldest payload as a whole, `None` once closed and drained.
    pub async fn recv(&self) -> Result<Option<Bytes>, FlowError> {
        self.wait(|state| {
            let payload = state.queue.pop_front()?;
            state.buffered -= payload.len();
            Some(Ok(Some(payload)))
        })
        .await
    }

    /// Runs `take` under the lock until it yields or the buffer is closed
    /// and drained.
    async fn wait<T, F>(&self, mut take: F) -> Result<T, FlowError>
    where
        T: Default,
        F: FnMut(&mut BufferState) -> Option<Result<T, FlowError>>,
    {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a push between check and await wakes us.
            notified.as_mut().enable();
            {
                let mut state = self.state();
                if let Some(result) = take(&mut *state) {
                    return result;
                }
                if state.closed {
                    return match &state.error {
                        Some(e) => Err(FlowError::Transport(e.clone())),
                        None => Ok(T::default()),
                    };
                }
            }
            notified.await;
        }
    }

    /// Marks the buffer closed. Readers see end-of-stream after the queued data.
    pub fn close(&self) {
        self.close_inner(None);
    }

    /// Marks the buffer closed. Readers see `error` after the queued data.
    pub fn close_with_error(&self, error: TransportError) {
        self.close_inner(Some(error));
    }

    fn close_inner(&self, error: Option<TransportError>) {
        {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.closed = true;
            state.error = error;
        }
        self.notify.notify_waiters();
    }

    pub fn buffered_bytes(&self) -> usize {
        self.state().buffered
    }
    pub fn queued_datagrams(&self) -> usize {
        self.state().queue.len()
    }
    /// Payloads discarded because the buffer was full.
    pub fn dropped_datagrams(&self) -> u64 {
        self.state().dropped
    }
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}
