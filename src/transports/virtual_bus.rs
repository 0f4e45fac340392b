//! In-memory transport for bench work without an adapter

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info, trace};

use crate::sync::lock;
use crate::transport::{Transport, TransportError};
use crate::types::{Bitrate, Frame};

/// A simulated bus segment.
///
/// Cloning yields another handle onto the same segment: hand one clone to a
/// [`BusSession`](crate::BusSession) and keep the other to play the ECU side,
/// injecting traffic and inspecting what the session transmitted.
#[derive(Clone)]
pub struct VirtualBus {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<BusState>,
    inbound_tx: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<Frame, TransportError>>>,
    sent_notify: Notify,
}

#[derive(Default)]
struct BusState {
    open: Option<(String, Bitrate)>,
    open_failure: Option<TransportError>,
    send_failures: VecDeque<TransportError>,
    sent: Vec<Frame>,
}

impl Default for VirtualBus {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualBus {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(BusState::default()),
                inbound_tx,
                inbound_rx: tokio::sync::Mutex::new(inbound_rx),
                sent_notify: Notify::new(),
            }),
        }
    }

    /// Queue a frame as if an ECU had transmitted it.
    pub fn inject(&self, frame: Frame) {
        trace!(%frame, "Injecting frame");
        let _ = self.inner.inbound_tx.send(Ok(frame));
    }

    /// Queue a driver fault to be returned by the next poll.
    pub fn inject_error(&self, error: TransportError) {
        let _ = self.inner.inbound_tx.send(Err(error));
    }

    /// Make the next `open` fail with `error`.
    pub fn fail_next_open(&self, error: TransportError) {
        lock(&self.inner.state).open_failure = Some(error);
    }

    /// Make the next `send` fail with `error`. Failures queue up in order.
    pub fn fail_next_send(&self, error: TransportError) {
        lock(&self.inner.state).send_failures.push_back(error);
    }

    /// Frames accepted so far, in wire order.
    pub fn sent_frames(&self) -> Vec<Frame> {
        lock(&self.inner.state).sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        lock(&self.inner.state).sent.len()
    }

    /// Forget previously sent frames.
    pub fn clear_sent(&self) {
        lock(&self.inner.state).sent.clear();
    }

    pub fn is_open(&self) -> bool {
        lock(&self.inner.state).open.is_some()
    }

    /// Wait until at least `count` frames were sent, or `timeout` elapses.
    ///
    /// Returns the number of frames sent when it stopped waiting.
    pub async fn wait_for_sent(&self, count: usize, timeout: Duration) -> usize {
        let wait = async {
            loop {
                let notified = self.inner.sent_notify.notified();
                if self.sent_count() >= count {
                    return;
                }
                notified.await;
            }
        };
        let _ = tokio::time::timeout(timeout, wait).await;
        self.sent_count()
    }
}

#[async_trait::async_trait]
impl Transport for VirtualBus {
    async fn open(&self, channel: &str, bitrate: Bitrate) -> Result<(), TransportError> {
        let mut state = lock(&self.inner.state);
        if let Some(error) = state.open_failure.take() {
            return Err(error);
        }
        if let Some((open_channel, _)) = &state.open {
            return Err(TransportError::Busy { channel: open_channel.clone() });
        }
        state.open = Some((channel.to_string(), bitrate));
        info!(channel, %bitrate, "Virtual bus opened");
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if let Some((channel, _)) = lock(&self.inner.state).open.take() {
            debug!(channel, "Virtual bus closed");
        }
        Ok(())
    }

    async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        {
            let mut state = lock(&self.inner.state);
            if state.open.is_none() {
                return Err(TransportError::Closed);
            }
            if let Some(error) = state.send_failures.pop_front() {
                return Err(error);
            }
            state.sent.push(frame.clone());
        }
        self.inner.sent_notify.notify_waiters();
        Ok(())
    }

    async fn receive(&self, timeout: Duration) -> Result<Option<Frame>, TransportError> {
        if !self.is_open() {
            tokio::time::sleep(timeout).await;
            return Err(TransportError::Closed);
        }

        let mut inbound = self.inner.inbound_rx.lock().await;
        match tokio::time::timeout(timeout, inbound.recv()).await {
            Err(_) => Ok(None),
            Ok(Some(Ok(mut frame))) => {
                frame.timestamp = SystemTime::now();
                Ok(Some(frame))
            }
            Ok(Some(Err(error))) => Err(error),
            Ok(None) => Err(TransportError::Closed),
        }
    }
}
