//! State shared by the session, its receive task and the periodic timers

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tokio::sync::{broadcast, watch};
use tracing::{debug, trace, warn};

use crate::sync::lock;
use crate::transport::{Transport, TransportError};
use crate::types::{Bitrate, BusEvent, BusStats, ConnectionState, Frame};
use crate::{BusError, Result};

#[derive(Default)]
struct Counters {
    rx: AtomicU64,
    tx: AtomicU64,
    errors: AtomicU64,
    overruns: AtomicU64,
}

impl Counters {
    fn reset(&self) {
        self.rx.store(0, Ordering::Relaxed);
        self.tx.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
    }
}

/// The hardware channel plus everything that mutates alongside it.
///
/// All transmissions funnel through [`SessionCore::send`], which holds the
/// wire lock for the duration of one transport send and the matching event
/// publication. Counters are atomics so snapshots never wait on a sender.
pub(crate) struct SessionCore {
    transport: Arc<dyn Transport>,
    wire: tokio::sync::Mutex<()>,
    counters: Counters,
    paused: AtomicBool,
    endpoint: Mutex<(String, u32)>,
    state: watch::Sender<ConnectionState>,
    stats: watch::Sender<BusStats>,
    events: broadcast::Sender<BusEvent>,
}

impl SessionCore {
    pub(crate) fn new(transport: Arc<dyn Transport>, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity);
        Self {
            transport,
            wire: tokio::sync::Mutex::new(()),
            counters: Counters::default(),
            paused: AtomicBool::new(false),
            endpoint: Mutex::new((String::new(), 0)),
            state: watch::Sender::new(ConnectionState::Disconnected),
            stats: watch::Sender::new(BusStats::default()),
            events,
        }
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(?previous, ?state, "Connection state changed");
        }
        self.refresh_stats();
    }

    pub(crate) fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub(crate) fn channel(&self) -> String {
        lock(&self.endpoint).0.clone()
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
        self.refresh_stats();
    }

    /// Reset counters and record the endpoint of a freshly opened channel.
    pub(crate) fn begin_connection(&self, channel: &str, bitrate: Bitrate) {
        self.counters.reset();
        *lock(&self.endpoint) = (channel.to_string(), bitrate.bits_per_second());
        self.set_state(ConnectionState::Connected);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.events.subscribe()
    }

    pub(crate) fn stats_receiver(&self) -> watch::Receiver<BusStats> {
        self.stats.subscribe()
    }

    pub(crate) fn publish(&self, event: BusEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub(crate) fn snapshot(&self) -> BusStats {
        let (channel, bitrate) = lock(&self.endpoint).clone();
        let state = self.state();
        BusStats {
            channel,
            bitrate,
            rx_count: self.counters.rx.load(Ordering::Relaxed),
            tx_count: self.counters.tx.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            overruns: self.counters.overruns.load(Ordering::Relaxed),
            state,
            paused: self.is_paused(),
            status: state.status_text().to_string(),
        }
    }

    /// Update the watch snapshot without broadcasting.
    pub(crate) fn refresh_stats(&self) {
        self.stats.send_replace(self.snapshot());
    }

    /// Update the watch snapshot and broadcast a stats event.
    pub(crate) fn publish_stats(&self) {
        let snapshot = self.snapshot();
        self.stats.send_replace(snapshot.clone());
        self.publish(BusEvent::StatsUpdated(snapshot));
    }

    /// Count and publish a frame delivered by the transport.
    pub(crate) fn record_received(&self, frame: Frame) {
        self.counters.rx.fetch_add(1, Ordering::Relaxed);
        trace!(%frame, "Frame received");
        self.publish(BusEvent::FrameReceived(frame));
        self.refresh_stats();
    }

    /// Count and publish a receive fault.
    pub(crate) fn record_receive_error(&self, source: TransportError) {
        if source == TransportError::Overrun {
            self.counters.overruns.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
        }
        let error = BusError::Receive { source };
        warn!("{error}");
        self.publish(BusEvent::Error(error.to_string()));
        self.publish_stats();
    }

    /// Publish a fault that has no counter of its own.
    pub(crate) fn report(&self, error: &BusError) {
        self.publish(BusEvent::Error(error.to_string()));
    }

    /// Serialized transmit path.
    ///
    /// Validation failures and sends on a closed session leave the counters
    /// alone. Transport failures bump the error counter and are published
    /// before being returned; callers on background tasks only log them.
    pub(crate) async fn send(&self, id: u32, data: Vec<u8>, extended: bool) -> Result<Frame> {
        let mut frame = Frame::new(id, data, extended)?;

        let _wire = self.wire.lock().await;
        if !self.is_connected() {
            return Err(BusError::NotConnected);
        }

        frame.timestamp = SystemTime::now();
        match self.transport.send(&frame).await {
            Ok(()) => {
                self.counters.tx.fetch_add(1, Ordering::Relaxed);
                trace!(%frame, "Frame sent");
                self.publish(BusEvent::FrameSent(frame.clone()));
                self.publish_stats();
                Ok(frame)
            }
            Err(source) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                let error = BusError::Transmit { source };
                debug!(id = frame.id, "{error}");
                self.publish(BusEvent::Error(error.to_string()));
                self.publish_stats();
                Err(error)
            }
        }
    }

    /// Wait for any in-flight transmission to finish.
    pub(crate) async fn drain_wire(&self) {
        drop(self.wire.lock().await);
    }
}
