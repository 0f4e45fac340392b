//! Bus session: connection lifecycle, statistics and the controller API

mod shared;

pub(crate) use shared::SessionCore;

use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::dispatcher::ReceiveDispatcher;
use crate::profile::{Profile, ProfileSettings};
use crate::rules::ResponseRuleEngine;
use crate::scheduler::TransmitScheduler;
use crate::stream::ThrottleExt;
use crate::transport::Transport;
use crate::types::{Bitrate, BusEvent, BusStats, ConnectionState, Frame};
use crate::{BusError, Result};

/// Adapter channel names offered by the PCAN-USB driver.
pub const KNOWN_CHANNELS: [&str; 4] = ["PCAN_USBBUS1", "PCAN_USBBUS2", "PCAN_USBBUS3", "PCAN_USBBUS4"];

/// One logical bus session over a transport.
///
/// The session outlives individual connections: rules and periodic messages
/// stay registered across disconnect/connect cycles, while counters reset on
/// every successful connect.
///
/// # Example
///
/// ```rust
/// use canbench::{BusSession, PeriodicMessage, ResponseRule, SessionConfig, VirtualBus};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> canbench::Result<()> {
/// let bus = VirtualBus::new();
/// let session = BusSession::new(bus.clone(), SessionConfig::default());
///
/// session.rules().add(ResponseRule::new(0x7E0, 0x7E8, vec![0x02, 0x50, 0x01]).with_extended(false))?;
/// session.scheduler().add(PeriodicMessage::new(0x18FF_0001, vec![0; 8]).with_cycle_time_ms(0))?;
///
/// session.connect("PCAN_USBBUS1", 500_000).await?;
/// session.send(0x123, vec![0xDE, 0xAD], false).await?;
/// assert_eq!(session.stats().tx_count, 1);
/// session.disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub struct BusSession {
    core: Arc<SessionCore>,
    rules: Arc<ResponseRuleEngine>,
    scheduler: TransmitScheduler,
    config: SessionConfig,
    /// Serializes connect/disconnect and owns the receive task
    dispatcher: tokio::sync::Mutex<Option<ReceiveDispatcher>>,
}

impl BusSession {
    pub fn new<T: Transport>(transport: T, config: SessionConfig) -> Self {
        Self::with_transport(Arc::new(transport), config)
    }

    pub fn with_transport(transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        let core = Arc::new(SessionCore::new(transport, config.event_capacity.max(1)));
        Self {
            scheduler: TransmitScheduler::new(Arc::clone(&core)),
            rules: Arc::new(ResponseRuleEngine::new()),
            core,
            config,
            dispatcher: tokio::sync::Mutex::new(None),
        }
    }

    /// Open `channel` at `bitrate` bit/s and start receiving.
    ///
    /// On success the counters are reset, the receive task is running and
    /// every cyclic, unpaused periodic message is armed.
    ///
    /// # Errors
    ///
    /// - [`BusError::AlreadyConnected`] when a connection is up
    /// - [`BusError::Connection`] for unsupported bitrates or when the
    ///   adapter is absent or busy; the session stays disconnected
    pub async fn connect(&self, channel: &str, bitrate: u32) -> Result<()> {
        let mut dispatcher = self.dispatcher.lock().await;
        if self.core.state() != ConnectionState::Disconnected {
            return Err(BusError::AlreadyConnected { channel: self.core.channel() });
        }

        let bitrate = match Bitrate::try_from(bitrate) {
            Ok(bitrate) => bitrate,
            Err(err) => {
                self.report_connect_failure(&err);
                return Err(err);
            }
        };

        info!(channel, %bitrate, "Connecting to CAN adapter");
        self.core.set_state(ConnectionState::Connecting);

        if let Err(source) = self.core.transport().open(channel, bitrate).await {
            self.core.set_state(ConnectionState::Disconnected);
            let err = BusError::connection_failed_with_source(format!("{channel}: {source}"), source);
            self.report_connect_failure(&err);
            return Err(err);
        }

        self.core.begin_connection(channel, bitrate);
        *dispatcher = Some(ReceiveDispatcher::spawn(
            Arc::clone(&self.core),
            Arc::clone(&self.rules),
            &self.config,
        ));
        self.scheduler.start_all();

        let status = format!("Connected to {channel} @ {} kbit/s", bitrate.bits_per_second() / 1000);
        info!("{status}");
        self.core.publish(BusEvent::ConnectionChanged { connected: true, status });
        self.core.publish_stats();
        Ok(())
    }

    /// Stop transmissions and reception, then release the channel.
    ///
    /// Safe to call repeatedly. Periodic timers stop before the receive task
    /// is joined and the transport is closed only after both. If the receive
    /// task does not exit within the configured join timeout the fault is
    /// published and returned, but the channel is released regardless.
    pub async fn disconnect(&self) -> Result<()> {
        let mut dispatcher = self.dispatcher.lock().await;
        if self.core.state() == ConnectionState::Disconnected {
            debug!("Disconnect requested while already disconnected");
            return Ok(());
        }

        info!(channel = %self.core.channel(), "Disconnecting");
        self.core.set_state(ConnectionState::Disconnecting);
        self.scheduler.halt().await;

        let mut outcome = Ok(());
        if let Some(receiver) = dispatcher.take() {
            if let Err(err) = receiver.shutdown(self.config.join_timeout()).await {
                error!("{err}");
                self.core.report(&err);
                outcome = Err(err);
            }
        }

        self.core.drain_wire().await;
        if let Err(err) = self.core.transport().close().await {
            warn!("Closing the adapter failed: {err}");
        }

        self.core.set_state(ConnectionState::Disconnected);
        self.core.publish(BusEvent::ConnectionChanged {
            connected: false,
            status: "Disconnected".to_string(),
        });
        self.core.publish_stats();
        outcome
    }

    /// Transmit one frame.
    ///
    /// # Errors
    ///
    /// - [`BusError::Validation`] for more than 8 data bytes or an id that
    ///   does not fit the identifier width
    /// - [`BusError::NotConnected`] when no channel is open
    /// - [`BusError::Transmit`] when the adapter rejects the frame; the error
    ///   counter is bumped and an error event published
    pub async fn send(&self, id: u32, data: impl Into<Vec<u8>>, extended: bool) -> Result<Frame> {
        self.core.send(id, data.into(), extended).await
    }

    /// Stop counting and dispatching received frames.
    pub fn pause(&self) {
        info!("Reception paused");
        self.core.set_paused(true);
    }

    pub fn resume(&self) {
        info!("Reception resumed");
        self.core.set_paused(false);
    }

    pub fn is_paused(&self) -> bool {
        self.core.is_paused()
    }

    pub fn state(&self) -> ConnectionState {
        self.core.state()
    }

    pub fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    /// Current counters; never waits on a sender or the receive task.
    pub fn stats(&self) -> BusStats {
        self.core.snapshot()
    }

    /// True while a receive task is alive.
    pub async fn is_receiving(&self) -> bool {
        self.dispatcher.lock().await.as_ref().is_some_and(ReceiveDispatcher::is_running)
    }

    pub fn rules(&self) -> &ResponseRuleEngine {
        &self.rules
    }

    pub fn scheduler(&self) -> &TransmitScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Raw event receiver. Slow receivers lag and lose the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.core.subscribe()
    }

    /// Events as a stream; lag is logged and skipped.
    pub fn events(&self) -> impl Stream<Item = BusEvent> + 'static {
        BroadcastStream::new(self.core.subscribe()).filter_map(|item| async move {
            match item {
                Ok(event) => Some(event),
                Err(lagged) => {
                    warn!("Event subscriber fell behind: {lagged}");
                    None
                }
            }
        })
    }

    /// Stats stream: the current snapshot first, then every change.
    pub fn stats_updates(&self) -> impl Stream<Item = BusStats> + 'static {
        WatchStream::new(self.core.stats_receiver())
    }

    /// Stats stream emitting at most once per `interval`, latest value wins.
    pub fn stats_updates_throttled(&self, interval: Duration) -> impl Stream<Item = BusStats> + 'static {
        WatchStream::new(self.core.stats_receiver()).throttle(interval)
    }

    /// Connection state stream: the current state first, then every change.
    pub fn state_updates(&self) -> impl Stream<Item = ConnectionState> + 'static {
        WatchStream::new(self.core.state_receiver())
    }

    /// Capture rules, periodic messages and the current endpoint.
    pub fn snapshot_profile(&self) -> Profile {
        let stats = self.core.snapshot();
        Profile::new(
            ProfileSettings { channel: stats.channel, bitrate: stats.bitrate },
            self.scheduler.list().into_iter().map(|(_, message)| message).collect(),
            self.rules.list().into_iter().map(|(_, rule)| rule).collect(),
        )
    }

    /// Replace rules and periodic messages with the profile's lists.
    ///
    /// The profile is validated as a whole first; on error nothing changes.
    pub fn restore_profile(&self, profile: Profile) -> Result<()> {
        profile.validate()?;
        let Profile { periodic_messages, response_rules, .. } = profile;
        self.rules.replace_all(response_rules)?;
        self.scheduler.replace_all(periodic_messages)?;
        info!(
            rules = self.rules.len(),
            periodic = self.scheduler.len(),
            "Profile restored"
        );
        Ok(())
    }

    fn report_connect_failure(&self, err: &BusError) {
        warn!("{err}");
        self.core.report(err);
        self.core.publish(BusEvent::ConnectionChanged { connected: false, status: err.to_string() });
    }
}
