//! Transport trait for CAN adapters

use std::time::Duration;
use thiserror::Error;

use crate::types::{Bitrate, Frame};

/// Faults reported by an adapter driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    #[error("device {channel} not available")]
    DeviceUnavailable { channel: String },

    #[error("channel {channel} is busy")]
    Busy { channel: String },

    #[error("bitrate {bitrate} not supported by the adapter")]
    UnsupportedBitrate { bitrate: Bitrate },

    #[error("transmit buffer full")]
    BufferFull,

    #[error("receive queue overrun")]
    Overrun,

    #[error("driver fault: {0}")]
    Driver(String),

    #[error("channel is closed")]
    Closed,
}

/// Hardware boundary of the engine.
///
/// Transports abstract over adapter drivers (PCAN, SocketCAN, the in-memory
/// [`VirtualBus`](crate::transports::virtual_bus::VirtualBus)). Methods take
/// `&self` so the receive task can poll while senders transmit; the session
/// serializes sends itself, so `send` is never called concurrently.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Acquire the channel at the given bitrate.
    async fn open(&self, channel: &str, bitrate: Bitrate) -> Result<(), TransportError>;

    /// Release the channel. Closing an already closed channel is not an error.
    async fn close(&self) -> Result<(), TransportError>;

    /// Put one frame on the wire.
    async fn send(&self, frame: &Frame) -> Result<(), TransportError>;

    /// Wait up to `timeout` for the next frame.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` - a frame arrived
    /// - `Ok(None)` - timeout elapsed without traffic
    /// - `Err(e)` - driver fault; the caller keeps polling
    async fn receive(&self, timeout: Duration) -> Result<Option<Frame>, TransportError>;
}
