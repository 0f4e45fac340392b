//! Notifications published by a bus session

use super::{BusStats, Frame};

/// Outbound notification for the controller or UI layer.
///
/// Events from one producing context (the receive task, or one periodic
/// timer) arrive in the order they happened there.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// A frame arrived from the transport while reception was not paused
    FrameReceived(Frame),

    /// A frame was accepted by the transport
    FrameSent(Frame),

    /// The session connected or disconnected
    ConnectionChanged { connected: bool, status: String },

    /// A non-fatal fault, already counted
    Error(String),

    /// Counters changed
    StatsUpdated(BusStats),
}
