//! CAN bus interaction engine for bench and ECU simulation work.
//!
//! canbench drives one CAN channel through a pluggable [`Transport`]: it
//! receives frames, answers trigger frames with configured responses and
//! transmits periodic messages on independent timers, while keeping
//! statistics and publishing everything as [`BusEvent`]s.
//!
//! # Features
//!
//! - **Auto-responses**: ordered trigger/response rules with delays and
//!   rolling counter bytes
//! - **Periodic transmission**: one timer per message, pausable, with manual
//!   send-once
//! - **Signal decoding**: big-endian bit-field extraction with scaling
//! - **Virtual bus**: a hardware-free transport for tests and demos
//! - **Profiles**: YAML snapshots of rules, periodic messages and settings
//!
//! # Quick Start
//!
//! ```rust
//! use canbench::{BusEvent, BusSession, Frame, ResponseRule, SessionConfig, VirtualBus};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> canbench::Result<()> {
//! let bus = VirtualBus::new();
//! let session = BusSession::new(bus.clone(), SessionConfig::default());
//! session.rules().add(ResponseRule::new(0x100, 0x200, vec![0; 8]).with_increment_byte(0))?;
//! session.connect("PCAN_USBBUS1", 500_000).await?;
//!
//! // Play the ECU side: send a trigger and watch the response go out
//! bus.inject(Frame::new(0x100, vec![0x01], false)?);
//! assert_eq!(bus.wait_for_sent(1, Duration::from_secs(1)).await, 1);
//! assert_eq!(bus.sent_frames()[0].data[0], 1);
//!
//! session.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
mod dispatcher;
mod error;
pub mod profile;
pub mod rules;
pub mod scheduler;
pub mod session;
pub mod stream;
mod sync;
pub mod transport;
pub mod transports;
pub mod types;

pub use codec::{CodecError, SignalDatabase, SignalField, decode, decode_value, pack};
pub use config::SessionConfig;
pub use error::*;
pub use profile::{PROFILE_VERSION, Profile, ProfileSettings};
pub use rules::ResponseRuleEngine;
pub use scheduler::TransmitScheduler;
pub use session::{BusSession, KNOWN_CHANNELS};
pub use stream::ThrottleExt;
pub use transport::{Transport, TransportError};
pub use transports::VirtualBus;
pub use types::*;
