//! Core types shared by the session, dispatcher, rule engine and scheduler.
//!
//! ## Architecture
//!
//! - [`Frame`] is one bus message, produced per receive or send
//! - [`ResponseRule`] and [`PeriodicMessage`] are plain serializable records;
//!   the engine addresses them through [`RuleId`] and [`PeriodicId`]
//! - [`BusStats`] and [`ConnectionState`] describe the session at a point in time
//! - [`BusEvent`] is what a session publishes to its subscribers
//!
//! ## Usage Example
//!
//! ```rust
//! use canbench::types::{Frame, ResponseRule};
//!
//! let frame = Frame::new(0x100, vec![0x01, 0x02], false).unwrap();
//! assert_eq!(frame.hex_data(), "01 02");
//!
//! let rule = ResponseRule::new(0x100, 0x200, vec![0xAA])
//!     .with_increment_byte(0)
//!     .validated()
//!     .unwrap();
//! assert_eq!(rule.response_data.len(), 8);
//! ```

mod bitrate;
mod event;
mod frame;
mod records;
mod stats;

pub use bitrate::Bitrate;
pub use event::BusEvent;
pub use frame::{
    EXTENDED_ID_MASK, Frame, MAX_DATA_LEN, STANDARD_ID_MASK, hex_dump, increment_byte, validate_data,
    validate_id,
};
pub use records::{PeriodicId, PeriodicMessage, ResponseRule, RuleId};
pub use stats::{BusStats, ConnectionState};
