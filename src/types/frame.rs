//! CAN frame type shared by the receive and transmit paths

use std::fmt;
use std::time::SystemTime;

use crate::{BusError, Result};

/// Largest id representable in an 11-bit standard frame.
pub const STANDARD_ID_MASK: u32 = 0x07FF;

/// Largest id representable in a 29-bit extended frame.
pub const EXTENDED_ID_MASK: u32 = 0x1FFF_FFFF;

/// Classic CAN payload limit.
pub const MAX_DATA_LEN: usize = 8;

/// A single bus message.
///
/// Frames are ephemeral: one is produced per receive or send and handed to
/// subscribers, never retained by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Arbitration identifier
    pub id: u32,

    /// Payload, 0 to 8 bytes
    pub data: Vec<u8>,

    /// 29-bit identifier when set, 11-bit otherwise
    pub extended: bool,

    /// Arrival time for received frames, send time for transmitted frames
    pub timestamp: SystemTime,
}

impl Frame {
    /// Create a frame stamped with the current time.
    ///
    /// Fails with a validation error when the payload exceeds 8 bytes or the
    /// id does not fit the selected identifier width.
    pub fn new(id: u32, data: impl Into<Vec<u8>>, extended: bool) -> Result<Self> {
        let data = data.into();
        validate_id(id, extended, "frame")?;
        validate_data(&data, "frame")?;
        Ok(Self { id, data, extended, timestamp: SystemTime::now() })
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for zero-length (remote-style) payloads.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Payload rendered as uppercase hex bytes separated by spaces.
    pub fn hex_data(&self) -> String {
        hex_dump(&self.data)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extended {
            write!(f, "{:08X} [{}] {}", self.id, self.data.len(), self.hex_data())
        } else {
            write!(f, "{:03X} [{}] {}", self.id, self.data.len(), self.hex_data())
        }
    }
}

/// Render bytes as `"03 E8"`.
pub fn hex_dump(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(" ")
}

/// Check that `id` fits the identifier width selected by `extended`.
pub fn validate_id(id: u32, extended: bool, entity: &'static str) -> Result<()> {
    let mask = if extended { EXTENDED_ID_MASK } else { STANDARD_ID_MASK };
    if id > mask {
        return Err(BusError::validation(
            entity,
            format!(
                "id {id:#X} exceeds the {} identifier range (max {mask:#X})",
                if extended { "29-bit extended" } else { "11-bit standard" }
            ),
        ));
    }
    Ok(())
}

/// Check that a payload fits in a classic CAN frame.
pub fn validate_data(data: &[u8], entity: &'static str) -> Result<()> {
    if data.len() > MAX_DATA_LEN {
        return Err(BusError::validation(
            entity,
            format!("{} data bytes given, at most {MAX_DATA_LEN} allowed", data.len()),
        ));
    }
    Ok(())
}

/// Increment `data[index]` modulo 256.
///
/// Returns false, leaving the buffer untouched, when the index is disabled or
/// falls outside the current payload.
pub fn increment_byte(data: &mut [u8], index: Option<u8>) -> bool {
    match index.and_then(|i| data.get_mut(usize::from(i))) {
        Some(byte) => {
            *byte = byte.wrapping_add(1);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_oversized_payload() {
        let err = Frame::new(0x100, vec![0u8; 9], false).unwrap_err();
        assert!(matches!(err, BusError::Validation { entity: "frame", .. }));
    }

    #[test]
    fn frame_rejects_id_outside_width() {
        assert!(Frame::new(0x800, vec![], false).is_err());
        assert!(Frame::new(0x800, vec![], true).is_ok());
        assert!(Frame::new(0x2000_0000, vec![], true).is_err());
    }

    #[test]
    fn display_uses_id_width() {
        let standard = Frame::new(0x123, vec![0x01, 0xAB], false).unwrap();
        let extended = Frame::new(0x18F8_1280, vec![0xFF], true).unwrap();
        assert_eq!(standard.to_string(), "123 [2] 01 AB");
        assert_eq!(extended.to_string(), "18F81280 [1] FF");
    }

    #[test]
    fn increment_wraps_and_ignores_out_of_range() {
        let mut data = vec![0xFF, 0x10];
        assert!(increment_byte(&mut data, Some(0)));
        assert_eq!(data, vec![0x00, 0x10]);

        assert!(!increment_byte(&mut data, Some(2)));
        assert!(!increment_byte(&mut data, None));
        assert_eq!(data, vec![0x00, 0x10]);
    }
}
