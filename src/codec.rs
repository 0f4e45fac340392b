//! Bit-field signal codec
//!
//! Signals use big-endian ("Motorola") layout: `bit_start` counts from the most
//! significant bit of byte 0, and a signal spanning several bytes takes its
//! most significant bits from the lowest-addressed byte. All functions here
//! are pure.
//!
//! ```rust
//! use canbench::codec::{SignalField, decode, pack};
//!
//! let volt = SignalField::new("Volt", 0, 16, 0.1, "V");
//! assert_eq!(decode(&[0x03, 0xE8], std::slice::from_ref(&volt)), "Volt:100.0V");
//!
//! let mut buf = [0u8; 2];
//! pack(&mut buf, 0, 16, 100.0, 0.1).unwrap();
//! assert_eq!(buf, [0x03, 0xE8]);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::types::hex_dump;

/// Characters of a signal name kept in decoded text.
pub const DISPLAY_NAME_WIDTH: usize = 8;

/// Errors raised while packing a signal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("buffer of {actual} bytes too short, signal needs {needed}")]
    BufferTooShort { needed: usize, actual: usize },

    #[error("invalid signal definition: {details}")]
    InvalidField { details: String },
}

/// A named value occupying a bit range of a frame payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalField {
    pub name: String,
    pub bit_start: u16,
    pub bit_length: u8,
    #[serde(default = "default_factor")]
    pub factor: f64,
    #[serde(default)]
    pub unit: String,
}

fn default_factor() -> f64 {
    1.0
}

impl SignalField {
    pub fn new(
        name: impl Into<String>,
        bit_start: u16,
        bit_length: u8,
        factor: f64,
        unit: impl Into<String>,
    ) -> Self {
        Self { name: name.into(), bit_start, bit_length, factor, unit: unit.into() }
    }

    /// Factor with the "0 means unscaled" convention applied.
    fn effective_factor(&self) -> f64 {
        if self.factor == 0.0 { 1.0 } else { self.factor }
    }
}

/// Byte window covered by a bit range.
#[derive(Debug, Clone, Copy)]
struct Span {
    byte_start: usize,
    bytes_needed: usize,
    /// Right shift that brings the field's LSB to bit 0 of the window
    shift: u32,
}

impl Span {
    fn of(bit_start: u16, bit_length: u8) -> Option<Self> {
        if bit_length == 0 || bit_length > 64 {
            return None;
        }
        let bit_start = usize::from(bit_start);
        let bit_length = usize::from(bit_length);
        let byte_start = bit_start / 8;
        let bit_offset = bit_start % 8;
        let bytes_needed = (bit_length + bit_offset).div_ceil(8);
        let shift = (bytes_needed * 8 - bit_offset - bit_length) as u32;
        Some(Self { byte_start, bytes_needed, shift })
    }

    fn end(self) -> usize {
        self.byte_start + self.bytes_needed
    }
}

fn field_mask(bit_length: u8) -> u128 {
    (1u128 << bit_length) - 1
}

/// Extract the unscaled value of `field`, or `None` when it lies outside `data`.
pub fn raw_value(data: &[u8], field: &SignalField) -> Option<u64> {
    let span = Span::of(field.bit_start, field.bit_length)?;
    if span.end() > data.len() {
        return None;
    }

    let window = data[span.byte_start..span.end()]
        .iter()
        .fold(0u128, |acc, &byte| (acc << 8) | u128::from(byte));

    Some(((window >> span.shift) & field_mask(field.bit_length)) as u64)
}

/// Physical value of `field` (raw value times factor).
pub fn decode_value(data: &[u8], field: &SignalField) -> Option<f64> {
    raw_value(data, field).map(|raw| raw as f64 * field.effective_factor())
}

fn render(field: &SignalField, raw: u64) -> String {
    let name: String = field.name.chars().take(DISPLAY_NAME_WIDTH).collect();
    let factor = field.effective_factor();
    if factor == 1.0 {
        format!("{name}:{raw}{}", field.unit)
    } else {
        format!("{name}:{:.1}{}", raw as f64 * factor, field.unit)
    }
}

/// Render every decodable field as `Name:value unit` joined by spaces.
///
/// Fields that do not fit in `data` are skipped. When nothing decodes the
/// payload is returned as a hex dump instead.
pub fn decode(data: &[u8], fields: &[SignalField]) -> String {
    let parts: Vec<String> = fields
        .iter()
        .filter_map(|field| raw_value(data, field).map(|raw| render(field, raw)))
        .collect();

    if parts.is_empty() { hex_dump(data) } else { parts.join(" ") }
}

/// Encode `value` into `buffer` at the given bit range.
///
/// The raw value is `round(value / factor)` saturated to what `bit_length`
/// bits can hold. The target bits are cleared before the raw value is OR-ed
/// in; bits outside the range are preserved. Returns the raw value written.
pub fn pack(
    buffer: &mut [u8],
    bit_start: u16,
    bit_length: u8,
    value: f64,
    factor: f64,
) -> Result<u64, CodecError> {
    let span = Span::of(bit_start, bit_length).ok_or_else(|| CodecError::InvalidField {
        details: format!("bit length {bit_length} outside 1..=64"),
    })?;
    if factor == 0.0 || !factor.is_finite() {
        return Err(CodecError::InvalidField { details: format!("factor {factor} cannot scale") });
    }
    if span.end() > buffer.len() {
        return Err(CodecError::BufferTooShort { needed: span.end(), actual: buffer.len() });
    }

    let max = field_mask(bit_length) as u64;
    let scaled = (value / factor).round();
    let raw = if scaled.is_nan() || scaled <= 0.0 {
        0
    } else if scaled >= max as f64 {
        max
    } else {
        scaled as u64
    };

    let mask = field_mask(bit_length) << span.shift;
    let bits = u128::from(raw) << span.shift;
    for i in 0..span.bytes_needed {
        let shift = 8 * (span.bytes_needed - 1 - i);
        let mask_byte = ((mask >> shift) & 0xFF) as u8;
        let bits_byte = ((bits >> shift) & 0xFF) as u8;
        let slot = &mut buffer[span.byte_start + i];
        *slot = (*slot & !mask_byte) | bits_byte;
    }

    Ok(raw)
}

/// Signal definitions grouped by frame identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalDatabase {
    signals: HashMap<u32, Vec<SignalField>>,
}

impl SignalDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field to the definitions of `frame_id`.
    pub fn insert(&mut self, frame_id: u32, field: SignalField) {
        self.signals.entry(frame_id).or_default().push(field);
    }

    pub fn fields(&self, frame_id: u32) -> Option<&[SignalField]> {
        self.signals.get(&frame_id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Decode a payload using the fields of `frame_id`, hex dump if unknown.
    pub fn decode(&self, frame_id: u32, data: &[u8]) -> String {
        match self.fields(frame_id) {
            Some(fields) => decode(data, fields),
            None => hex_dump(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bms_fields() -> Vec<SignalField> {
        vec![
            SignalField::new("Voltage", 0, 16, 0.1, "V"),
            SignalField::new("Current", 16, 16, 0.05, "A"),
            SignalField::new("SOC", 32, 8, 1.0, "%"),
            SignalField::new("SOH", 40, 8, 1.0, "%"),
            SignalField::new("FullChargeCycles", 48, 16, 1.0, ""),
        ]
    }

    #[test]
    fn scaled_word_renders_one_decimal() {
        let field = SignalField::new("Volt", 0, 16, 0.1, "");
        assert_eq!(raw_value(&[0x03, 0xE8], &field), Some(1000));
        assert_eq!(decode_value(&[0x03, 0xE8], &field), Some(100.0));
        assert_eq!(decode(&[0x03, 0xE8], &[field]), "Volt:100.0");
    }

    #[test]
    fn unscaled_fields_render_as_integers_with_units() {
        let data = [0x0F, 0xA0, 0x00, 0x64, 80, 97, 0x01, 0x2C];
        let text = decode(&data, &bms_fields());
        assert_eq!(text, "Voltage:400.0V Current:5.0A SOC:80% SOH:97% FullChar:300");
    }

    #[test]
    fn fields_past_the_payload_are_skipped() {
        let text = decode(&[0x0F, 0xA0, 0x00], &bms_fields());
        assert_eq!(text, "Voltage:400.0V");
    }

    #[test]
    fn nothing_decodable_falls_back_to_hex() {
        assert_eq!(decode(&[0x03, 0xE8], &bms_fields()[2..]), "03 E8");

        let db = SignalDatabase::new();
        assert_eq!(db.decode(0x123, &[0xDE, 0xAD]), "DE AD");
    }

    #[test]
    fn sub_byte_field_uses_motorola_numbering() {
        // Gear lives in the top three bits of byte 5
        let gear = SignalField::new("Gear", 40, 3, 1.0, "");
        let data = [0, 0, 0, 0, 0, 0b1010_0000, 0, 0];
        assert_eq!(raw_value(&data, &gear), Some(0b101));
    }

    #[test]
    fn zero_factor_is_treated_as_unscaled() {
        let field = SignalField::new("Raw", 0, 8, 0.0, "");
        assert_eq!(decode(&[42], &[field]), "Raw:42");
    }

    #[test]
    fn pack_saturates_instead_of_wrapping() {
        let mut buf = [0u8; 1];
        assert_eq!(pack(&mut buf, 0, 4, 100.0, 1.0).unwrap(), 0x0F);
        assert_eq!(buf, [0xF0]);

        assert_eq!(pack(&mut buf, 4, 4, -3.0, 1.0).unwrap(), 0);
        assert_eq!(buf, [0xF0]);
    }

    #[test]
    fn pack_preserves_neighbouring_bits() {
        let mut buf = [0xFF, 0xFF];
        pack(&mut buf, 4, 8, 0.0, 1.0).unwrap();
        assert_eq!(buf, [0xF0, 0x0F]);
    }

    #[test]
    fn pack_rejects_short_buffer_and_bad_fields() {
        let mut buf = [0u8; 2];
        assert_eq!(
            pack(&mut buf, 8, 16, 1.0, 1.0),
            Err(CodecError::BufferTooShort { needed: 3, actual: 2 })
        );
        assert!(matches!(pack(&mut buf, 0, 0, 1.0, 1.0), Err(CodecError::InvalidField { .. })));
        assert!(matches!(pack(&mut buf, 0, 8, 1.0, 0.0), Err(CodecError::InvalidField { .. })));
    }

    #[test]
    fn database_decodes_known_ids() {
        let mut db = SignalDatabase::new();
        for field in bms_fields() {
            db.insert(0x18F8_1280, field);
        }
        assert_eq!(db.len(), 1);
        assert!(db.decode(0x18F8_1280, &[0x03, 0xE8]).starts_with("Voltage:100.0V"));
    }

    proptest! {
        #[test]
        fn pack_then_decode_recovers_value(
            bit_start in 0u16..8,
            bit_length in 1u8..=17,
            fraction in 0.0f64..1.0,
            factor in prop::sample::select(vec![1.0, 0.5, 0.1, 0.05, 2.0]),
        ) {
            // bit_start < 8 and bit_length <= 17 keeps every span within 3 bytes
            let max_raw = ((1u64 << bit_length) - 1) as f64;
            let value = fraction * max_raw * factor;
            let mut buf = [0u8; 3];
            pack(&mut buf, bit_start, bit_length, value, factor).unwrap();

            let field = SignalField::new("Sig", bit_start, bit_length, factor, "");
            let decoded = decode_value(&buf, &field).unwrap();
            prop_assert!((decoded - value).abs() <= factor + 1e-9);
        }
    }
}
