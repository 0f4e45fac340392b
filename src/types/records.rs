//! Serializable rule and periodic message records
//!
//! These are the plain data halves of the engine's entries. Runtime handles
//! (timer tasks, cancellation tokens) live in the scheduler, keyed by the ids
//! defined here, so a record can always be snapshotted verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::frame::{EXTENDED_ID_MASK, MAX_DATA_LEN, validate_data, validate_id};
use crate::{BusError, Result};

/// Stable handle for a response rule, assigned when the rule is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub(crate) u64);

/// Stable handle for a periodic message, assigned when the message is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeriodicId(pub(crate) u64);

impl RuleId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl PeriodicId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule#{}", self.0)
    }
}

impl fmt::Display for PeriodicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "periodic#{}", self.0)
    }
}

fn default_extended() -> bool {
    true
}

fn default_enabled() -> bool {
    true
}

fn default_cycle_time() -> u64 {
    100
}

/// Trigger id to response mapping with optional delay and auto-increment byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRule {
    pub trigger_id: u32,
    pub response_id: u32,
    pub response_data: Vec<u8>,
    #[serde(default = "default_extended")]
    pub is_extended: bool,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub comment: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Byte of `response_data` bumped before every response
    #[serde(default, with = "increment_index")]
    pub increment_byte: Option<u8>,
}

impl ResponseRule {
    /// Enabled extended-id rule with no delay and no increment.
    pub fn new(trigger_id: u32, response_id: u32, response_data: impl Into<Vec<u8>>) -> Self {
        Self {
            trigger_id,
            response_id,
            response_data: response_data.into(),
            is_extended: true,
            delay_ms: 0,
            comment: String::new(),
            enabled: true,
            increment_byte: None,
        }
    }

    pub fn with_extended(mut self, extended: bool) -> Self {
        self.is_extended = extended;
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_increment_byte(mut self, index: u8) -> Self {
        self.increment_byte = Some(index);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Validate and normalize: response data is zero-padded to 8 bytes.
    pub fn validated(mut self) -> Result<Self> {
        if self.trigger_id > EXTENDED_ID_MASK {
            return Err(BusError::validation(
                "response rule",
                format!("trigger id {:#X} exceeds 29 bits", self.trigger_id),
            ));
        }
        validate_id(self.response_id, self.is_extended, "response rule")?;
        validate_data(&self.response_data, "response rule")?;
        self.response_data.resize(MAX_DATA_LEN, 0);
        Ok(self)
    }
}

/// Message transmitted repeatedly at a fixed cycle time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicMessage {
    pub msg_id: u32,
    pub data: Vec<u8>,
    #[serde(default = "default_extended")]
    pub is_extended: bool,
    /// Cycle in milliseconds; 0 means manual sends only
    #[serde(default = "default_cycle_time")]
    pub cycle_time_ms: u64,
    #[serde(default)]
    pub is_paused: bool,
    #[serde(default)]
    pub comment: String,
    #[serde(default, with = "increment_index")]
    pub increment_byte: Option<u8>,
    /// Frames sent for this entry; runtime only
    #[serde(skip)]
    pub count: u64,
}

impl PeriodicMessage {
    /// Running extended-id message with a 100 ms cycle.
    pub fn new(msg_id: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            msg_id,
            data: data.into(),
            is_extended: true,
            cycle_time_ms: default_cycle_time(),
            is_paused: false,
            comment: String::new(),
            increment_byte: None,
            count: 0,
        }
    }

    pub fn with_extended(mut self, extended: bool) -> Self {
        self.is_extended = extended;
        self
    }

    pub fn with_cycle_time_ms(mut self, cycle_time_ms: u64) -> Self {
        self.cycle_time_ms = cycle_time_ms;
        self
    }

    pub fn with_paused(mut self, paused: bool) -> Self {
        self.is_paused = paused;
        self
    }

    pub fn with_increment_byte(mut self, index: u8) -> Self {
        self.increment_byte = Some(index);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// True when the message runs on a timer rather than manual sends only.
    pub fn is_cyclic(&self) -> bool {
        self.cycle_time_ms > 0
    }

    pub fn validated(self) -> Result<Self> {
        validate_id(self.msg_id, self.is_extended, "periodic message")?;
        validate_data(&self.data, "periodic message")?;
        Ok(self)
    }
}

/// Serializes a disabled increment index as `-1`; reads `-1`, null or a
/// missing key as disabled.
mod increment_index {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(index) => serializer.serialize_i16(i16::from(*index)),
            None => serializer.serialize_i16(-1),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<i64>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) if raw < 0 => Ok(None),
            Some(raw) => u8::try_from(raw)
                .map(Some)
                .map_err(|_| D::Error::custom(format!("increment byte index {raw} out of range"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_data_is_zero_padded() {
        let rule = ResponseRule::new(0x100, 0x200, vec![0xAA]).validated().unwrap();
        assert_eq!(rule.response_data, vec![0xAA, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn rule_with_nine_bytes_is_rejected() {
        let err = ResponseRule::new(0x100, 0x200, vec![0u8; 9]).validated().unwrap_err();
        assert!(matches!(err, BusError::Validation { entity: "response rule", .. }));
    }

    #[test]
    fn standard_rule_rejects_wide_response_id() {
        let rule = ResponseRule::new(0x100, 0x1234, vec![]).with_extended(false);
        assert!(rule.validated().is_err());
    }

    #[test]
    fn periodic_keeps_short_payloads() {
        let msg = PeriodicMessage::new(0x321, vec![1, 2, 3]).with_extended(false).validated().unwrap();
        assert_eq!(msg.data.len(), 3);
        assert!(msg.is_cyclic());
        assert!(!msg.clone().with_cycle_time_ms(0).is_cyclic());
    }

    #[test]
    fn increment_index_accepts_minus_one() {
        let yaml = "trigger_id: 256\nresponse_id: 512\nresponse_data: [0, 0]\nincrement_byte: -1\n";
        let rule: ResponseRule = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(rule.increment_byte, None);
        assert!(rule.enabled);
        assert!(rule.is_extended);

        let yaml = "msg_id: 1\ndata: []\nincrement_byte: 3\n";
        let msg: PeriodicMessage = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(msg.increment_byte, Some(3));
        assert_eq!(msg.cycle_time_ms, 100);
    }

    #[test]
    fn disabled_increment_serializes_as_minus_one() {
        let yaml = serde_yaml_ng::to_string(&PeriodicMessage::new(1, vec![])).unwrap();
        assert!(yaml.contains("increment_byte: -1"));
        assert!(!yaml.contains("count"));
    }
}
