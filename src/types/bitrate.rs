//! Supported bus bitrates

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::BusError;

/// Bus clock rates supported by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Bitrate {
    Kbit125,
    Kbit250,
    Kbit500,
    Mbit1,
}

impl Bitrate {
    /// Every supported rate, slowest first.
    pub const ALL: [Bitrate; 4] = [Bitrate::Kbit125, Bitrate::Kbit250, Bitrate::Kbit500, Bitrate::Mbit1];

    /// Rate in bit/s.
    pub fn bits_per_second(self) -> u32 {
        match self {
            Bitrate::Kbit125 => 125_000,
            Bitrate::Kbit250 => 250_000,
            Bitrate::Kbit500 => 500_000,
            Bitrate::Mbit1 => 1_000_000,
        }
    }

    /// Look up a supported rate by its bit/s value.
    pub fn from_bits_per_second(bps: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|rate| rate.bits_per_second() == bps)
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bitrate::Mbit1 => f.write_str("1 Mbit/s"),
            other => write!(f, "{} kbit/s", other.bits_per_second() / 1000),
        }
    }
}

impl TryFrom<u32> for Bitrate {
    type Error = BusError;

    fn try_from(bps: u32) -> Result<Self, Self::Error> {
        Self::from_bits_per_second(bps)
            .ok_or_else(|| BusError::connection_failed(format!("unsupported bitrate {bps} bit/s")))
    }
}

impl From<Bitrate> for u32 {
    fn from(rate: Bitrate) -> Self {
        rate.bits_per_second()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_rates_round_trip_through_bps() {
        for rate in Bitrate::ALL {
            assert_eq!(Bitrate::try_from(rate.bits_per_second()).unwrap(), rate);
        }
    }

    #[test]
    fn unknown_rate_is_a_connection_error() {
        let err = Bitrate::try_from(83_333).unwrap_err();
        assert!(matches!(err, BusError::Connection { .. }));
    }

    #[test]
    fn labels_match_adapter_menu() {
        assert_eq!(Bitrate::Kbit500.to_string(), "500 kbit/s");
        assert_eq!(Bitrate::Mbit1.to_string(), "1 Mbit/s");
    }
}
