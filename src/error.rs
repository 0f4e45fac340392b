//! Error types for bus interaction.
//!
//! All errors implement `std::error::Error` and carry enough context to be
//! shown to an operator as-is.
//!
//! ## Error Categories
//!
//! - **Connection Errors**: adapter absent or busy, unsupported bitrate
//! - **Transmit Errors**: hardware busy or transmit buffer full
//! - **Receive Errors**: transient driver faults while polling
//! - **Validation Errors**: malformed rules or periodic messages
//! - **Codec Errors**: signal packing into an undersized buffer
//! - **Shutdown Errors**: the receive task did not stop in time or failed
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use canbench::BusError;
//!
//! let error = BusError::connection_failed("PCAN_USBBUS1 not present");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

use crate::codec::CodecError;
use crate::transport::TransportError;

/// Result type alias for bus operations.
pub type Result<T, E = BusError> = std::result::Result<T, E>;

/// Main error type for bus operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BusError {
    #[error("Connection failed: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<TransportError>,
    },

    #[error("Send failed: {source}")]
    Transmit {
        #[source]
        source: TransportError,
    },

    #[error("Receive error: {source}")]
    Receive {
        #[source]
        source: TransportError,
    },

    #[error("Invalid {entity}: {details}")]
    Validation { entity: &'static str, details: String },

    #[error("Signal codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Bus is not connected")]
    NotConnected,

    #[error("Bus is already connected to {channel}")]
    AlreadyConnected { channel: String },

    #[error("Receive task did not stop within {duration:?}")]
    ShutdownTimeout { duration: Duration },

    #[error("Receive task failed: {details}")]
    ReceiveTaskFailed { details: String },

    #[error("No {entity} with id {id}")]
    UnknownEntry { entity: &'static str, id: u64 },

    #[error("Profile error: {details}")]
    Profile { details: String },
}

impl BusError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            BusError::Connection { .. } => true,
            BusError::Transmit { .. } => true,
            BusError::Receive { .. } => true,
            BusError::NotConnected => true,
            BusError::ShutdownTimeout { .. } => true,
            BusError::ReceiveTaskFailed { .. } => true,
            BusError::Validation { .. } => false,
            BusError::Codec(_) => false,
            BusError::AlreadyConnected { .. } => false,
            BusError::UnknownEntry { .. } => false,
            BusError::Profile { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            BusError::Connection { .. } => vec![
                "Check the adapter is plugged in",
                "Close other applications holding the channel",
                "Pick one of the supported bitrates",
            ],
            BusError::Transmit { .. } => vec![
                "Check bus termination and wiring",
                "Reduce periodic message rates",
                "Verify an ECU is acknowledging frames",
            ],
            BusError::Receive { .. } => vec![
                "Check bus load and wiring",
                "Reconnect the adapter if faults persist",
            ],
            BusError::Validation { .. } => vec![
                "Keep data at 8 bytes or fewer",
                "Use 11-bit ids for standard frames and 29-bit ids for extended frames",
            ],
            BusError::Codec(_) => vec![
                "Check the signal bit range fits inside the frame",
                "Use a non-zero factor",
            ],
            BusError::NotConnected => vec!["Connect to a channel first"],
            BusError::AlreadyConnected { .. } => vec!["Disconnect before connecting again"],
            BusError::ShutdownTimeout { .. } => vec![
                "Unplug and replug the adapter",
                "Restart the application if the channel stays busy",
            ],
            BusError::ReceiveTaskFailed { .. } => vec![
                "Reconnect to restart reception",
                "Check the transport driver for panics",
            ],
            BusError::UnknownEntry { .. } => vec!["Refresh the entry list; it was removed"],
            BusError::Profile { .. } => vec![
                "Check the profile document syntax",
                "Compare against a freshly saved profile",
            ],
        }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        BusError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors caused by the transport.
    pub fn connection_failed_with_source(reason: impl Into<String>, source: TransportError) -> Self {
        BusError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for validation errors.
    pub fn validation(entity: &'static str, details: impl Into<String>) -> Self {
        BusError::Validation { entity, details: details.into() }
    }

    /// Helper constructor for profile encode/decode errors.
    pub fn profile(details: impl Into<String>) -> Self {
        BusError::Profile { details: details.into() }
    }
}

impl From<serde_yaml_ng::Error> for BusError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        BusError::Profile { details: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_carry_their_context(
            reason in "[a-zA-Z0-9 ]{1,40}",
            details in "[a-zA-Z0-9 ]{1,40}",
            id in any::<u64>(),
            millis in 1u64..60_000u64
          ) {
            let connection = BusError::connection_failed(reason.clone());
            prop_assert!(connection.to_string().contains(&reason));

            let validation = BusError::validation("rule", details.clone());
            prop_assert!(validation.to_string().contains(&details));
            prop_assert!(validation.to_string().contains("rule"));

            let unknown = BusError::UnknownEntry { entity: "periodic message", id };
            prop_assert!(unknown.to_string().contains(&id.to_string()));

            let timeout = BusError::ShutdownTimeout { duration: Duration::from_millis(millis) };
            prop_assert!(!timeout.to_string().is_empty());
          }
        }
    }

    #[test]
    fn transport_error_is_kept_as_source() {
        let err = BusError::Transmit { source: TransportError::BufferFull };
        let source = std::error::Error::source(&err).expect("source should be set");
        assert_eq!(source.to_string(), TransportError::BufferFull.to_string());
        assert!(err.to_string().starts_with("Send failed"));
    }

    #[test]
    fn codec_error_text_names_the_reason() {
        let err = BusError::from(CodecError::BufferTooShort { needed: 4, actual: 2 });
        let text = err.to_string();
        assert!(text.starts_with("Signal codec error"));
        assert!(text.contains("2 bytes too short, signal needs 4"));
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<BusError>();
    }

    #[test]
    fn recovery_methods_work() {
        let connection = BusError::connection_failed("busy");
        let validation = BusError::validation("rule", "too long");

        assert!(connection.is_retryable());
        assert!(!validation.is_retryable());

        for suggestion in connection.recovery_suggestions() {
            assert!(suggestion.len() > 5);
        }
        assert!(!validation.recovery_suggestions().is_empty());
    }

    #[test]
    fn yaml_errors_become_profile_errors() {
        let yaml_err = serde_yaml_ng::from_str::<u32>("not: [a number").unwrap_err();
        let err: BusError = yaml_err.into();
        assert!(matches!(err, BusError::Profile { .. }));
    }
}
