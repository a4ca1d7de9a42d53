//! Error Types
//!
//! The universal sender taxonomy plus the transport configuration errors
//! raised while binding endpoints.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by [`Sender`](crate::Sender) operations
#[derive(Debug, Error)]
pub enum SenderError {
    /// `send` was called while `can_send()` is false
    #[error("Sender not in a state to send data")]
    KnownStateForbidsSend,

    /// A non-empty message was given without a buffer
    #[error("A null pointer to memory was passed to Sender::send")]
    NullPointerPassedToSend,

    /// The retry loop hit its deadline before both frames were accepted
    #[error(
        "Unable to send within timeout period (timeout period was {} milliseconds)",
        .timeout.as_millis()
    )]
    SendTimeoutExpired {
        /// The timeout that was exceeded
        timeout: Duration,
    },

    /// The requested size runs past the end of the provided buffer
    #[error("Message size {size} exceeds the {available} bytes provided")]
    InvalidMessageSize {
        /// Requested message size
        size: usize,
        /// Length of the buffer actually provided
        available: usize,
    },

    /// A frame is too large for one of the bound endpoints to carry
    #[error("Frame of {size} bytes exceeds the {max} byte limit")]
    MessageTooLarge {
        /// Size of the offending frame
        size: usize,
        /// Largest frame the endpoint accepts
        max: usize,
    },

    /// The transport rejected its connection configuration
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl SenderError {
    /// Whether this error is a delivery timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::SendTimeoutExpired { .. })
    }
}

/// Transport-specific errors raised while parsing or binding an address
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The connection info document could not be read
    #[error("Invalid connection info: {0}")]
    InvalidConnectionInfo(#[from] serde_json::Error),

    /// The connection string does not follow `<scheme>://<address>`
    #[error("Malformed address {address:?}: {reason}")]
    MalformedAddress {
        /// The offending connection string
        address: String,
        /// What is wrong with it
        reason: String,
    },

    /// No transport handles this scheme
    #[error("Unsupported transport scheme: {0}")]
    UnsupportedScheme(String),

    /// A transport option is out of range
    #[error("Invalid option {option}: {reason}")]
    InvalidOption {
        /// Option key
        option: &'static str,
        /// Why it was refused
        reason: String,
    },

    /// Another socket in this process already bound the endpoint
    #[error("Address already in use: {0}")]
    AddressInUse(String),

    /// A receiver tried to attach to an in-process endpoint nobody bound
    #[error("No socket is bound to {0}")]
    EndpointNotBound(String),

    /// The operating system refused a bind or connect
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// The address that was attempted
        address: String,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// A receiver could not reach its endpoint
    #[error("Failed to connect to {address}: {source}")]
    Connect {
        /// The address that was attempted
        address: String,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// The shared transport context could not be started
    #[error("Failed to start transport context: {0}")]
    Context(std::io::Error),
}

/// Errors raised by the plugin registry
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PluginError {
    /// No factory is registered under this name
    #[error("Unknown sender plugin: {0}")]
    UnknownPlugin(String),

    /// A factory is already registered under this name
    #[error("Sender plugin already registered: {0}")]
    AlreadyRegistered(String),
}

/// Errors raised while receiving
#[derive(Debug, Error)]
pub enum ReceiveError {
    /// Every sending peer has gone away
    #[error("Endpoint closed")]
    Closed,

    /// The receiver could not attach to its endpoint
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_carries_milliseconds() {
        let err = SenderError::SendTimeoutExpired {
            timeout: Duration::from_millis(50),
        };
        assert_eq!(
            err.to_string(),
            "Unable to send within timeout period (timeout period was 50 milliseconds)"
        );
        assert!(err.is_timeout());
    }

    #[test]
    fn test_configuration_error_converts() {
        let err: SenderError = ConfigurationError::UnsupportedScheme("pgm".into()).into();
        assert!(matches!(err, SenderError::Configuration(_)));
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "Unsupported transport scheme: pgm");
    }
}
