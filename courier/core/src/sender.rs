//! Sender
//!
//! The public face of every transport. [`Sender`] owns a boxed
//! [`SenderTransport`] plus its delivery counters, and runs the precondition
//! checks before any transport sees a message.
//!
//! # Example
//!
//! ```ignore
//! use courier_core::{make_sender, SendRequest, SendTimeout};
//! use serde_json::json;
//!
//! let mut sender = make_sender("publisher")?;
//! sender.connect_for_sends(&json!({"connection_string": "tcp://*:5555"}))?;
//!
//! let request = SendRequest::new(b"hello", SendTimeout::from_millis(100)).with_metadata("greetings");
//! sender.send(&request)?;
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::SenderError;
use crate::stats::{InfoCollector, SenderStatistics};
use crate::timeout::{SendOutcome, SendTimeout};
use crate::transport::SenderTransport;

/// Key under which [`Sender::get_info`] records its counters
pub const INFO_KEY: &str = "sender";

// ============================================================================
// Send Request
// ============================================================================

/// One message to send
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SendRequest<'a> {
    /// Buffer holding the message; `None` stands for a missing buffer
    pub message: Option<&'a [u8]>,
    /// Number of bytes of `message` to send
    pub size: usize,
    /// Longest the send may wait for the transport
    pub timeout: SendTimeout,
    /// Tag carried in the first frame; empty by default
    pub metadata: &'a str,
}

impl<'a> SendRequest<'a> {
    /// Send all of `message`
    pub fn new(message: &'a [u8], timeout: impl Into<SendTimeout>) -> Self {
        Self {
            message: Some(message),
            size: message.len(),
            timeout: timeout.into(),
            metadata: "",
        }
    }

    /// Send the first `size` bytes of an optional buffer
    pub fn from_parts(message: Option<&'a [u8]>, size: usize, timeout: impl Into<SendTimeout>) -> Self {
        Self {
            message,
            size,
            timeout: timeout.into(),
            metadata: "",
        }
    }

    /// Tag the message
    #[must_use]
    pub fn with_metadata(mut self, metadata: &'a str) -> Self {
        self.metadata = metadata;
        self
    }
}

// ============================================================================
// Sender
// ============================================================================

/// An output channel bound to one transport
///
/// Not `Clone`: a sender exclusively owns its endpoints and releases them
/// when dropped. Sends take `&mut self`; share a sender between threads
/// behind a `Mutex`. The counters are readable from anywhere through
/// [`statistics`](Self::statistics).
pub struct Sender {
    transport: Box<dyn SenderTransport>,
    statistics: Arc<SenderStatistics>,
}

impl Sender {
    /// Wrap a transport
    pub fn new(transport: impl SenderTransport + 'static) -> Self {
        Self::from_boxed(Box::new(transport))
    }

    /// Wrap an already boxed transport
    #[must_use]
    pub fn from_boxed(transport: Box<dyn SenderTransport>) -> Self {
        Self {
            transport,
            statistics: Arc::new(SenderStatistics::new()),
        }
    }

    /// Bind the transport to the destination in `connection_info`
    ///
    /// Recognizes `connection_string` (default `inproc://default`); other
    /// keys are left to the transport.
    ///
    /// # Errors
    ///
    /// Returns `SenderError::Configuration` if the transport refuses the
    /// document or cannot bind.
    pub fn connect_for_sends(&mut self, connection_info: &Value) -> Result<(), SenderError> {
        self.transport.connect_for_sends(connection_info)?;
        Ok(())
    }

    /// Whether a send would be attempted
    #[must_use]
    pub fn can_send(&self) -> bool {
        self.transport.can_send()
    }

    /// Send a message; a timeout is an error
    ///
    /// # Errors
    ///
    /// Returns `SendTimeoutExpired` if the transport did not accept the
    /// message in time, and every error [`offer`](Self::offer) returns.
    pub fn send(&mut self, request: &SendRequest<'_>) -> Result<(), SenderError> {
        self.offer(request)?.into_result()
    }

    /// Send a message; a timeout is reported, not raised
    ///
    /// A zero-size request succeeds without reaching the transport and
    /// without counting.
    ///
    /// # Errors
    ///
    /// - `KnownStateForbidsSend` if `can_send()` is false
    /// - `NullPointerPassedToSend` if a non-empty request has no buffer
    /// - `InvalidMessageSize` if `size` runs past the buffer
    pub fn offer(&mut self, request: &SendRequest<'_>) -> Result<SendOutcome, SenderError> {
        if !self.can_send() {
            return Err(SenderError::KnownStateForbidsSend);
        }

        let size = request.size;
        if size == 0 {
            return Ok(SendOutcome::Delivered);
        }
        let buffer = request
            .message
            .ok_or(SenderError::NullPointerPassedToSend)?;
        let message = buffer.get(..size).ok_or(SenderError::InvalidMessageSize {
            size,
            available: buffer.len(),
        })?;

        let outcome = self
            .transport
            .send_message(message, request.timeout, request.metadata)?;

        if outcome.is_delivered() {
            self.statistics.record_delivery(size);
        }
        Ok(outcome)
    }

    /// Shared handle on this sender's counters
    #[must_use]
    pub fn statistics(&self) -> Arc<SenderStatistics> {
        Arc::clone(&self.statistics)
    }

    /// Payload bytes delivered so far
    #[must_use]
    pub fn bytes_sent(&self) -> u64 {
        self.statistics.bytes_sent()
    }

    /// Messages delivered so far
    #[must_use]
    pub fn messages_sent(&self) -> u64 {
        self.statistics.messages_sent()
    }

    /// Record a counter snapshot under [`INFO_KEY`]; counters are not reset
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be serialized.
    pub fn get_info(&self, collector: &mut InfoCollector) -> Result<(), serde_json::Error> {
        collector.add(INFO_KEY, &self.statistics.snapshot())
    }

    /// Resolved addresses the transport is bound to
    #[must_use]
    pub fn endpoints(&self) -> Vec<String> {
        self.transport.endpoints()
    }
}

impl fmt::Debug for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("can_send", &self.can_send())
            .field("endpoints", &self.endpoints())
            .field("statistics", &self.statistics.snapshot())
            .finish()
    }
}
