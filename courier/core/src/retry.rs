//! Timeout-Bounded Delivery
//!
//! Drives a [`FrameSocket`] through the two frames of one message: the
//! metadata frame (flagged `more`) followed by the payload frame. Each attempt
//! waits at most one send tick, clamped to what is left of the deadline.
//!
//! Once the metadata frame is accepted only the payload frame is retried, so
//! a message that eventually succeeds reaches its peer as exactly two frames.
//! A message whose metadata went out but whose payload never did is a
//! partial send; it is reported to the caller and not rolled back. If the
//! socket drops the message instead (its peer went away), both frames are
//! sent again.

use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::socket::{Frame, FrameSocket};
use crate::timeout::SendTimeout;

/// How a delivery attempt ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Both frames were accepted
    Delivered {
        /// Loop iterations used
        attempts: u32,
    },
    /// The deadline passed before both frames were accepted
    TimedOut {
        /// The metadata frame went out without its payload
        partial: bool,
        /// Loop iterations used
        attempts: u32,
    },
}

impl Delivery {
    /// Whether both frames were accepted
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Send `metadata` then `payload` through `socket` within `timeout`
///
/// At least one attempt is always made, even with an expired deadline.
pub fn deliver(
    socket: &mut dyn FrameSocket,
    metadata: &[u8],
    payload: &[u8],
    timeout: SendTimeout,
    tick: Duration,
) -> Delivery {
    let deadline = timeout.deadline_from(Instant::now());
    let header = Frame::more(Bytes::copy_from_slice(metadata));
    let body = Frame::last(Bytes::copy_from_slice(payload));

    socket.begin_message();
    let mut header_sent = false;
    let mut attempts = 0u32;

    loop {
        attempts = attempts.saturating_add(1);
        let wait = attempt_wait(timeout, deadline, tick);

        if !header_sent {
            header_sent = socket.send_frame(&header, wait);
        }
        if header_sent && socket.send_frame(&body, wait) {
            return Delivery::Delivered { attempts };
        }
        if header_sent && socket.take_restart() {
            // The peer holding the metadata frame is gone; start over
            header_sent = false;
        }

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Delivery::TimedOut {
                partial: header_sent,
                attempts,
            };
        }
    }
}

/// Per-attempt wait: one tick, never past the deadline
fn attempt_wait(timeout: SendTimeout, deadline: Option<Instant>, tick: Duration) -> Duration {
    match (timeout, deadline) {
        (SendTimeout::NonBlocking, _) => Duration::ZERO,
        (_, Some(deadline)) => tick.min(deadline.saturating_duration_since(Instant::now())),
        (_, None) => tick,
    }
}
