//! Send Timeouts and Outcomes

use std::time::{Duration, Instant};

use crate::error::SenderError;

/// How long a send may wait for the transport to accept a message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendTimeout {
    /// Retry until the transport accepts (no deadline)
    Forever,
    /// Single zero-wait attempt per frame; any refusal is a timeout
    NonBlocking,
    /// Retry until the transport accepts or the duration elapses
    Within(Duration),
}

impl SendTimeout {
    /// Timeout of `ms` milliseconds
    #[must_use]
    pub fn from_millis(ms: u64) -> Self {
        Duration::from_millis(ms).into()
    }

    /// The duration carried by a timeout error
    ///
    /// `Forever` never expires, so it reports `Duration::MAX`.
    #[must_use]
    pub fn as_duration(&self) -> Duration {
        match self {
            Self::Forever => Duration::MAX,
            Self::NonBlocking => Duration::ZERO,
            Self::Within(d) => *d,
        }
    }

    /// Deadline measured from `start`, or `None` if there is none
    #[must_use]
    pub fn deadline_from(&self, start: Instant) -> Option<Instant> {
        match self {
            Self::Forever => None,
            Self::NonBlocking => Some(start),
            // Overflowing the clock is the same as having no deadline
            Self::Within(d) => start.checked_add(*d),
        }
    }
}

impl From<Duration> for SendTimeout {
    fn from(d: Duration) -> Self {
        if d.is_zero() {
            Self::NonBlocking
        } else if d == Duration::MAX {
            Self::Forever
        } else {
            Self::Within(d)
        }
    }
}

/// Result of a send that completed without error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub enum SendOutcome {
    /// Every frame was accepted by the transport
    Delivered,
    /// The deadline passed first
    TimedOut {
        /// The timeout that was exceeded
        timeout: Duration,
    },
}

impl SendOutcome {
    /// Whether the message was delivered
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    /// Convert a timeout into `SendTimeoutExpired`
    pub fn into_result(self) -> Result<(), SenderError> {
        match self {
            Self::Delivered => Ok(()),
            Self::TimedOut { timeout } => Err(SenderError::SendTimeoutExpired { timeout }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_sentinels() {
        assert_eq!(SendTimeout::from(Duration::ZERO), SendTimeout::NonBlocking);
        assert_eq!(SendTimeout::from(Duration::MAX), SendTimeout::Forever);
        assert_eq!(
            SendTimeout::from_millis(50),
            SendTimeout::Within(Duration::from_millis(50))
        );
    }

    #[test]
    fn test_deadlines() {
        let start = Instant::now();
        assert_eq!(SendTimeout::Forever.deadline_from(start), None);
        assert_eq!(SendTimeout::NonBlocking.deadline_from(start), Some(start));
        assert_eq!(
            SendTimeout::from_millis(10).deadline_from(start),
            Some(start + Duration::from_millis(10))
        );
    }

    #[test]
    fn test_outcome_into_result() {
        assert!(SendOutcome::Delivered.into_result().is_ok());

        let err = SendOutcome::TimedOut {
            timeout: Duration::from_millis(50),
        }
        .into_result()
        .unwrap_err();
        assert!(matches!(
            err,
            SenderError::SendTimeoutExpired { timeout } if timeout == Duration::from_millis(50)
        ));
    }
}
