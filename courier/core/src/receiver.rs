//! Receiver
//!
//! The consuming end of a socket sender: attaches to an `inproc://` endpoint
//! bound in this process, or connects to a `tcp://` one, and reassembles
//! frames into whole messages.
//!
//! Subscriptions filter on the leading bytes of a message's metadata tag,
//! the frame just before the payload. With no subscription every
//! message is accepted.

use std::mem;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::connection::{Endpoint, DEFAULT_HIGH_WATER_MARK};
use crate::context::TransportContext;
use crate::error::ReceiveError;
use crate::socket::tcp::{self, TaskGuard};
use crate::socket::{Frame, FRAMES_PER_MESSAGE};
use crate::timeout::SendTimeout;

// ============================================================================
// Received Message
// ============================================================================

/// A complete multi-frame message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedMessage {
    frames: Vec<Bytes>,
}

impl ReceivedMessage {
    /// Every frame, in arrival order
    #[must_use]
    pub fn frames(&self) -> &[Bytes] {
        &self.frames
    }

    /// The metadata tag of the payload (the frame before it)
    ///
    /// Empty for a single-frame message.
    #[must_use]
    pub fn metadata(&self) -> &[u8] {
        match self.frames.len() {
            0 | 1 => &[][..],
            n => &self.frames[n - 2][..],
        }
    }

    /// The final frame
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        self.frames.last().map_or(&[][..], |frame| &frame[..])
    }

    /// Whether a metadata frame left behind by an interrupted send was
    /// glued onto the front of this message
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.frames.len() > FRAMES_PER_MESSAGE
    }

    /// Take the frames
    #[must_use]
    pub fn into_frames(self) -> Vec<Bytes> {
        self.frames
    }
}

// ============================================================================
// Receiver
// ============================================================================

/// Consumer attached to one sender endpoint
///
/// Connecting to a `tcp://` endpoint blocks on the shared context, so do it
/// outside async code; [`recv`](Self::recv) itself is async and cancel-safe.
#[derive(Debug)]
pub struct Receiver {
    endpoint: String,
    pipe: mpsc::Receiver<Frame>,
    subscriptions: Vec<Bytes>,
    /// Frames of the message being reassembled
    pending: Vec<Bytes>,
    _reader: Option<TaskGuard>,
}

impl Receiver {
    /// Attach to the endpoint named by `connection_string`
    ///
    /// # Errors
    ///
    /// - `EndpointNotBound` if no sender in this process bound the
    ///   `inproc://` name
    /// - `Connect` if the `tcp://` endpoint refuses the connection
    /// - `MalformedAddress` or `UnsupportedScheme` for a bad address
    pub fn connect(connection_string: &str) -> Result<Self, ReceiveError> {
        let endpoint: Endpoint = connection_string.parse()?;
        let context = TransportContext::instance()?;

        let (pipe, reader) = match &endpoint {
            Endpoint::Inproc(name) => (context.connect_inproc(name)?, None),
            Endpoint::Tcp { host, port } => {
                let capacity = DEFAULT_HIGH_WATER_MARK * FRAMES_PER_MESSAGE;
                let (pipe, reader) =
                    tcp::connect(context.handle(), &format!("{host}:{port}"), capacity)?;
                (pipe, Some(reader))
            }
        };

        tracing::debug!(endpoint = %endpoint, "Receiver connected");
        Ok(Self {
            endpoint: endpoint.to_string(),
            pipe,
            subscriptions: Vec::new(),
            pending: Vec::new(),
            _reader: reader,
        })
    }

    /// Address this receiver is attached to
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Accept messages whose metadata starts with `prefix`
    ///
    /// An empty prefix accepts everything.
    pub fn subscribe(&mut self, prefix: impl AsRef<[u8]>) {
        self.subscriptions
            .push(Bytes::copy_from_slice(prefix.as_ref()));
    }

    /// Wait for the next accepted message
    ///
    /// # Errors
    ///
    /// Returns `ReceiveError::Closed` once the sender is gone and every frame
    /// it queued has been read.
    pub async fn recv(&mut self) -> Result<ReceivedMessage, ReceiveError> {
        loop {
            let frame = self.pipe.recv().await.ok_or(ReceiveError::Closed)?;
            if let Some(message) = self.push(frame) {
                return Ok(message);
            }
        }
    }

    /// Wait up to `timeout` for the next accepted message
    ///
    /// Returns `Ok(None)` when the timeout passes first. Must not be called
    /// from async code.
    ///
    /// # Errors
    ///
    /// Returns `ReceiveError::Closed` once the sender is gone.
    pub fn recv_timeout(
        &mut self,
        timeout: SendTimeout,
    ) -> Result<Option<ReceivedMessage>, ReceiveError> {
        match timeout {
            SendTimeout::NonBlocking => self.try_recv(),
            SendTimeout::Forever => {
                let handle = TransportContext::instance()?.handle();
                handle.block_on(self.recv()).map(Some)
            }
            SendTimeout::Within(wait) => {
                let handle = TransportContext::instance()?.handle();
                match handle.block_on(async { tokio::time::timeout(wait, self.recv()).await }) {
                    Ok(result) => result.map(Some),
                    Err(_elapsed) => Ok(None),
                }
            }
        }
    }

    fn try_recv(&mut self) -> Result<Option<ReceivedMessage>, ReceiveError> {
        loop {
            match self.pipe.try_recv() {
                Ok(frame) => {
                    if let Some(message) = self.push(frame) {
                        return Ok(Some(message));
                    }
                }
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => return Err(ReceiveError::Closed),
            }
        }
    }

    /// Add a frame to the pending message; yields it once complete and wanted
    fn push(&mut self, frame: Frame) -> Option<ReceivedMessage> {
        self.pending.push(frame.data);
        if frame.more {
            return None;
        }

        let message = ReceivedMessage {
            frames: mem::take(&mut self.pending),
        };
        self.accepts(message.metadata()).then_some(message)
    }

    fn accepts(&self, metadata: &[u8]) -> bool {
        self.subscriptions.is_empty()
            || self
                .subscriptions
                .iter()
                .any(|prefix| metadata.starts_with(prefix))
    }
}
