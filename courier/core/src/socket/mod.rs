//! Frame Sockets
//!
//! A socket moves individual frames into the pipes of its attached peers.
//! Each peer pipe is a bounded `tokio::sync::mpsc` channel whose consumer is
//! either an in-process [`Receiver`](crate::Receiver) or the writer task of a
//! TCP connection.
//!
//! Two delivery modes share this layer:
//! - [`BroadcastSocket`]: every peer gets a copy; a peer without room misses
//!   the message and the send never blocks.
//! - [`QueueSocket`]: each message goes to one peer, round-robin; the send
//!   waits when no peer has room.
//!
//! The socket is the only producer on each pipe. A message is admitted to a
//! pipe only when the pipe has room for all of its frames (at most
//! [`FRAMES_PER_MESSAGE`]), so a consumer never sees the first frame of a
//! message whose last frame was refused for lack of capacity.

mod broadcast;
pub mod codec;
mod queue;
pub mod tcp;

pub use broadcast::BroadcastSocket;
pub use queue::QueueSocket;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

/// Frames in the messages produced by the retry loop (metadata, payload)
pub const FRAMES_PER_MESSAGE: usize = 2;

/// One frame of a multi-frame message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Frame contents
    pub data: Bytes,
    /// Another frame of the same message follows
    pub more: bool,
}

impl Frame {
    /// A frame followed by more frames of the same message
    pub fn more(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            more: true,
        }
    }

    /// The final frame of a message
    pub fn last(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            more: false,
        }
    }
}

/// Per-attempt frame transmission
///
/// This is the seam the retry loop drives. Implementations must return
/// within roughly `wait`; a zero `wait` means a single non-blocking try.
pub trait FrameSocket: Send {
    /// Called once before the first frame of each message
    fn begin_message(&mut self) {}

    /// Hand one frame to the transport, waiting at most `wait` for room
    ///
    /// Returns whether the transport accepted the frame.
    fn send_frame(&mut self, frame: &Frame, wait: Duration) -> bool;

    /// Whether the message in progress was dropped and must start over
    ///
    /// Checked after a refused frame. Returns true at most once per drop.
    fn take_restart(&mut self) -> bool {
        false
    }
}

/// Pipes of every peer attached to one socket
#[derive(Debug)]
pub struct PeerSet {
    peers: Mutex<Vec<mpsc::Sender<Frame>>>,
    arrived: Notify,
    pipe_capacity: AtomicUsize,
}

impl PeerSet {
    /// Empty set whose pipes hold `high_water_mark` messages
    #[must_use]
    pub fn new(high_water_mark: usize) -> Self {
        Self {
            peers: Mutex::new(Vec::new()),
            arrived: Notify::new(),
            pipe_capacity: AtomicUsize::new(Self::capacity_for(high_water_mark)),
        }
    }

    fn capacity_for(high_water_mark: usize) -> usize {
        high_water_mark.max(1).saturating_mul(FRAMES_PER_MESSAGE)
    }

    /// Change the capacity of pipes created from now on
    pub fn set_high_water_mark(&self, high_water_mark: usize) {
        self.pipe_capacity
            .store(Self::capacity_for(high_water_mark), Ordering::Relaxed);
    }

    /// Capacity in frames of newly created pipes
    #[must_use]
    pub fn pipe_capacity(&self) -> usize {
        self.pipe_capacity.load(Ordering::Relaxed)
    }

    /// Create a pipe for a new peer and return its consuming end
    pub fn attach(&self) -> mpsc::Receiver<Frame> {
        let (tx, rx) = mpsc::channel(self.pipe_capacity());
        self.peers.lock().push(tx);
        self.arrived.notify_one();
        rx
    }

    /// Live pipes, pruning those whose consumer went away
    #[must_use]
    pub fn snapshot(&self) -> Vec<mpsc::Sender<Frame>> {
        let mut peers = self.peers.lock();
        peers.retain(|tx| !tx.is_closed());
        peers.clone()
    }

    /// Number of live peers
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether no live peer is attached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait up to `wait` for a peer to attach
    pub(crate) async fn wait_for_peer(&self, wait: Duration) {
        let _ = tokio::time::timeout(wait, self.arrived.notified()).await;
    }

    /// Drop every pipe so consumers observe the end of the stream
    pub fn detach_all(&self) {
        self.peers.lock().clear();
    }
}
