//! Fan-out socket: every attached peer receives every message it has room for.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::{Frame, FrameSocket, PeerSet, FRAMES_PER_MESSAGE};

/// Broadcast delivery over a [`PeerSet`]
///
/// Never applies backpressure: a frame is always accepted, and peers whose
/// pipe cannot hold the whole message simply miss it.
#[derive(Debug)]
pub struct BroadcastSocket {
    peers: Arc<PeerSet>,
    /// Peers admitted for the message in progress
    targets: Vec<mpsc::Sender<Frame>>,
    in_message: bool,
}

impl BroadcastSocket {
    /// Socket publishing to `peers`
    #[must_use]
    pub fn new(peers: Arc<PeerSet>) -> Self {
        Self {
            peers,
            targets: Vec::new(),
            in_message: false,
        }
    }

    fn admit_peers(&mut self, frames_needed: usize) {
        let peers = self.peers.snapshot();
        let total = peers.len();
        self.targets = peers
            .into_iter()
            .filter(|tx| tx.capacity() >= frames_needed)
            .collect();

        let skipped = total - self.targets.len();
        if skipped > 0 {
            tracing::debug!(skipped, total, "Dropping message for peers without room");
        }
    }
}

impl FrameSocket for BroadcastSocket {
    fn begin_message(&mut self) {
        self.targets.clear();
        self.in_message = false;
    }

    fn send_frame(&mut self, frame: &Frame, _wait: Duration) -> bool {
        if !self.in_message {
            let needed = if frame.more { FRAMES_PER_MESSAGE } else { 1 };
            self.admit_peers(needed);
        }

        // A target can only have gone away; a full pipe was filtered out above
        self.targets
            .retain(|tx| tx.try_send(frame.clone()).is_ok());

        self.in_message = frame.more;
        if !frame.more {
            self.targets.clear();
        }
        true
    }
}
