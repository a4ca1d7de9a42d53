//! Point-to-point socket: each message goes to exactly one peer, round-robin.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use super::{Frame, FrameSocket, PeerSet, FRAMES_PER_MESSAGE};

/// Queued delivery over a [`PeerSet`]
///
/// A message is admitted to a peer only when the peer's pipe has room for
/// all of its frames, and every later frame of that message goes to the same
/// peer. With no peer attached, or every pipe full, attempts wait up to their
/// `wait` for a peer to arrive or drain.
#[derive(Debug)]
pub struct QueueSocket {
    peers: Arc<PeerSet>,
    handle: Handle,
    next_peer: usize,
    /// Peer receiving the message in progress
    current: Option<mpsc::Sender<Frame>>,
    /// The peer of the message in progress went away
    restart: bool,
}

impl QueueSocket {
    /// Socket distributing to `peers`; `handle` drives blocking waits
    #[must_use]
    pub fn new(peers: Arc<PeerSet>, handle: Handle) -> Self {
        Self {
            peers,
            handle,
            next_peer: 0,
            current: None,
            restart: false,
        }
    }

    fn start_message(&mut self, frame: &Frame, wait: Duration) -> bool {
        let needed = if frame.more { FRAMES_PER_MESSAGE } else { 1 };
        let peers = self.peers.snapshot();

        if peers.is_empty() {
            if !wait.is_zero() {
                let set = Arc::clone(&self.peers);
                self.handle.block_on(async move { set.wait_for_peer(wait).await });
            }
            return false;
        }

        let count = peers.len();
        let start = self.next_peer % count;

        for offset in 0..count {
            let idx = (start + offset) % count;
            let peer = &peers[idx];
            if peer.capacity() >= needed && peer.try_send(frame.clone()).is_ok() {
                self.admitted(peer, idx + 1, frame);
                return true;
            }
        }

        if wait.is_zero() {
            return false;
        }

        // Every pipe is full: wait on the next one in turn to drain
        let peer = &peers[start];
        let reserved = self.handle.block_on(async {
            match tokio::time::timeout(wait, peer.reserve_many(needed)).await {
                Ok(Ok(mut permits)) => permits.next().map(|permit| permit.send(frame.clone())),
                _ => None,
            }
        });

        if reserved.is_some() {
            self.admitted(peer, start + 1, frame);
            true
        } else {
            false
        }
    }

    fn admitted(&mut self, peer: &mpsc::Sender<Frame>, next_peer: usize, frame: &Frame) {
        self.next_peer = next_peer;
        self.current = frame.more.then(|| peer.clone());
    }

    fn continue_message(&mut self, peer: &mpsc::Sender<Frame>, frame: &Frame, wait: Duration) -> bool {
        match peer.try_send(frame.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) if wait.is_zero() => false,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let sent = self.handle.block_on(async {
                    tokio::time::timeout(wait, peer.send(frame.clone())).await
                });
                match sent {
                    Ok(Ok(())) => true,
                    Ok(Err(_closed)) => {
                        self.peer_lost();
                        false
                    }
                    Err(_elapsed) => false,
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.peer_lost();
                false
            }
        }
    }

    fn peer_lost(&mut self) {
        tracing::warn!("Peer went away mid-message; restarting on another peer");
        self.current = None;
        self.restart = true;
    }
}

impl FrameSocket for QueueSocket {
    fn begin_message(&mut self) {
        if self.current.take().is_some() {
            tracing::warn!("Abandoning unfinished message; its peer keeps the frames already sent");
        }
    }

    fn send_frame(&mut self, frame: &Frame, wait: Duration) -> bool {
        let Some(peer) = self.current.clone() else {
            return self.start_message(frame, wait);
        };

        if !self.continue_message(&peer, frame, wait) {
            return false;
        }
        if !frame.more {
            self.current = None;
        }
        true
    }

    fn take_restart(&mut self) -> bool {
        std::mem::take(&mut self.restart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TransportContext;
    use crate::retry::{deliver, Delivery};
    use crate::timeout::SendTimeout;
    use std::time::Instant;

    fn socket(peers: &Arc<PeerSet>) -> QueueSocket {
        let handle = TransportContext::instance().unwrap().handle().clone();
        QueueSocket::new(Arc::clone(peers), handle)
    }

    fn send_message(socket: &mut QueueSocket, body: &'static [u8]) -> bool {
        socket.begin_message();
        socket.send_frame(&Frame::more(&b"t"[..]), Duration::ZERO)
            && socket.send_frame(&Frame::last(body), Duration::ZERO)
    }

    #[test]
    fn test_refuses_without_peers() {
        let peers = Arc::new(PeerSet::new(10));
        let mut socket = socket(&peers);

        assert!(!send_message(&mut socket, b"body"));
    }

    #[test]
    fn test_waits_for_peer_up_to_wait() {
        let peers = Arc::new(PeerSet::new(10));
        let mut socket = socket(&peers);

        let start = Instant::now();
        assert!(!socket.send_frame(&Frame::more(&b"t"[..]), Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_round_robin_keeps_messages_whole() {
        let peers = Arc::new(PeerSet::new(10));
        let mut a = peers.attach();
        let mut b = peers.attach();
        let mut socket = socket(&peers);

        assert!(send_message(&mut socket, b"one"));
        assert!(send_message(&mut socket, b"two"));
        assert!(send_message(&mut socket, b"three"));

        let drain = |rx: &mut mpsc::Receiver<Frame>| {
            let mut bodies = Vec::new();
            while let Ok(frame) = rx.try_recv() {
                if !frame.more {
                    bodies.push(frame.data);
                }
            }
            bodies
        };
        assert_eq!(drain(&mut a), vec![&b"one"[..], &b"three"[..]]);
        assert_eq!(drain(&mut b), vec![&b"two"[..]]);
    }

    /// Drops `victim` as soon as a metadata frame is accepted
    struct PeerLeavesMidMessage {
        inner: QueueSocket,
        victim: Option<mpsc::Receiver<Frame>>,
    }

    impl FrameSocket for PeerLeavesMidMessage {
        fn begin_message(&mut self) {
            self.inner.begin_message();
        }

        fn send_frame(&mut self, frame: &Frame, wait: Duration) -> bool {
            let accepted = self.inner.send_frame(frame, wait);
            if accepted && frame.more {
                self.victim.take();
            }
            accepted
        }

        fn take_restart(&mut self) -> bool {
            self.inner.take_restart()
        }
    }

    #[test]
    fn test_closed_peer_requests_restart() {
        let peers = Arc::new(PeerSet::new(10));
        let a = peers.attach();
        let _b = peers.attach();
        let mut socket = socket(&peers);

        socket.begin_message();
        assert!(socket.send_frame(&Frame::more(&b"t"[..]), Duration::ZERO));
        drop(a);

        assert!(!socket.send_frame(&Frame::last(&b"body"[..]), Duration::ZERO));
        assert!(socket.take_restart());
        assert!(!socket.take_restart());
    }

    #[test]
    fn test_message_moves_to_live_peer() {
        let peers = Arc::new(PeerSet::new(10));
        let a = peers.attach();
        let mut b = peers.attach();
        let mut socket = PeerLeavesMidMessage {
            inner: socket(&peers),
            victim: Some(a),
        };

        let start = Instant::now();
        let outcome = deliver(
            &mut socket,
            b"t",
            b"body",
            SendTimeout::from_millis(200),
            Duration::from_millis(1),
        );

        assert_eq!(outcome, Delivery::Delivered { attempts: 2 });
        assert!(start.elapsed() < Duration::from_millis(200));
        assert_eq!(b.try_recv().unwrap(), Frame::more(&b"t"[..]));
        assert_eq!(b.try_recv().unwrap(), Frame::last(&b"body"[..]));
        assert_eq!(peers.len(), 1);
    }

    #[test]
    fn test_backpressure_when_full() {
        let peers = Arc::new(PeerSet::new(1));
        let mut rx = peers.attach();
        let mut socket = socket(&peers);

        assert!(send_message(&mut socket, b"fits"));
        assert!(!send_message(&mut socket, b"blocked"));

        rx.try_recv().unwrap();
        rx.try_recv().unwrap();
        assert!(send_message(&mut socket, b"drained"));
    }
}
