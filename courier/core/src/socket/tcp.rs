//! TCP Endpoints
//!
//! A bound sender listens; every accepted connection becomes a peer pipe in
//! the sender's [`PeerSet`] and gets a writer task that encodes frames onto
//! the stream. Receivers connect and run a reader task that decodes frames
//! into their local pipe.
//!
//! All tasks run on the shared transport context's runtime.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::codec::{encode, FrameDecoder};
use super::{Frame, PeerSet};
use crate::error::ConfigurationError;

/// First pause after an accept error
const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(10);

/// Longest pause between accept retries
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Aborts a runtime task when dropped
#[derive(Debug)]
pub struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A listening TCP endpoint feeding a [`PeerSet`]
#[derive(Debug)]
pub struct TcpBinding {
    local_addr: SocketAddr,
    _accept: TaskGuard,
}

impl TcpBinding {
    /// Address the listener actually bound (resolves port 0)
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Bind `addr` and start accepting peers into `peers`
///
/// # Errors
///
/// Returns `ConfigurationError::Bind` if the listener cannot be bound.
pub fn bind(handle: &Handle, addr: &str, peers: Arc<PeerSet>) -> Result<TcpBinding, ConfigurationError> {
    let bind_error = |source| ConfigurationError::Bind {
        address: addr.to_string(),
        source,
    };

    let listener = handle
        .block_on(TcpListener::bind(addr))
        .map_err(bind_error)?;
    let local_addr = listener.local_addr().map_err(bind_error)?;

    let task = handle.spawn(accept_loop(listener, peers));

    Ok(TcpBinding {
        local_addr,
        _accept: TaskGuard(task),
    })
}

async fn accept_loop(listener: TcpListener, peers: Arc<PeerSet>) {
    let mut consecutive_errors = 0u32;
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                consecutive_errors = 0;
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(error = %e, peer = %peer_addr, "Failed to set TCP_NODELAY");
                }
                let frames = peers.attach();
                tracing::debug!(peer = %peer_addr, "Peer connected");
                tokio::spawn(serve_peer(stream, peer_addr, frames));
            }
            Err(e) => {
                consecutive_errors = consecutive_errors.saturating_add(1);
                let backoff = accept_backoff(consecutive_errors);
                tracing::warn!(error = %e, backoff_ms = backoff.as_millis(), "Accept error");
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Pause after the `errors`-th accept failure in a row (EMFILE and the like)
fn accept_backoff(errors: u32) -> Duration {
    let exponent = errors.saturating_sub(1).min(10);
    ACCEPT_BACKOFF_BASE
        .saturating_mul(1 << exponent)
        .min(ACCEPT_BACKOFF_MAX)
}

/// Write one peer's pipe to its stream until either side goes away
async fn serve_peer(stream: TcpStream, peer_addr: SocketAddr, mut frames: mpsc::Receiver<Frame>) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut probe = [0u8; 64];

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    break;
                };
                let data = match encode(&frame) {
                    Ok(data) => data,
                    Err(e) => {
                        tracing::warn!(error = %e, peer = %peer_addr, "Encode error, dropping peer");
                        break;
                    }
                };
                if let Err(e) = write_half.write_all(&data).await {
                    tracing::debug!(error = %e, peer = %peer_addr, "Write error");
                    break;
                }
            }
            read = read_half.read(&mut probe) => {
                // Peers never talk back; anything but data means they left
                match read {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        }
    }

    tracing::debug!(peer = %peer_addr, "Peer disconnected");
}

/// Connect to a bound TCP endpoint and stream its frames into a new pipe
///
/// # Errors
///
/// Returns `ConfigurationError::Connect` if the connection is refused.
pub fn connect(
    handle: &Handle,
    addr: &str,
    capacity: usize,
) -> Result<(mpsc::Receiver<Frame>, TaskGuard), ConfigurationError> {
    let stream = handle
        .block_on(TcpStream::connect(addr))
        .map_err(|source| ConfigurationError::Connect {
            address: addr.to_string(),
            source,
        })?;

    let (tx, rx) = mpsc::channel(capacity.max(1));
    let task = handle.spawn(read_frames(stream, tx));
    Ok((rx, TaskGuard(task)))
}

async fn read_frames(mut stream: TcpStream, frames: mpsc::Sender<Frame>) {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 8192];

    loop {
        match stream.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("Connection closed by sender");
                break;
            }
            Ok(n) => {
                decoder.push(&buf[..n]);

                loop {
                    match decoder.decode() {
                        Ok(Some(frame)) => {
                            if frames.send(frame).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!(error = %e, "Frame decode error");
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Read error");
                break;
            }
        }
    }
}
