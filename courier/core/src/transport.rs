//! Sender Transports
//!
//! [`SenderTransport`] is the capability every sender plugin provides. The
//! [`Sender`](crate::Sender) wrapper owns one behind a trait object and runs
//! the checks no transport may skip.
//!
//! [`SocketSender`] is the built-in transport: one frame socket in a fixed
//! [`DeliveryMode`], bound to one or more `inproc://` or `tcp://` endpoints.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::connection::{ConnectionInfo, Endpoint};
use crate::context::TransportContext;
use crate::error::{ConfigurationError, SenderError};
use crate::retry::{self, Delivery};
use crate::socket::codec::MAX_FRAME_SIZE;
use crate::socket::tcp::{self, TcpBinding};
use crate::socket::{BroadcastSocket, FrameSocket, PeerSet, QueueSocket};
use crate::timeout::{SendOutcome, SendTimeout};

// ============================================================================
// Transport Trait
// ============================================================================

/// The transport-specific half of a sender
///
/// Implementations bind to destinations and push bytes; precondition checks
/// and statistics belong to [`Sender`](crate::Sender).
pub trait SenderTransport: Send {
    /// Bind to the destination described by `connection_info`
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if the document or address is invalid
    /// or the endpoint cannot be bound.
    fn connect_for_sends(&mut self, connection_info: &Value) -> Result<(), ConfigurationError>;

    /// Whether a send would be attempted; never blocks
    fn can_send(&self) -> bool;

    /// Deliver `message` tagged with `metadata` within `timeout`
    ///
    /// Only called when `can_send()` is true and `message` is non-empty. A
    /// timeout is reported as `SendOutcome::TimedOut`, not as an error.
    ///
    /// # Errors
    ///
    /// Returns a `SenderError` for failures other than a timeout.
    fn send_message(
        &mut self,
        message: &[u8],
        timeout: SendTimeout,
        metadata: &str,
    ) -> Result<SendOutcome, SenderError>;

    /// Resolved addresses this transport is bound to
    fn endpoints(&self) -> Vec<String> {
        Vec::new()
    }
}

// ============================================================================
// Delivery Mode
// ============================================================================

/// How a socket spreads messages over its peers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Every peer gets every message; never blocks
    Broadcast,
    /// Each message goes to one peer, round-robin; blocks when none has room
    Queued,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broadcast => write!(f, "broadcast"),
            Self::Queued => write!(f, "queued"),
        }
    }
}

// ============================================================================
// Socket Sender
// ============================================================================

enum Binding {
    Inproc(String),
    Tcp(TcpBinding),
}

impl Binding {
    fn address(&self) -> String {
        match self {
            Self::Inproc(name) => format!("inproc://{name}"),
            Self::Tcp(binding) => format!("tcp://{}", binding.local_addr()),
        }
    }
}

/// Socket state, created by the first connect
struct Bound {
    context: &'static TransportContext,
    peers: Arc<PeerSet>,
    socket: Box<dyn FrameSocket>,
    send_tick: Duration,
    bindings: Vec<Binding>,
}

impl Bound {
    /// Largest frame every bound endpoint can carry, if limited
    fn frame_limit(&self) -> Option<usize> {
        self.bindings
            .iter()
            .any(|binding| matches!(binding, Binding::Tcp(_)))
            .then_some(MAX_FRAME_SIZE)
    }
}

/// Built-in sender over a frame socket
///
/// Every `connect_for_sends` binds one more endpoint to the same socket, so
/// peers of all bound endpoints share one broadcast or one round-robin.
/// Dropping the sender releases every endpoint; peers see the end of the
/// stream once they have drained what was already queued for them.
pub struct SocketSender {
    mode: DeliveryMode,
    state: Option<Bound>,
}

impl SocketSender {
    /// Unbound sender in `mode`
    #[must_use]
    pub fn new(mode: DeliveryMode) -> Self {
        Self { mode, state: None }
    }

    /// Delivery mode of this sender
    #[must_use]
    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Number of peers currently attached across all endpoints
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.state.as_ref().map_or(0, |state| state.peers.len())
    }

    fn bound(
        &mut self,
        high_water_mark: usize,
        send_tick: Duration,
    ) -> Result<&mut Bound, ConfigurationError> {
        let mode = self.mode;

        let state = match self.state.take() {
            Some(state) => state,
            None => {
                let context = TransportContext::instance()?;
                let peers = Arc::new(PeerSet::new(high_water_mark));
                let socket: Box<dyn FrameSocket> = match mode {
                    DeliveryMode::Broadcast => Box::new(BroadcastSocket::new(Arc::clone(&peers))),
                    DeliveryMode::Queued => Box::new(QueueSocket::new(
                        Arc::clone(&peers),
                        context.handle().clone(),
                    )),
                };
                Bound {
                    context,
                    peers,
                    socket,
                    send_tick,
                    bindings: Vec::new(),
                }
            }
        };

        Ok(self.state.insert(state))
    }
}

impl SenderTransport for SocketSender {
    fn connect_for_sends(&mut self, connection_info: &Value) -> Result<(), ConfigurationError> {
        let info = ConnectionInfo::from_value(connection_info)?;
        let endpoint = info.endpoint()?;
        let mode = self.mode;
        let high_water_mark = info.high_water_mark()?;
        let send_tick = info.send_tick();
        let state = self.bound(high_water_mark, send_tick)?;

        let binding = match endpoint {
            Endpoint::Inproc(name) => {
                state.context.bind_inproc(&name, &state.peers)?;
                Binding::Inproc(name)
            }
            Endpoint::Tcp { host, port } => {
                let addr = format!("{host}:{port}");
                let binding = tcp::bind(state.context.handle(), &addr, Arc::clone(&state.peers))?;
                Binding::Tcp(binding)
            }
        };

        let address = binding.address();
        state.bindings.push(binding);
        state.peers.set_high_water_mark(high_water_mark);
        state.send_tick = send_tick;
        tracing::info!(
            endpoint = %address,
            %mode,
            requested = %info.connection_string,
            "Sender bound"
        );
        Ok(())
    }

    fn can_send(&self) -> bool {
        self.state
            .as_ref()
            .is_some_and(|state| !state.bindings.is_empty())
    }

    fn send_message(
        &mut self,
        message: &[u8],
        timeout: SendTimeout,
        metadata: &str,
    ) -> Result<SendOutcome, SenderError> {
        let state = self
            .state
            .as_mut()
            .ok_or(SenderError::KnownStateForbidsSend)?;

        let largest = message.len().max(metadata.len());
        if let Some(max) = state.frame_limit().filter(|max| largest > *max) {
            return Err(SenderError::MessageTooLarge { size: largest, max });
        }

        tracing::debug!(size = message.len(), metadata, "Starting send");
        let delivery = retry::deliver(
            state.socket.as_mut(),
            metadata.as_bytes(),
            message,
            timeout,
            state.send_tick,
        );

        match delivery {
            Delivery::Delivered { attempts } => {
                tracing::debug!(size = message.len(), attempts, "Completed send");
                Ok(SendOutcome::Delivered)
            }
            Delivery::TimedOut { partial, attempts } => {
                if partial {
                    tracing::warn!(
                        size = message.len(),
                        metadata,
                        attempts,
                        "Metadata frame sent without its payload"
                    );
                } else {
                    tracing::debug!(size = message.len(), attempts, "Send timed out");
                }
                Ok(SendOutcome::TimedOut {
                    timeout: timeout.as_duration(),
                })
            }
        }
    }

    fn endpoints(&self) -> Vec<String> {
        self.state.as_ref().map_or_else(Vec::new, |state| {
            state.bindings.iter().map(Binding::address).collect()
        })
    }
}

impl fmt::Debug for SocketSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketSender")
            .field("mode", &self.mode)
            .field("endpoints", &self.endpoints())
            .finish()
    }
}

impl Drop for SocketSender {
    fn drop(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };

        for binding in &state.bindings {
            if let Binding::Inproc(name) = binding {
                state.context.unbind_inproc(name, &state.peers);
            }
        }
        state.peers.detach_all();
        tracing::debug!(endpoints = state.bindings.len(), "Sender closed");
        // TCP listeners stop when their bindings drop with `state`
    }
}
