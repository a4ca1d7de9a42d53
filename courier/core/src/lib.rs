//! Courier Core - Transport-Agnostic Message Senders
//!
//! This crate lets a process push discrete byte messages to other processes
//! through a pluggable transport, with every send bounded by a timeout.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  caller                                                          │
//! │    make_sender("publisher") ──► Sender                           │
//! │                                   │ precondition checks          │
//! │                                   │ delivery counters            │
//! │                                   ▼                              │
//! │                          Box<dyn SenderTransport>                │
//! │                                   │                              │
//! │                           SocketSender                           │
//! │                                   │ retry loop (2 frames)        │
//! │                                   ▼                              │
//! │                 BroadcastSocket / QueueSocket                    │
//! │                                   │ bounded peer pipes           │
//! └───────────────────────────────────┼──────────────────────────────┘
//!                                     ▼
//!              inproc:// Receiver   or   tcp:// connection
//! ```
//!
//! Every message goes out as two frames: the metadata tag (possibly empty)
//! and the payload. Nothing else is added around them.
//!
//! # Quick Start
//!
//! ```ignore
//! use courier_core::{make_sender, Receiver, SendRequest, SendTimeout};
//! use serde_json::json;
//!
//! let mut sender = make_sender("push")?;
//! sender.connect_for_sends(&json!({"connection_string": "inproc://work"}))?;
//!
//! let mut receiver = Receiver::connect("inproc://work")?;
//!
//! sender.send(&SendRequest::new(b"job-42", SendTimeout::from_millis(100)).with_metadata("jobs"))?;
//!
//! let message = receiver.recv_timeout(SendTimeout::from_millis(100))?;
//! ```
//!
//! # Module Overview
//!
//! - [`sender`]: The `Sender` wrapper and `SendRequest`
//! - [`transport`]: The `SenderTransport` trait and the socket sender
//! - [`registry`]: Plugin name lookup
//! - [`retry`]: Timeout-bounded two-frame delivery
//! - [`socket`]: Broadcast and queued frame sockets, TCP endpoints and codec
//! - [`receiver`]: Consuming end of a socket sender
//! - [`context`]: Process-wide I/O runtime and in-process endpoint directory
//! - [`connection`]: Connection info documents and address parsing
//! - [`stats`]: Delivery counters and info collection
//! - [`config`]: TOML configuration file
//!
//! # Blocking API
//!
//! `connect_for_sends`, `send` and `recv_timeout` block the calling thread.
//! Call them from async code through `tokio::task::spawn_blocking`.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod receiver;
pub mod registry;
pub mod retry;
pub mod sender;
pub mod socket;
pub mod stats;
pub mod timeout;
pub mod transport;

// Re-exports for convenience
pub use connection::{ConnectionInfo, Endpoint};
pub use error::{ConfigurationError, PluginError, ReceiveError, SenderError};
pub use receiver::{ReceivedMessage, Receiver};
pub use registry::{global_registry, make_sender, SenderFactory, SenderRegistry};
pub use sender::{SendRequest, Sender};
pub use stats::{InfoCollector, SenderInfo, SenderStatistics};
pub use timeout::{SendOutcome, SendTimeout};
pub use transport::{DeliveryMode, SenderTransport, SocketSender};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    CourierToml, OutputSettings,
};
