//! Shared Transport Context
//!
//! One per process, created on first use and never torn down. It owns the
//! I/O runtime every socket task runs on and the directory of bound
//! `inproc://` endpoints.
//!
//! Sync entry points drive futures with [`Handle::block_on`], so they must
//! not be called from inside an async task.

use std::sync::{Arc, OnceLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::mpsc;

use crate::error::ConfigurationError;
use crate::socket::{Frame, PeerSet};

/// Worker threads in the shared I/O runtime
pub const IO_THREADS: usize = 1;

static CONTEXT: OnceLock<TransportContext> = OnceLock::new();
static INIT: Mutex<()> = Mutex::new(());

/// Process-wide I/O runtime and in-process endpoint directory
#[derive(Debug)]
pub struct TransportContext {
    runtime: Runtime,
    inproc: DashMap<String, Arc<PeerSet>>,
}

impl TransportContext {
    /// The process-wide context, created on first call
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::Context` if the runtime cannot be built.
    pub fn instance() -> Result<&'static Self, ConfigurationError> {
        if let Some(context) = CONTEXT.get() {
            return Ok(context);
        }

        // Only one caller builds a runtime
        let _init = INIT.lock();
        if let Some(context) = CONTEXT.get() {
            return Ok(context);
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(IO_THREADS)
            .thread_name("courier-io")
            .enable_all()
            .build()
            .map_err(ConfigurationError::Context)?;

        let context = CONTEXT.get_or_init(|| {
            tracing::debug!(threads = IO_THREADS, "Transport context started");
            Self {
                runtime,
                inproc: DashMap::new(),
            }
        });
        Ok(context)
    }

    /// Handle onto the shared runtime
    #[must_use]
    pub fn handle(&self) -> &Handle {
        self.runtime.handle()
    }

    /// Publish `peers` under an in-process endpoint name
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::AddressInUse` if the name is taken.
    pub fn bind_inproc(&self, name: &str, peers: &Arc<PeerSet>) -> Result<(), ConfigurationError> {
        match self.inproc.entry(name.to_string()) {
            Entry::Occupied(_) => Err(ConfigurationError::AddressInUse(format!("inproc://{name}"))),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(peers));
                Ok(())
            }
        }
    }

    /// Release an in-process endpoint name, if `peers` still owns it
    pub fn unbind_inproc(&self, name: &str, peers: &Arc<PeerSet>) {
        self.inproc
            .remove_if(name, |_, bound| Arc::ptr_eq(bound, peers));
    }

    /// Attach a new consumer pipe to a bound in-process endpoint
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::EndpointNotBound` if nothing is bound.
    pub fn connect_inproc(&self, name: &str) -> Result<mpsc::Receiver<Frame>, ConfigurationError> {
        let peers = self
            .inproc
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ConfigurationError::EndpointNotBound(format!("inproc://{name}")))?;
        Ok(peers.attach())
    }

    /// Names currently bound in this process, sorted
    #[must_use]
    pub fn inproc_endpoints(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inproc.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
