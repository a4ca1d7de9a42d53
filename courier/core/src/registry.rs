//! Sender Plugin Registry
//!
//! Maps plugin names to factories producing fresh [`Sender`]s. The built-in
//! plugins are the two socket delivery modes:
//!
//! | Name        | Alias       | Mode      |
//! |-------------|-------------|-----------|
//! | `publisher` | `broadcast` | Broadcast |
//! | `push`      | `queued`    | Queued    |
//!
//! [`make_sender`] resolves against a process-wide registry that starts with
//! the built-ins; further factories can be added to it at any time.

use std::fmt;
use std::sync::OnceLock;

use dashmap::DashMap;

use crate::error::PluginError;
use crate::sender::Sender;
use crate::transport::{DeliveryMode, SenderTransport, SocketSender};

/// Builds a new, unconnected transport
pub type SenderFactory = Box<dyn Fn() -> Box<dyn SenderTransport> + Send + Sync>;

/// Built-in plugin names and the mode each one selects
pub const BUILTIN_PLUGINS: [(&str, DeliveryMode); 4] = [
    ("publisher", DeliveryMode::Broadcast),
    ("broadcast", DeliveryMode::Broadcast),
    ("push", DeliveryMode::Queued),
    ("queued", DeliveryMode::Queued),
];

/// Name → factory table
#[derive(Default)]
pub struct SenderRegistry {
    factories: DashMap<String, SenderFactory>,
}

impl SenderRegistry {
    /// Registry with no plugins
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in socket plugins
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for (name, mode) in BUILTIN_PLUGINS {
            let factory: SenderFactory =
                Box::new(move || -> Box<dyn SenderTransport> { Box::new(SocketSender::new(mode)) });
            registry.factories.insert(name.to_string(), factory);
        }
        registry
    }

    /// Add a factory under `name`
    ///
    /// # Errors
    ///
    /// Returns `PluginError::AlreadyRegistered` if the name is taken.
    pub fn register<F>(&self, name: &str, factory: F) -> Result<(), PluginError>
    where
        F: Fn() -> Box<dyn SenderTransport> + Send + Sync + 'static,
    {
        use dashmap::mapref::entry::Entry;

        match self.factories.entry(name.to_string()) {
            Entry::Occupied(_) => Err(PluginError::AlreadyRegistered(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Box::new(factory));
                tracing::debug!(plugin = name, "Registered sender plugin");
                Ok(())
            }
        }
    }

    /// Build a new sender from the factory registered under `name`
    ///
    /// # Errors
    ///
    /// Returns `PluginError::UnknownPlugin` if nothing is registered.
    pub fn resolve(&self, name: &str) -> Result<Sender, PluginError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| PluginError::UnknownPlugin(name.to_string()))?;
        let transport = (factory.value())();
        Ok(Sender::from_boxed(transport))
    }

    /// Whether a factory is registered under `name`
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl fmt::Debug for SenderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

/// The process-wide registry, holding the built-ins on first use
pub fn global_registry() -> &'static SenderRegistry {
    static REGISTRY: OnceLock<SenderRegistry> = OnceLock::new();
    REGISTRY.get_or_init(SenderRegistry::with_builtins)
}

/// Build a new sender by plugin name from the process-wide registry
///
/// # Errors
///
/// Returns `PluginError::UnknownPlugin` if nothing is registered.
pub fn make_sender(name: &str) -> Result<Sender, PluginError> {
    global_registry().resolve(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigurationError, SenderError};
    use crate::timeout::{SendOutcome, SendTimeout};
    use serde_json::Value;

    struct NullTransport;

    impl SenderTransport for NullTransport {
        fn connect_for_sends(&mut self, _info: &Value) -> Result<(), ConfigurationError> {
            Ok(())
        }

        fn can_send(&self) -> bool {
            true
        }

        fn send_message(
            &mut self,
            _message: &[u8],
            _timeout: SendTimeout,
            _metadata: &str,
        ) -> Result<SendOutcome, SenderError> {
            Ok(SendOutcome::Delivered)
        }
    }

    #[test]
    fn test_builtins_resolve_unconnected() {
        let registry = SenderRegistry::with_builtins();
        for (name, _) in BUILTIN_PLUGINS {
            let sender = registry.resolve(name).unwrap();
            assert!(!sender.can_send(), "{name} should start unconnected");
        }
    }

    #[test]
    fn test_unknown_plugin() {
        let registry = SenderRegistry::with_builtins();
        let err = registry.resolve("carrier-pigeon").unwrap_err();
        assert_eq!(err, PluginError::UnknownPlugin("carrier-pigeon".to_string()));
    }

    #[test]
    fn test_register_custom_plugin() {
        let registry = SenderRegistry::new();
        registry
            .register("null", || Box::new(NullTransport))
            .unwrap();

        assert!(registry.contains("null"));
        assert!(registry.resolve("null").unwrap().can_send());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = SenderRegistry::with_builtins();
        let err = registry
            .register("push", || Box::new(NullTransport))
            .unwrap_err();
        assert_eq!(err, PluginError::AlreadyRegistered("push".to_string()));
    }

    #[test]
    fn test_names_sorted() {
        let registry = SenderRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["broadcast", "publisher", "push", "queued"]);
    }

    #[test]
    fn test_each_resolve_is_a_new_sender() {
        let mut a = make_sender("publisher").unwrap();
        let b = make_sender("publisher").unwrap();

        a.connect_for_sends(&serde_json::json!({"connection_string": "inproc://registry-fresh"}))
            .unwrap();
        assert!(a.can_send());
        assert!(!b.can_send());
    }
}
