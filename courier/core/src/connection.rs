//! Connection Configuration
//!
//! Connection info arrives as a JSON document. The contract only knows
//! `connection_string`; the socket senders additionally read
//! `high_water_mark` and `send_tick_ms`. Anything else is ignored.
//!
//! # Address Grammar
//!
//! ```text
//! inproc://<name>          in-process endpoint, name must be non-empty
//! tcp://<host>:<port>      `*` binds all interfaces, port 0 is ephemeral
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigurationError;

/// Connection string used when the document has none
pub const DEFAULT_CONNECTION_STRING: &str = "inproc://default";

/// Messages that may queue per peer before the peer counts as full
pub const DEFAULT_HIGH_WATER_MARK: usize = 1000;

/// Longest a single frame attempt blocks inside the retry loop
pub const DEFAULT_SEND_TICK: Duration = Duration::from_millis(1);

/// Parsed connection info document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionInfo {
    /// Transport address, see the module docs for the grammar
    pub connection_string: String,

    /// Per-peer queue limit in messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_water_mark: Option<usize>,

    /// Per-attempt wait in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_tick_ms: Option<u64>,
}

impl Default for ConnectionInfo {
    fn default() -> Self {
        Self {
            connection_string: DEFAULT_CONNECTION_STRING.to_string(),
            high_water_mark: None,
            send_tick_ms: None,
        }
    }
}

impl ConnectionInfo {
    /// Connection info for a single address
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            ..Default::default()
        }
    }

    /// Read connection info from a JSON document
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidConnectionInfo` if the document is
    /// not an object or a recognized key has the wrong type.
    pub fn from_value(value: &Value) -> Result<Self, ConfigurationError> {
        Ok(Self::deserialize(value)?)
    }

    /// Render back to a JSON document
    #[must_use]
    pub fn to_value(&self) -> Value {
        // A struct of strings and integers always serializes
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Parse the connection string
    pub fn endpoint(&self) -> Result<Endpoint, ConfigurationError> {
        self.connection_string.parse()
    }

    /// Effective high-water mark
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidOption` for a zero mark.
    pub fn high_water_mark(&self) -> Result<usize, ConfigurationError> {
        match self.high_water_mark {
            Some(0) => Err(ConfigurationError::InvalidOption {
                option: "high_water_mark",
                reason: "must be at least 1".to_string(),
            }),
            Some(hwm) => Ok(hwm),
            None => Ok(DEFAULT_HIGH_WATER_MARK),
        }
    }

    /// Effective per-attempt wait
    #[must_use]
    pub fn send_tick(&self) -> Duration {
        self.send_tick_ms
            .map_or(DEFAULT_SEND_TICK, Duration::from_millis)
    }
}

/// A parsed transport address
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Endpoint inside this process
    Inproc(String),
    /// TCP host and port
    Tcp {
        /// Host name or IP literal (`*` already mapped to `0.0.0.0`)
        host: String,
        /// Port, 0 for ephemeral
        port: u16,
    },
}

impl Endpoint {
    /// `host:port` form accepted by socket address lookup
    #[must_use]
    pub fn socket_addr(&self) -> Option<String> {
        match self {
            Self::Inproc(_) => None,
            Self::Tcp { host, port } => Some(format!("{host}:{port}")),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inproc(name) => write!(f, "inproc://{name}"),
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
        }
    }
}

impl FromStr for Endpoint {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| ConfigurationError::MalformedAddress {
            address: s.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| malformed("expected <scheme>://<address>"))?;

        match scheme {
            "inproc" => {
                if rest.is_empty() {
                    return Err(malformed("in-process endpoint name is empty"));
                }
                Ok(Self::Inproc(rest.to_string()))
            }
            "tcp" => {
                let (host, port) = rest
                    .rsplit_once(':')
                    .ok_or_else(|| malformed("expected <host>:<port>"))?;
                if host.is_empty() {
                    return Err(malformed("host is empty"));
                }
                let port = port
                    .parse::<u16>()
                    .map_err(|_| malformed("port is not a number in 0..=65535"))?;
                let host = if host == "*" { "0.0.0.0" } else { host };
                Ok(Self::Tcp {
                    host: host.to_string(),
                    port,
                })
            }
            other => Err(ConfigurationError::UnsupportedScheme(other.to_string())),
        }
    }
}
