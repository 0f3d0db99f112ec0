//! Configuration types
//!
//! Definitions of a single proxy and of the relay-wide settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::defaults;

/// Desired configuration of one proxy
///
/// This is the entry format of the config file and the input accepted by
/// `Proxy::update` and `Proxy::differs`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    /// Unique proxy name
    pub name: String,

    /// Address to listen on (`host:port`, port 0 picks a free port)
    pub listen: String,

    /// Upstream address to dial for each client (`host:port`)
    pub upstream: String,

    /// Whether the proxy should be accepting clients
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
}

impl ProxyConfig {
    /// Create an enabled proxy definition
    pub fn new(name: impl Into<String>, listen: impl Into<String>, upstream: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listen: listen.into(),
            upstream: upstream.into(),
            enabled: defaults::enabled(),
        }
    }

    /// Same definition with a different enabled flag
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Relay-wide settings
///
/// Shared by every proxy the relay runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelaySettings {
    /// Default log level
    pub log_level: String,

    /// Buffer size used by forwarding links, in bytes
    pub buffer_size: usize,

    /// Upstream dial timeout in seconds (0 disables the timeout)
    pub connect_timeout: u64,
}

impl RelaySettings {
    /// Upstream dial timeout, if any
    pub fn connect_timeout(&self) -> Option<Duration> {
        match self.connect_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            log_level: defaults::log_level(),
            buffer_size: defaults::buffer_size(),
            connect_timeout: defaults::connect_timeout(),
        }
    }
}
