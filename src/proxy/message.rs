//! Proxy controller messages
//!
//! Every administrative operation on a proxy is a message to its controller
//! task. The controller handles one message at a time, which serializes
//! start, stop and update transitions without a lock shared with callers.

use serde::Serialize;
use std::fmt;
use tokio::sync::oneshot;

use crate::common::Result;
use crate::config::ProxyConfig;

/// Messages that can be sent to a proxy controller
#[derive(Debug)]
pub(crate) enum ProxyMessage {
    /// Bind the listener and start accepting clients
    Start {
        /// Bind outcome
        response: oneshot::Sender<Result<()>>,
    },

    /// Stop accepting clients and close every connection
    Stop {
        /// Sent once the accept loop has fully exited
        response: oneshot::Sender<()>,
    },

    /// Apply a new desired configuration
    Update {
        /// Desired configuration
        desired: ProxyConfig,
        /// Outcome of the update
        response: oneshot::Sender<Result<()>>,
    },

    /// Compare addresses with another configuration
    Differs {
        /// Configuration to compare against
        other: ProxyConfig,
        /// Whether listen or upstream differ
        response: oneshot::Sender<Result<bool>>,
    },

    /// Read a consistent view of the proxy
    Snapshot {
        /// Current state
        response: oneshot::Sender<ProxySnapshot>,
    },
}

/// Lifecycle status of a proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyStatus {
    /// Not listening
    Disabled,
    /// Listening and accepting clients
    Enabled,
    /// The accept loop died on its own; not listening
    Failed,
}

impl fmt::Display for ProxyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::Enabled => write!(f, "enabled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Point-in-time view of a proxy, for status reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxySnapshot {
    /// Proxy name
    pub name: String,
    /// Listen address; the bound address while enabled
    pub listen: String,
    /// Upstream address
    pub upstream: String,
    /// Whether the proxy is accepting clients
    pub enabled: bool,
    /// Lifecycle status
    pub status: ProxyStatus,
    /// Why the accept loop failed, when `status` is `Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of registered connections
    pub connections: usize,
}

impl ProxySnapshot {
    /// Desired configuration that reproduces this proxy
    pub fn to_config(&self) -> ProxyConfig {
        ProxyConfig {
            name: self.name.clone(),
            listen: self.listen.clone(),
            upstream: self.upstream.clone(),
            enabled: self.enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = ProxySnapshot {
            name: "redis".to_string(),
            listen: "127.0.0.1:26379".to_string(),
            upstream: "127.0.0.1:6379".to_string(),
            enabled: true,
            status: ProxyStatus::Enabled,
            error: None,
            connections: 2,
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["status"], "enabled");
        assert_eq!(json["connections"], 2);
        assert!(json.get("error").is_none());

        let config = snapshot.to_config();
        assert_eq!(config.listen, "127.0.0.1:26379");
        assert!(config.enabled);
    }
}
