//! Error handling module
//!
//! This module defines the error types and result type aliases used in the relay.

use std::io;
use thiserror::Error;

/// Toxic Relay error type
#[derive(Error, Debug)]
pub enum RelayError {
    /// `Start` was called on a proxy that is already running
    #[error("Proxy already started: {0}")]
    AlreadyStarted(String),

    /// The listening socket could not be bound
    #[error("Unable to bind {addr}: {source}")]
    Bind {
        /// Address we tried to listen on
        addr: String,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// A listen address could not be parsed or resolved
    #[error("Unable to resolve address {addr}: {reason}")]
    AddressResolution {
        /// Address as supplied by the caller
        addr: String,
        /// Why resolution failed
        reason: String,
    },

    /// Dialing the upstream for one client failed
    #[error("Unable to open connection to upstream {upstream}: {source}")]
    UpstreamDial {
        /// Upstream address
        upstream: String,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// The accept loop failed for a reason other than shutdown
    #[error("Error while accepting client: {0}")]
    Accept(#[source] io::Error),

    /// A proxy with this name is already registered
    #[error("Proxy already exists: {0}")]
    ProxyExists(String),

    /// No proxy with this name is registered
    #[error("Proxy not found: {0}")]
    ProxyNotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `RelayError`.
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let relay_err: RelayError = io_err.into();

        match relay_err {
            RelayError::Io(_) => {}
            other => panic!("Should convert to IO error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_display() {
        let err = RelayError::AlreadyStarted("redis".to_string());
        assert_eq!(err.to_string(), "Proxy already started: redis");

        let err = RelayError::Bind {
            addr: "127.0.0.1:1".to_string(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "address in use"),
        };
        let err_str = format!("{}", err);
        assert!(err_str.contains("127.0.0.1:1"));
        assert!(err_str.contains("address in use"));
    }
}
