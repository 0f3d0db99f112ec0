//! Connection registry
//!
//! Tracks every live socket a proxy has handed to its links, so that
//! stopping the proxy can close them even though the links own the streams.

use log::{debug, warn};
use socket2::{SockRef, Socket};
use std::collections::HashMap;
use std::net::Shutdown;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::TcpStream;

use crate::common::Result;

/// Map of connection name to a duplicated socket handle
///
/// Cloning a registry yields another handle to the same map.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<Mutex<HashMap<String, Socket>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stream under `name`
    ///
    /// The registry keeps a duplicate of the OS handle; the stream itself
    /// stays with the caller. Replaces any previous entry with that name.
    pub fn insert(&self, name: impl Into<String>, stream: &TcpStream) -> Result<()> {
        let socket = SockRef::from(stream).try_clone()?;
        let name = name.into();

        if let Some(previous) = self.lock().insert(name.clone(), socket) {
            warn!("Replaced registered connection {}", name);
            close_socket(&name, &previous);
        }
        Ok(())
    }

    /// Remove the entry for `name`
    ///
    /// Returns whether an entry was removed; removing an absent name is a no-op.
    pub fn remove(&self, name: &str) -> bool {
        self.lock().remove(name).is_some()
    }

    /// Close every registered socket and empty the registry
    ///
    /// Returns how many sockets were closed.
    pub fn close_all(&self) -> usize {
        let drained: Vec<(String, Socket)> = self.lock().drain().collect();

        for (name, socket) in &drained {
            close_socket(name, socket);
        }
        drained.len()
    }

    /// Number of registered connections
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no connection is registered
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Names of the registered connections, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Socket>> {
        // Recover the map from a poisoned lock.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.names())
            .finish()
    }
}

/// Shut the socket down in both directions
///
/// Pending reads on every handle of the socket return EOF, which ends the
/// links that own it.
fn close_socket(name: &str, socket: &Socket) {
    match socket.shutdown(Shutdown::Both) {
        Ok(()) => debug!("Closed connection {}", name),
        // The peer may already have gone away.
        Err(e) => debug!("Connection {} was already closed: {}", name, e),
    }
}
