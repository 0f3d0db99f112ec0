//! Network utility functions
//!
//! This module provides address resolution and listener construction.

use std::net::SocketAddr;
use std::str::FromStr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{lookup_host, TcpListener};

use super::error::{RelayError, Result};

/// Listen backlog used for every proxy
const LISTEN_BACKLOG: i32 = 1024;

/// Resolve an address to a socket address
///
/// Literal socket addresses are parsed directly; anything else goes through
/// the resolver and the first result wins. An empty host (`":8080"`) means
/// every IPv4 interface.
///
/// # Arguments
///
/// * `addr` - The address string to resolve
///
/// # Returns
///
/// The resolved `SocketAddr`
pub async fn resolve_socket_addr(addr: &str) -> Result<SocketAddr> {
    let normalized = if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    };

    // Try direct parsing first
    if let Ok(socket_addr) = SocketAddr::from_str(&normalized) {
        return Ok(socket_addr);
    }

    let resolved = match lookup_host(normalized.as_str()).await {
        Ok(mut addrs) => addrs.next().ok_or_else(|| RelayError::AddressResolution {
            addr: addr.to_string(),
            reason: "no addresses found".to_string(),
        }),
        Err(e) => Err(RelayError::AddressResolution {
            addr: addr.to_string(),
            reason: e.to_string(),
        }),
    };
    resolved
}

/// Resolve an address to its canonical string form
///
/// Two addresses that resolve to the same socket address have the same
/// canonical form.
pub async fn canonical_addr(addr: &str) -> Result<String> {
    Ok(resolve_socket_addr(addr).await?.to_string())
}

/// Bind a TCP listener
///
/// `SO_REUSEADDR` is set on Unix so a proxy that was just stopped can listen
/// on the same port again while old connections sit in `TIME_WAIT`.
pub fn bind_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    #[cfg(unix)]
    socket.set_reuse_address(true)?;

    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    TcpListener::from_std(socket.into())
}
