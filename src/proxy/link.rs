//! Links between client and upstream
//!
//! A link moves bytes in one direction between two sockets. The proxy hands
//! every accepted connection pair to a [`LinkFactory`], twice, once per
//! direction, and never touches the sockets again. The factory reports the
//! end of each link back through [`LinkContext::remove_connection`].

use bytes::BytesMut;
use log::debug;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use super::registry::ConnectionRegistry;
use crate::config::RelaySettings;

/// Direction of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client to upstream
    Upstream,
    /// Upstream to client
    Downstream,
}

impl Direction {
    /// Suffix appended to the client address to name a connection
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upstream => "upstream",
            Self::Downstream => "downstream",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a link needs to know about the proxy that started it
#[derive(Debug, Clone)]
pub struct LinkContext {
    proxy: Arc<str>,
    registry: ConnectionRegistry,
}

impl LinkContext {
    /// Create a context for links of `proxy`
    pub fn new(proxy: Arc<str>, registry: ConnectionRegistry) -> Self {
        Self { proxy, registry }
    }

    /// Name of the proxy that started the link
    pub fn proxy_name(&self) -> &str {
        &self.proxy
    }

    /// Report that the link called `name` has terminated
    ///
    /// Must be called exactly once per link. Calling it after the proxy
    /// already dropped the entry is harmless.
    pub fn remove_connection(&self, name: &str) {
        if self.registry.remove(name) {
            debug!("[{}] Removed connection {}", self.proxy, name);
        }
    }
}

/// Starts links for accepted connection pairs
///
/// Implementations take ownership of both halves and must not block: the
/// proxy calls this from its accept loop.
#[cfg_attr(test, mockall::automock)]
pub trait LinkFactory: Send + Sync {
    /// Start moving bytes from `source` to `dest`
    fn start_link(
        &self,
        ctx: LinkContext,
        name: String,
        source: OwnedReadHalf,
        dest: OwnedWriteHalf,
        direction: Direction,
    );
}

/// Plain byte forwarding with no faults injected
#[derive(Debug, Clone)]
pub struct ForwardingLinks {
    buffer_size: usize,
}

impl ForwardingLinks {
    /// Create a factory whose links use `buffer_size` byte buffers
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    /// Create a factory from relay settings
    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self::new(settings.buffer_size)
    }
}

impl Default for ForwardingLinks {
    fn default() -> Self {
        Self::from_settings(&RelaySettings::default())
    }
}

impl LinkFactory for ForwardingLinks {
    fn start_link(
        &self,
        ctx: LinkContext,
        name: String,
        source: OwnedReadHalf,
        dest: OwnedWriteHalf,
        direction: Direction,
    ) {
        let buffer_size = self.buffer_size;

        tokio::spawn(async move {
            let total = forward(source, dest, buffer_size).await;
            debug!(
                "[{}] Link {} ({}) closed after {} bytes",
                ctx.proxy_name(),
                name,
                direction,
                total
            );
            ctx.remove_connection(&name);
        });
    }
}

/// Copy until EOF or error, then half-close `dest`
///
/// Returns the number of bytes written to `dest`.
async fn forward(mut source: OwnedReadHalf, mut dest: OwnedWriteHalf, buffer_size: usize) -> u64 {
    let mut buffer = BytesMut::with_capacity(buffer_size);
    let mut total_bytes = 0u64;

    loop {
        buffer.clear();
        match source.read_buf(&mut buffer).await {
            Ok(0) => break, // Connection closed
            Ok(n) => {
                if dest.write_all(&buffer[..n]).await.is_err() {
                    break;
                }
                total_bytes += n as u64;
            }
            Err(_) => break,
        }
    }

    let _ = dest.shutdown().await;
    total_bytes
}
