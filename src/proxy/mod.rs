//! Proxy module
//!
//! This module implements the relay core: the proxy controller with its
//! accept loop, the shutdown signals that sequence it, the registry of live
//! connections, and the seam to the links that carry the bytes.

mod collection;
mod link;
mod message;
mod registry;
mod server;
mod tomb;

pub use collection::ProxyCollection;
pub use link::{Direction, ForwardingLinks, LinkContext, LinkFactory};
pub use message::{ProxySnapshot, ProxyStatus};
pub use registry::ConnectionRegistry;
pub use server::Proxy;
pub use tomb::{Exit, Tomb};
