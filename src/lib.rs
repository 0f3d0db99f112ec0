//! Toxic Relay: a TCP relay for simulating network conditions
//!
//! The relay sits between a client and an upstream service:
//!
//! Client <-> relay <-> Upstream
//!
//! Each [`Proxy`] listens on one address, dials the upstream for every client
//! it accepts, and hands the connection pair to a [`LinkFactory`] that moves
//! the bytes. Proxies can be started, stopped and reconfigured at any time,
//! including while their accept loop is blocked waiting for clients.
//!
//! # Main Features
//!
//! - Race-free start, stop and update of individual proxies
//! - `Stop` returns only after the listener and every connection are closed
//! - Ephemeral listen ports resolved and reported back
//! - Pluggable links, with plain forwarding as the default
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use toxic_relay::{ForwardingLinks, Proxy, Result};
//! use toxic_relay::config::{ProxyConfig, RelaySettings};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let settings = RelaySettings::default();
//!     let links = Arc::new(ForwardingLinks::from_settings(&settings));
//!
//!     let proxy = Proxy::new(
//!         ProxyConfig::new("redis", "127.0.0.1:0", "127.0.0.1:6379"),
//!         links,
//!         &settings,
//!     );
//!     proxy.start().await?;
//!     println!("listening on {}", proxy.snapshot().await?.listen);
//!
//!     proxy.stop().await;
//!     Ok(())
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod proxy;

// Re-export commonly used structures and functions for convenience
pub use common::{RelayError, Result};
pub use proxy::{
    ConnectionRegistry, Direction, ForwardingLinks, LinkContext, LinkFactory, Proxy,
    ProxyCollection, ProxySnapshot, ProxyStatus,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
