//! Configuration module
//!
//! Proxy definitions, relay-wide settings, and loading them from files.

mod defaults;
pub mod loader;
pub mod types;

pub use self::loader::{load_proxies, parse_proxies, validate_proxies, validate_proxy};
pub use self::types::{ProxyConfig, RelaySettings};
