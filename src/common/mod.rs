//! Common module
//!
//! This module contains shared errors and utility functions used throughout the relay.

pub mod error;
pub mod log;
pub mod net;

// Re-export commonly used types and functions
pub use error::{RelayError, Result};
pub use log::{init_logger, LogScope};
pub use net::{bind_listener, canonical_addr, resolve_socket_addr};
