//! Default configuration values
//!
//! Centralized defaults used by serde and by `RelaySettings::default()`.

/// Proxies are enabled unless the config says otherwise
#[inline]
pub fn enabled() -> bool {
    true
}

/// Default log level
#[inline]
pub fn log_level() -> String {
    "info".to_string()
}

/// Default forwarding buffer size
#[inline]
pub fn buffer_size() -> usize {
    32 * 1024
}

/// Default upstream dial timeout, in seconds
#[inline]
pub fn connect_timeout() -> u64 {
    30
}
