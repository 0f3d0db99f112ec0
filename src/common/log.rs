//! Logging helpers
//!
//! The relay logs through the `log` facade. The binary installs `env_logger`
//! once at startup; every proxy carries its own [`LogScope`] instead of
//! sharing a mutable global logger.

use std::fmt;

/// Initialize the logging system
///
/// `RUST_LOG` takes precedence over `level` when it is set.
///
/// # Parameters
///
/// * `level` - Default log level
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    // A second initialisation (tests, embedding) is not an error for us.
    let _ = env_logger::Builder::from_env(env).try_init();
}

/// Fields bound to every message a proxy logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogScope {
    name: String,
    listen: String,
    upstream: String,
}

impl LogScope {
    /// Bind a scope for one proxy
    pub fn new(name: &str, listen: &str, upstream: &str) -> Self {
        Self {
            name: name.to_string(),
            listen: listen.to_string(),
            upstream: upstream.to_string(),
        }
    }

    /// Rebind the scope after the proxy's addresses changed
    pub fn rebind(&self, listen: &str, upstream: &str) -> Self {
        Self::new(&self.name, listen, upstream)
    }
}

impl fmt::Display for LogScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[name={} listen={} upstream={}]",
            self.name, self.listen, self.upstream
        )
    }
}
