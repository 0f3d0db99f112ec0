//! Configuration loader
//!
//! Reads proxy definitions from a JSON file and validates them.

use log::{debug, info};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::common::{RelayError, Result};
use crate::config::types::ProxyConfig;

/// Load proxy definitions from a JSON file
///
/// The file holds an array of proxy objects:
///
/// ```json
/// [{"name": "redis", "listen": "127.0.0.1:26379", "upstream": "127.0.0.1:6379"}]
/// ```
pub fn load_proxies<P: AsRef<Path>>(path: P) -> Result<Vec<ProxyConfig>> {
    let path = path.as_ref();
    info!("Loading proxies from {}", path.display());

    let content = fs::read_to_string(path).map_err(|e| {
        RelayError::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;

    parse_proxies(&content)
}

/// Parse and validate proxy definitions from a JSON string
pub fn parse_proxies(content: &str) -> Result<Vec<ProxyConfig>> {
    let proxies: Vec<ProxyConfig> = serde_json::from_str(content)
        .map_err(|e| RelayError::Config(format!("Failed to parse proxy list: {}", e)))?;

    validate_proxies(&proxies)?;
    debug!("Parsed {} proxy definitions", proxies.len());

    Ok(proxies)
}

/// Validate a list of proxy definitions
///
/// Names must be unique and no field may be blank.
pub fn validate_proxies(proxies: &[ProxyConfig]) -> Result<()> {
    let mut names = HashSet::new();

    for proxy in proxies {
        validate_proxy(proxy)?;

        if !names.insert(proxy.name.as_str()) {
            return Err(RelayError::Config(format!(
                "Duplicate proxy name: {}",
                proxy.name
            )));
        }
    }

    Ok(())
}

/// Validate a single proxy definition
pub fn validate_proxy(proxy: &ProxyConfig) -> Result<()> {
    if proxy.name.trim().is_empty() {
        return Err(RelayError::Config("Proxy name must not be empty".to_string()));
    }
    if proxy.listen.trim().is_empty() {
        return Err(RelayError::Config(format!(
            "Proxy {} has an empty listen address",
            proxy.name
        )));
    }
    if proxy.upstream.trim().is_empty() {
        return Err(RelayError::Config(format!(
            "Proxy {} has an empty upstream address",
            proxy.name
        )));
    }
    Ok(())
}
