//! Proxy collection
//!
//! Owns every proxy the relay runs, keyed by name.

use futures::future::join_all;
use log::info;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::link::LinkFactory;
use super::message::ProxySnapshot;
use super::server::Proxy;
use crate::common::{RelayError, Result};
use crate::config::{validate_proxies, validate_proxy, ProxyConfig, RelaySettings};

/// Named set of proxies sharing one link factory and one set of settings
pub struct ProxyCollection {
    proxies: Mutex<HashMap<String, Proxy>>,
    links: Arc<dyn LinkFactory>,
    settings: RelaySettings,
}

impl ProxyCollection {
    /// Create an empty collection
    pub fn new(links: Arc<dyn LinkFactory>, settings: RelaySettings) -> Self {
        Self {
            proxies: Mutex::new(HashMap::new()),
            links,
            settings,
        }
    }

    /// Add a new proxy, starting it when `config.enabled` is set
    ///
    /// Nothing is added if the proxy fails to start.
    ///
    /// # Errors
    ///
    /// `ProxyExists` if the name is taken, or the start error.
    pub async fn add(&self, config: ProxyConfig) -> Result<Proxy> {
        validate_proxy(&config)?;
        let mut proxies = self.proxies.lock().await;

        if proxies.contains_key(&config.name) {
            return Err(RelayError::ProxyExists(config.name));
        }

        let proxy = self.spawn(config).await?;
        proxies.insert(proxy.name().to_string(), proxy.clone());
        Ok(proxy)
    }

    /// Add a proxy, or bring an existing one with that name in line
    ///
    /// An existing proxy with the same addresses is updated in place; one
    /// with different addresses is stopped and replaced.
    pub async fn add_or_replace(&self, config: ProxyConfig) -> Result<Proxy> {
        validate_proxy(&config)?;
        let mut proxies = self.proxies.lock().await;

        if let Some(existing) = proxies.get(&config.name).cloned() {
            if !existing.differs(&config).await? {
                existing.update(config).await?;
                return Ok(existing);
            }

            info!("Replacing proxy {}", config.name);
            proxies.remove(&config.name);
            existing.stop().await;
        }

        let proxy = self.spawn(config).await?;
        proxies.insert(proxy.name().to_string(), proxy.clone());
        Ok(proxy)
    }

    /// Apply a whole list of proxy definitions
    ///
    /// The list is validated up front. Stops at the first proxy that fails
    /// and returns its error; proxies applied before it stay applied.
    pub async fn populate(&self, configs: Vec<ProxyConfig>) -> Result<Vec<Proxy>> {
        validate_proxies(&configs)?;

        let mut applied = Vec::with_capacity(configs.len());
        for config in configs {
            applied.push(self.add_or_replace(config).await?);
        }

        info!("Populated {} proxies", applied.len());
        Ok(applied)
    }

    /// Look up a proxy by name
    pub async fn get(&self, name: &str) -> Result<Proxy> {
        self.proxies
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| RelayError::ProxyNotFound(name.to_string()))
    }

    /// Stop a proxy and drop it from the collection
    pub async fn remove(&self, name: &str) -> Result<()> {
        let proxy = self
            .proxies
            .lock()
            .await
            .remove(name)
            .ok_or_else(|| RelayError::ProxyNotFound(name.to_string()))?;

        proxy.stop().await;
        info!("Removed proxy {}", name);
        Ok(())
    }

    /// Stop and drop every proxy
    pub async fn clear(&self) {
        let proxies: Vec<Proxy> = self.proxies.lock().await.drain().map(|(_, p)| p).collect();
        join_all(proxies.iter().map(|proxy| proxy.stop())).await;
    }

    /// Snapshots of every proxy, sorted by name
    pub async fn snapshots(&self) -> Vec<ProxySnapshot> {
        let proxies: Vec<Proxy> = self.proxies.lock().await.values().cloned().collect();

        let mut snapshots: Vec<ProxySnapshot> = join_all(proxies.iter().map(|proxy| proxy.snapshot()))
            .await
            .into_iter()
            .filter_map(|snapshot| snapshot.ok())
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Number of proxies
    pub async fn len(&self) -> usize {
        self.proxies.lock().await.len()
    }

    /// Whether the collection holds no proxies
    pub async fn is_empty(&self) -> bool {
        self.proxies.lock().await.is_empty()
    }

    async fn spawn(&self, config: ProxyConfig) -> Result<Proxy> {
        let enabled = config.enabled;
        let proxy = Proxy::new(config, Arc::clone(&self.links), &self.settings);

        if enabled {
            proxy.start().await?;
        }
        Ok(proxy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ForwardingLinks;

    fn collection() -> ProxyCollection {
        ProxyCollection::new(Arc::new(ForwardingLinks::default()), RelaySettings::default())
    }

    #[tokio::test]
    async fn test_add_get_remove() {
        let proxies = collection();
        let config = ProxyConfig::new("redis", "127.0.0.1:0", "127.0.0.1:6379");

        proxies.add(config.clone()).await.unwrap();
        assert!(matches!(
            proxies.add(config).await,
            Err(RelayError::ProxyExists(name)) if name == "redis"
        ));

        let proxy = proxies.get("redis").await.unwrap();
        assert!(proxy.snapshot().await.unwrap().enabled);

        proxies.remove("redis").await.unwrap();
        assert!(!proxy.snapshot().await.unwrap().enabled);
        assert!(matches!(proxies.get("redis").await, Err(RelayError::ProxyNotFound(_))));
        assert!(matches!(proxies.remove("redis").await, Err(RelayError::ProxyNotFound(_))));
        assert!(proxies.is_empty().await);
    }

    #[tokio::test]
    async fn test_add_disabled_does_not_listen() {
        let proxies = collection();
        let config = ProxyConfig::new("pg", "127.0.0.1:0", "127.0.0.1:5432").with_enabled(false);

        let proxy = proxies.add(config).await.unwrap();
        let snapshot = proxy.snapshot().await.unwrap();
        assert!(!snapshot.enabled);
        assert_eq!(snapshot.listen, "127.0.0.1:0");
    }

    #[tokio::test]
    async fn test_failed_start_is_not_added() {
        let proxies = collection();
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let listen = taken.local_addr().unwrap().to_string();

        let result = proxies.add(ProxyConfig::new("busy", listen, "127.0.0.1:1")).await;
        assert!(matches!(result, Err(RelayError::Bind { .. })));
        assert!(proxies.is_empty().await);
    }

    #[tokio::test]
    async fn test_populate_replaces_changed_proxies() {
        let proxies = collection();
        proxies
            .populate(vec![
                ProxyConfig::new("a", "127.0.0.1:0", "127.0.0.1:1000"),
                ProxyConfig::new("b", "127.0.0.1:0", "127.0.0.1:2000"),
            ])
            .await
            .unwrap();

        let before = proxies.get("a").await.unwrap().snapshot().await.unwrap();

        // Same addresses for "a" (its bound address), new upstream for "b".
        proxies
            .populate(vec![
                before.to_config(),
                ProxyConfig::new("b", "127.0.0.1:0", "127.0.0.1:3000"),
            ])
            .await
            .unwrap();

        let snapshots = proxies.snapshots().await;
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].name, "a");
        assert_eq!(snapshots[0].listen, before.listen);
        assert_eq!(snapshots[1].upstream, "127.0.0.1:3000");
        assert!(snapshots.iter().all(|s| s.enabled));

        proxies.clear().await;
        assert_eq!(proxies.len().await, 0);
    }

    #[tokio::test]
    async fn test_populate_rejects_duplicates() {
        let proxies = collection();
        let result = proxies
            .populate(vec![
                ProxyConfig::new("a", "127.0.0.1:0", "127.0.0.1:1"),
                ProxyConfig::new("a", "127.0.0.1:0", "127.0.0.1:2"),
            ])
            .await;

        assert!(matches!(result, Err(RelayError::Config(_))));
        assert!(proxies.is_empty().await);
    }
}
