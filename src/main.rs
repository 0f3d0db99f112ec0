//! Toxic Relay Command Line Tool
//!
//! This binary runs a set of proxies until interrupted.

use clap::Parser;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use toxic_relay::common::{init_logger, RelayError, Result};
use toxic_relay::config::{load_proxies, ProxyConfig, RelaySettings};
use toxic_relay::{ForwardingLinks, ProxyCollection, APP_NAME, VERSION};

/// Toxic Relay: TCP relay for simulating network conditions
#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Args {
    /// JSON file with the list of proxies to run
    #[arg(short, long, env = "TOXIC_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Name of the proxy given on the command line
    #[arg(long, default_value = "default")]
    name: String,

    /// Listen address of the proxy given on the command line
    #[arg(short, long, requires = "upstream")]
    listen: Option<String>,

    /// Upstream address of the proxy given on the command line
    #[arg(short, long, requires = "listen")]
    upstream: Option<String>,

    /// Log level
    #[arg(long, env = "TOXIC_RELAY_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Forwarding buffer size in bytes
    #[arg(long, env = "TOXIC_RELAY_BUFFER_SIZE", default_value_t = 32 * 1024)]
    buffer_size: usize,

    /// Upstream dial timeout in seconds (0 disables it)
    #[arg(long, env = "TOXIC_RELAY_CONNECT_TIMEOUT", default_value_t = 30)]
    connect_timeout: u64,
}

impl Args {
    fn settings(&self) -> RelaySettings {
        RelaySettings {
            log_level: self.log_level.clone(),
            buffer_size: self.buffer_size,
            connect_timeout: self.connect_timeout,
        }
    }

    /// Proxies from the config file followed by the one on the command line
    fn proxies(&self) -> Result<Vec<ProxyConfig>> {
        let mut proxies = match &self.config {
            Some(path) => load_proxies(path)?,
            None => Vec::new(),
        };

        if let (Some(listen), Some(upstream)) = (&self.listen, &self.upstream) {
            proxies.push(ProxyConfig::new(self.name.clone(), listen.clone(), upstream.clone()));
        }

        if proxies.is_empty() {
            return Err(RelayError::Config(
                "No proxies configured: pass --config or --listen with --upstream".to_string(),
            ));
        }
        Ok(proxies)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logger
    init_logger(&args.log_level);

    info!("Starting {} v{}", APP_NAME, VERSION);

    let settings = args.settings();
    let links = Arc::new(ForwardingLinks::from_settings(&settings));
    let proxies = ProxyCollection::new(links, settings);

    proxies.populate(args.proxies()?).await?;
    log_status(&proxies).await;

    info!("Relay ready, press Ctrl+C to stop");
    let result = run_until_shutdown(&proxies, args.config.as_deref()).await;

    proxies.clear().await;
    info!("Relay stopped");
    result
}

async fn log_status(proxies: &ProxyCollection) {
    for snapshot in proxies.snapshots().await {
        info!(
            "Proxy {}: {} -> {} ({})",
            snapshot.name, snapshot.listen, snapshot.upstream, snapshot.status
        );
    }
}

/// Re-read the config file and apply it
async fn reload(proxies: &ProxyCollection, config: Option<&Path>) {
    let Some(path) = config else {
        warn!("Reload requested but no config file was given");
        return;
    };

    let result = match load_proxies(path) {
        Ok(configs) => proxies.populate(configs).await.map(|_| ()),
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => log_status(proxies).await,
        Err(e) => warn!("Failed to reload {}: {}", path.display(), e),
    }
}

#[cfg(unix)]
async fn run_until_shutdown(proxies: &ProxyCollection, config: Option<&Path>) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down");
                return Ok(());
            }
            _ = hangup.recv() => {
                info!("Received SIGHUP, reloading configuration");
                reload(proxies, config).await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn run_until_shutdown(_proxies: &ProxyCollection, _config: Option<&Path>) -> Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");
    Ok(())
}
