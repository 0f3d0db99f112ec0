//! Configuration tests
//!
//! This module contains tests for loading proxy definitions from files and
//! running them through a collection.

mod common;

use std::fs;
use std::sync::Arc;
use tokio::net::TcpStream;

use common::{round_trip, EchoServer};
use toxic_relay::config::{load_proxies, ProxyConfig, RelaySettings};
use toxic_relay::{ForwardingLinks, ProxyCollection, RelayError};

/// Test default settings
#[test]
fn test_default_settings() {
    let settings = RelaySettings::default();

    assert_eq!(settings.log_level, "info");
    assert_eq!(settings.buffer_size, 32768);
    assert_eq!(settings.connect_timeout, 30);
}

/// Test loading proxies from a file
#[test]
fn test_file_config() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config_path = dir.path().join("proxies.json");
    let config_content = r#"[
        {"name": "redis", "listen": "127.0.0.1:26379", "upstream": "127.0.0.1:6379"},
        {"name": "postgres", "listen": "localhost:25432", "upstream": "db:5432", "enabled": false}
    ]"#;
    fs::write(&config_path, config_content).expect("Failed to write test config file");

    let proxies = load_proxies(&config_path).expect("Failed to load proxies from file");

    assert_eq!(
        proxies,
        vec![
            ProxyConfig::new("redis", "127.0.0.1:26379", "127.0.0.1:6379"),
            ProxyConfig::new("postgres", "localhost:25432", "db:5432").with_enabled(false),
        ]
    );
}

/// Test a missing file
#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let result = load_proxies(dir.path().join("missing.json"));

    match result {
        Err(RelayError::Config(msg)) => assert!(msg.contains("missing.json")),
        other => panic!("Expected a configuration error, got {:?}", other),
    }
}

/// Test running proxies loaded from a file
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_populate_from_file() {
    let echo = EchoServer::start().await;
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config_path = dir.path().join("proxies.json");
    let config_content = format!(
        r#"[
            {{"name": "echo", "listen": "127.0.0.1:0", "upstream": "{}"}},
            {{"name": "parked", "listen": "127.0.0.1:0", "upstream": "{}", "enabled": false}}
        ]"#,
        echo.addr, echo.addr
    );
    fs::write(&config_path, config_content).expect("Failed to write test config file");

    let settings = RelaySettings::default();
    let collection = ProxyCollection::new(
        Arc::new(ForwardingLinks::from_settings(&settings)),
        settings,
    );
    collection
        .populate(load_proxies(&config_path).unwrap())
        .await
        .expect("Failed to populate proxies");

    let snapshots = collection.snapshots().await;
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].name, "echo");
    assert!(snapshots[0].enabled);
    assert_eq!(snapshots[1].name, "parked");
    assert!(!snapshots[1].enabled);

    let mut client = TcpStream::connect(&snapshots[0].listen).await.unwrap();
    assert_eq!(round_trip(&mut client, b"from file").await, b"from file");

    collection.clear().await;
    assert!(collection.is_empty().await);
}
