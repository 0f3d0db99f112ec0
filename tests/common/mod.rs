//! Shared helpers for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use toxic_relay::config::{ProxyConfig, RelaySettings};
use toxic_relay::{ForwardingLinks, Proxy};

/// Echo server on an ephemeral loopback port
pub struct EchoServer {
    pub addr: String,
    handle: JoinHandle<()>,
}

impl EchoServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let (mut reader, mut writer) = stream.into_split();
                    let _ = tokio::io::copy(&mut reader, &mut writer).await;
                    let _ = writer.shutdown().await;
                });
            }
        });

        Self { addr, handle }
    }
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Loopback address nothing listens on
pub fn unused_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

/// Disabled proxy with plain forwarding links
pub fn new_proxy(name: &str, listen: &str, upstream: &str) -> Proxy {
    let settings = RelaySettings::default();
    Proxy::new(
        ProxyConfig::new(name, listen, upstream),
        Arc::new(ForwardingLinks::from_settings(&settings)),
        &settings,
    )
}

/// Send `payload` and read the same number of bytes back
pub async fn round_trip(stream: &mut TcpStream, payload: &[u8]) -> Vec<u8> {
    stream.write_all(payload).await.unwrap();

    let mut received = vec![0u8; payload.len()];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut received))
        .await
        .expect("echo timed out")
        .unwrap();
    received
}

/// Whether the peer closed `stream` within a few seconds
pub async fn observes_close(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 64];
    match tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf)).await {
        Ok(Ok(0)) | Ok(Err(_)) => true,
        Ok(Ok(_)) | Err(_) => false,
    }
}

/// Poll `check` until it holds or a few seconds pass
pub async fn eventually<F: FnMut() -> bool>(mut check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
