//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use faultline::config::FaultConfig;
use faultline::lifecycle::Server;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Configuration with an ephemeral port and short timings.
pub fn fast_config() -> FaultConfig {
    let mut config = FaultConfig::default();
    config.listener.port = 0;
    config.listener.drain_timeout_secs = 1;
    config.behaviors.silent_timeout_ms = 200;
    config.behaviors.noisy_interval_ms = 10;
    config.behaviors.noisy_duration_ms = 100;
    config.behaviors.noisy_timeout_ms = 1_000;
    config.behaviors.big_file_size = 1_000_000;
    config.behaviors.chunk_size = 16 * 1024;
    config
}

/// A listening server and its address.
pub struct TestServer {
    pub server: Server,
    pub addr: SocketAddr,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start a server with `config` and wait until it listens.
pub async fn start_server(config: FaultConfig) -> TestServer {
    let server = Server::new(config).expect("valid config");
    let addr = server.start().expect("startable").await.expect("bind");
    TestServer { server, addr }
}

/// Client without connection pooling so every request gets its own connection.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(10))
        .build()
        .expect("client")
}

/// Send a raw GET and collect everything the server writes before closing.
pub async fn raw_get(addr: SocketAddr, path: &str) -> std::io::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(addr).await?;
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut received = Vec::new();
    stream.read_to_end(&mut received).await?;
    Ok(received)
}
