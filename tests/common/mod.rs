//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use chat_relay::config::RelayConfig;
use chat_relay::{HttpServer, Shutdown};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const ALLOWED_ORIGIN: &str = "https://chat.example.com";
pub const TEST_KEY: &str = "sk-relay-test";
pub const TEST_KEY_LABEL: &str = "ci";
pub const UPSTREAM_TOKEN: &str = "upstream-token";

/// What the mock upstream sends back.
pub enum MockReply {
    /// Whole body with a content length, after `delay`.
    Body {
        status: u16,
        content_type: &'static str,
        body: String,
        delay: Duration,
    },
    /// Event-stream chunks written one by one, `gap` apart, then close.
    Stream {
        chunks: Vec<String>,
        gap: Duration,
    },
}

impl MockReply {
    pub fn json(status: u16, body: Value) -> Self {
        MockReply::Body {
            status,
            content_type: "application/json",
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn completion(text: &str) -> Self {
        Self::json(
            200,
            serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": text } }]
            }),
        )
    }

    pub fn slow(delay: Duration) -> Self {
        MockReply::Body {
            status: 200,
            content_type: "application/json",
            body: serde_json::json!({
                "choices": [{ "message": { "content": "too late" } }]
            })
            .to_string(),
            delay,
        }
    }
}

/// One request the mock upstream received.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub head: String,
    pub body: Value,
}

/// A running mock upstream.
pub struct MockUpstream {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl MockUpstream {
    pub fn url(&self) -> String {
        format!("http://{}/v1/chat/completions", self.addr)
    }

    pub fn received(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// SSE chunk carrying one content delta.
pub fn sse_delta(content: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({ "choices": [{ "delta": { "content": content } }] })
    )
}

/// Start a programmable mock upstream on an ephemeral port.
pub async fn start_mock_upstream<F>(reply: F) -> MockUpstream
where
    F: Fn(&Value) -> MockReply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let reply = Arc::new(reply);

    let captured = requests.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let reply = reply.clone();
                    let captured = captured.clone();
                    tokio::spawn(async move {
                        let _ = serve_one(socket, reply, captured).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockUpstream { addr, requests }
}

async fn serve_one<F>(
    mut socket: TcpStream,
    reply: Arc<F>,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
) -> std::io::Result<()>
where
    F: Fn(&Value) -> MockReply + Send + Sync + 'static,
{
    let (head, body) = read_request(&mut socket).await?;
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let action = reply(&body);
    captured.lock().unwrap().push(CapturedRequest { head, body });

    match action {
        MockReply::Body {
            status,
            content_type,
            body,
            delay,
        } => {
            tokio::time::sleep(delay).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line(status),
                content_type,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await?;
        }
        MockReply::Stream { chunks, gap } => {
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n",
                )
                .await?;
            for chunk in chunks {
                socket.write_all(chunk.as_bytes()).await?;
                socket.flush().await?;
                tokio::time::sleep(gap).await;
            }
        }
    }
    socket.shutdown().await
}

async fn read_request(socket: &mut TcpStream) -> std::io::Result<(String, Vec<u8>)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok((String::from_utf8_lossy(&buf).into_owned(), Vec::new()));
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    let mut body = buf[head_end..].to_vec();
    while body.len() < length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    Ok((head, body))
}

fn status_line(status: u16) -> String {
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    format!("{status} {reason}")
}

/// Relay config pointed at `upstream`, with one allowed origin and one key.
pub fn relay_config(upstream: &MockUpstream) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.url = upstream.url();
    config.upstream.api_key = Some(UPSTREAM_TOKEN.into());
    config.upstream.timeout_secs = 2;
    config.access.allowed_origins.insert(ALLOWED_ORIGIN.into());
    config
        .access
        .preshared_keys
        .insert(TEST_KEY.into(), TEST_KEY_LABEL.into());
    config
}

/// A relay running on an ephemeral port.
pub struct RunningRelay {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
}

impl RunningRelay {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for RunningRelay {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_relay(config: RelayConfig) -> RunningRelay {
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config).unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    RunningRelay { addr, shutdown }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
