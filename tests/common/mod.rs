//! Shared utilities for integration testing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use key_relay::config::RelayConfig;
use key_relay::lifecycle::Shutdown;
use key_relay::HttpServer;

/// Bearer credentials seen by a mock upstream, in arrival order.
pub type SeenCredentials = Arc<Mutex<Vec<String>>>;

/// A successful chat completion body.
pub fn completion_body(content: &str) -> String {
    serde_json::json!({
        "id": "cmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
    })
    .to_string()
}

/// Start a programmable mock upstream on an ephemeral port.
///
/// `f` receives the bearer credential of each request and returns the
/// status code and body to answer with.
pub async fn start_programmable_upstream<F, Fut>(f: F) -> (SocketAddr, SeenCredentials)
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen: SeenCredentials = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);

    let seen_in_task = seen.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let f = f.clone();
            let seen = seen_in_task.clone();
            tokio::spawn(async move {
                handle_connection(socket, f, seen).await;
            });
        }
    });

    (addr, seen)
}

async fn handle_connection<F, Fut>(mut socket: TcpStream, f: Arc<F>, seen: SeenCredentials)
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = (u16, String)>,
{
    let Some(head) = read_request(&mut socket).await else {
        return;
    };

    let credential = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("authorization") {
                value.trim().strip_prefix("Bearer ").map(str::to_string)
            } else {
                None
            }
        })
        .unwrap_or_default();
    seen.lock().unwrap().push(credential.clone());

    let (status, body) = f(credential).await;
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason(status),
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Read headers and body; returns the header block.
async fn read_request(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_string();
            let content_length = head
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);

            while buf.len() < end + 4 + content_length {
                let n = socket.read(&mut chunk).await.ok()?;
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            return Some(head);
        }
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Failover-only config pointed at `upstream` with the given credentials.
pub fn relay_config(upstream: SocketAddr, keys: &[&str]) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.upstream.base_url = format!("http://{}/v1", upstream);
    config.upstream.timeout_secs = 5;
    config.upstream.api_keys = keys.iter().map(|k| k.to_string()).collect();
    config.rate_limit.requests_per_minute = 0;
    config.rate_limit.requests_per_second = 0;
    config.failover.pause_ms = 0;
    config
}

/// Start the relay on an ephemeral port. Keep the returned handle alive
/// for the duration of the test.
pub async fn start_relay(config: RelayConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config).unwrap();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });

    (addr, shutdown)
}
