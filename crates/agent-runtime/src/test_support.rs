//! In-process HTTP stub for transport and provider tests.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

pub(crate) enum StubResponse {
    /// 200 with a close-delimited body written part by part
    Stream { parts: Vec<Vec<u8>>, hold_open: bool },
    /// Error status with a complete body
    Status { code: u16, body: String },
    /// Accept the request and never answer
    Silent,
}

impl StubResponse {
    pub(crate) fn stream(parts: Vec<Vec<u8>>) -> Self {
        StubResponse::Stream {
            parts,
            hold_open: false,
        }
    }

    pub(crate) fn status(code: u16, body: &str) -> Self {
        StubResponse::Status {
            code,
            body: body.to_string(),
        }
    }

    /// Keep the connection open after the last part
    pub(crate) fn hold_open(self) -> Self {
        match self {
            StubResponse::Stream { parts, .. } => StubResponse::Stream {
                parts,
                hold_open: true,
            },
            other => other,
        }
    }
}

pub(crate) struct Stub {
    pub(crate) url: String,
    /// Resolves to the raw request once the response has been written
    pub(crate) request: JoinHandle<String>,
}

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Serve exactly one connection with `response`
pub(crate) async fn stub_server(response: StubResponse) -> Stub {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());

    let request = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;

        match response {
            StubResponse::Silent => tokio::time::sleep(Duration::from_secs(30)).await,
            StubResponse::Status { code, body } => {
                let head = format!(
                    "HTTP/1.1 {} Error\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    code,
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(body.as_bytes()).await;
            }
            StubResponse::Stream { parts, hold_open } => {
                let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n";
                let _ = socket.write_all(head.as_bytes()).await;
                for part in parts {
                    let _ = socket.write_all(&part).await;
                    let _ = socket.flush().await;
                    tokio::time::sleep(Duration::from_millis(30)).await;
                }
                if hold_open {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
            }
        }

        let _ = socket.shutdown().await;
        request
    });

    Stub { url, request }
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        let n = socket.read(&mut buf).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);

        if let Some(head_end) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&raw[..head_end]).to_ascii_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if raw.len() >= head_end + 4 + body_len {
                break;
            }
        }
    }

    String::from_utf8_lossy(&raw).into_owned()
}
