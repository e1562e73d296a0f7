//! Shared utilities for integration tests.

use consent_gate::config::GateConfig;
use consent_gate::security::CounterStore;
use consent_gate::{HttpServer, Shutdown};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const EVENT: &str =
    r#"{"event_type":"consent_given","cookie":{"categories":["necessary","analytics"]},"pageUrl":"https://test.example.com"}"#;

/// Start a gate on an ephemeral port with the in-process store.
pub async fn spawn_gate(config: GateConfig) -> (SocketAddr, Shutdown) {
    spawn_server(HttpServer::new(config)).await
}

/// Start a gate over a caller-supplied counter store.
#[allow(dead_code)]
pub async fn spawn_gate_with_store(
    config: GateConfig,
    store: Arc<dyn CounterStore>,
) -> (SocketAddr, Shutdown) {
    spawn_server(HttpServer::with_store(config, store)).await
}

async fn spawn_server(server: HttpServer) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();

    tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    (addr, shutdown)
}

/// POST a JSON body to the ingest route.
#[allow(dead_code)]
pub async fn post_json(
    client: &reqwest::Client,
    addr: SocketAddr,
    body: impl Into<reqwest::Body>,
) -> reqwest::Response {
    client
        .post(format!("http://{addr}/"))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap()
}

/// Send a raw HTTP/1.1 request and return everything the server wrote back
/// before closing the connection.
#[allow(dead_code)]
pub async fn raw_exchange(addr: SocketAddr, head: &str, chunks: &[Vec<u8>]) -> String {
    let mut socket = TcpStream::connect(addr).await.unwrap();
    socket.write_all(head.as_bytes()).await.unwrap();
    for chunk in chunks {
        if socket.write_all(chunk).await.is_err() {
            break;
        }
    }

    let mut response = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), socket.read_to_end(&mut response))
        .await
        .expect("server should close the connection");
    String::from_utf8_lossy(&response).into_owned()
}
