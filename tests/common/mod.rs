//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use request_observer::{HttpServer, MemorySink, ServerConfig, Shutdown};
use tokio::net::TcpListener;

/// A running server plus the sink it logs into.
pub struct TestServer {
    pub addr: SocketAddr,
    pub sink: Arc<MemorySink>,
    shutdown: Shutdown,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Poll until `count` records arrived or a second has passed.
    #[allow(dead_code)]
    pub async fn wait_for_records(&self, count: usize) {
        for _ in 0..100 {
            if self.sink.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start `app` behind the full middleware stack on an ephemeral port.
pub async fn start_server(mut config: ServerConfig, app: Router) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    config.listener.bind_address = addr.to_string();

    let sink = Arc::new(MemorySink::new());
    let shutdown = Shutdown::new();
    let server = HttpServer::with_sink(config, app, sink.clone());
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestServer { addr, sink, shutdown }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
